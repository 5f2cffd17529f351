//! Employee model (HR profile)
//!
//! Table: employees

use chrono::{DateTime, NaiveDate, Utc};
use erp_core::{Id, Identifiable, Timestamped};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::NewRecord;

text_enum! {
    pub enum EmployeeStatus ("employee status") {
        Active => "active",
        OnLeave => "on_leave",
        Inactive => "inactive",
        Terminated => "terminated",
    }
}

impl Default for EmployeeStatus {
    fn default() -> Self {
        EmployeeStatus::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: Id,
    /// Login identity, when the employee has one
    pub user_id: Option<Id>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub position: String,
    /// Department names
    pub departments: Vec<String>,
    pub skills: Vec<String>,
    #[sqlx(try_from = "String")]
    pub status: EmployeeStatus,
    pub hire_date: Option<NaiveDate>,
    pub salary: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Employee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn is_active(&self) -> bool {
        self.status == EmployeeStatus::Active
    }

    pub fn in_department(&self, name: &str) -> bool {
        self.departments.iter().any(|d| d == name)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewEmployee {
    pub user_id: Option<Id>,
    #[validate(length(min = 1, max = 100, message = "is required"))]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[validate(email(message = "is not a valid email"))]
    pub email: String,
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 100, message = "is required"))]
    pub position: String,
    #[serde(default)]
    pub departments: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub status: EmployeeStatus,
    pub hire_date: Option<NaiveDate>,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub salary: Option<f64>,
}

impl NewRecord<Employee> for NewEmployee {
    fn into_record(self, id: Id, now: DateTime<Utc>) -> Employee {
        Employee {
            id,
            user_id: self.user_id,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone: self.phone,
            position: self.position,
            departments: self.departments,
            skills: self.skills,
            status: self.status,
            hire_date: self.hire_date,
            salary: self.salary,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Identifiable for Employee {
    fn id(&self) -> Id {
        self.id
    }
}

impl Timestamped for Employee {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}
