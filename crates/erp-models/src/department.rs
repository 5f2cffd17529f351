//! Department model
//!
//! Table: departments. Department permissions are unioned into the
//! permission set of every member while the department is active.

use chrono::{DateTime, Utc};
use erp_core::{Id, Identifiable, Timestamped};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::NewRecord;

text_enum! {
    pub enum DepartmentStatus ("department status") {
        Active => "active",
        Inactive => "inactive",
    }
}

impl Default for DepartmentStatus {
    fn default() -> Self {
        DepartmentStatus::Active
    }
}

/// Contact details of a department's manager
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentManager {
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: Id,
    pub name: String,
    pub description: String,
    pub location: String,
    pub manager: Option<Json<DepartmentManager>>,
    pub budget: f64,
    #[sqlx(try_from = "String")]
    pub status: DepartmentStatus,
    pub permissions: Vec<String>,
    pub employee_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Department {
    pub fn is_active(&self) -> bool {
        self.status == DepartmentStatus::Active
    }

    pub fn manager_name(&self) -> Option<&str> {
        self.manager.as_ref().map(|m| m.name.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct NewDepartment {
    pub name: String,
    pub description: String,
    pub location: String,
    pub manager: Option<DepartmentManager>,
    pub budget: f64,
    pub status: DepartmentStatus,
    pub permissions: Vec<String>,
}

impl NewRecord<Department> for NewDepartment {
    fn into_record(self, id: Id, now: DateTime<Utc>) -> Department {
        Department {
            id,
            name: self.name,
            description: self.description,
            location: self.location,
            manager: self.manager.map(Json),
            budget: self.budget,
            status: self.status,
            permissions: self.permissions,
            employee_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Identifiable for Department {
    fn id(&self) -> Id {
        self.id
    }
}

impl Timestamped for Department {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}
