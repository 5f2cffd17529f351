//! Project model
//!
//! Table: projects

use chrono::{DateTime, NaiveDate, Utc};
use erp_core::{Id, Identifiable, Timestamped};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::NewRecord;

text_enum! {
    pub enum ProjectStatus ("project status") {
        Planning => "planning",
        Active => "active",
        OnHold => "on_hold",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

impl Default for ProjectStatus {
    fn default() -> Self {
        ProjectStatus::Planning
    }
}

text_enum! {
    /// Priority shared by projects and tasks
    pub enum Priority ("priority") {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Id,
    pub name: String,
    pub description: String,
    #[sqlx(try_from = "String")]
    pub status: ProjectStatus,
    #[sqlx(try_from = "String")]
    pub priority: Priority,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub budget: f64,
    /// 0-100
    pub progress: i32,
    /// Managing employee
    pub manager_id: Option<Id>,
    /// Creating user
    pub owner_id: Id,
    /// Employee ids
    pub team: Vec<Id>,
    /// User ids
    pub members: Vec<Id>,
    pub department: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Whether the user (or their employee record) is attached to this project
    pub fn is_assigned(&self, user_id: Id, employee_id: Option<Id>) -> bool {
        if self.owner_id == user_id || self.members.contains(&user_id) {
            return true;
        }
        match employee_id {
            Some(eid) => self.manager_id == Some(eid) || self.team.contains(&eid),
            None => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.status, ProjectStatus::Completed | ProjectStatus::Cancelled)
    }
}

#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub description: String,
    pub status: ProjectStatus,
    pub priority: Priority,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub budget: f64,
    pub manager_id: Option<Id>,
    pub owner_id: Id,
    pub team: Vec<Id>,
    pub members: Vec<Id>,
    pub department: Option<String>,
}

impl NewRecord<Project> for NewProject {
    fn into_record(self, id: Id, now: DateTime<Utc>) -> Project {
        Project {
            id,
            name: self.name,
            description: self.description,
            status: self.status,
            priority: self.priority,
            start_date: self.start_date,
            end_date: self.end_date,
            budget: self.budget,
            progress: 0,
            manager_id: self.manager_id,
            owner_id: self.owner_id,
            team: self.team,
            members: self.members,
            department: self.department,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Identifiable for Project {
    fn id(&self) -> Id {
        self.id
    }
}

impl Timestamped for Project {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> Project {
        NewProject {
            name: "Website".into(),
            description: String::new(),
            status: ProjectStatus::Active,
            priority: Priority::High,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: None,
            budget: 0.0,
            manager_id: Some(10),
            owner_id: 1,
            team: vec![11, 12],
            members: vec![2],
            department: None,
        }
        .into_record(1, Utc::now())
    }

    #[test]
    fn test_is_assigned() {
        let p = project();
        assert!(p.is_assigned(1, None), "owner");
        assert!(p.is_assigned(2, None), "member");
        assert!(p.is_assigned(9, Some(10)), "manager");
        assert!(p.is_assigned(9, Some(12)), "team");
        assert!(!p.is_assigned(9, Some(99)));
        assert!(!p.is_assigned(9, None));
    }

    #[test]
    fn test_priority_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Priority::Critical).unwrap(), "critical");
        assert_eq!("on_hold".parse::<ProjectStatus>().unwrap(), ProjectStatus::OnHold);
    }
}
