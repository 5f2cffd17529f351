//! Role model
//!
//! Table: roles

use chrono::{DateTime, Utc};
use erp_core::{Id, Identifiable, Timestamped};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::NewRecord;

/// Roles at or above this level (Root, Director) hold every permission
pub const FULL_ACCESS_LEVEL: i32 = 80;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: Id,
    pub name: String,
    /// 0-100; higher levels outrank lower ones
    pub level: i32,
    pub permissions: Vec<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn has_full_access(&self) -> bool {
        self.level >= FULL_ACCESS_LEVEL
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewRole {
    #[validate(length(min = 1, max = 100, message = "is required"))]
    pub name: String,
    #[validate(range(min = 0, max = 100, message = "must be between 0 and 100"))]
    pub level: i32,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub description: Option<String>,
}

impl NewRole {
    /// Built-in roles seeded into an empty database
    pub fn defaults() -> Vec<NewRole> {
        let role = |name: &str, level: i32, permissions: &[&str], description: &str| NewRole {
            name: name.to_string(),
            level,
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            description: Some(description.to_string()),
        };

        vec![
            role("Root", 100, &["*"], "System owner with unrestricted access"),
            role("Director", 80, &["*"], "Company-wide management access"),
            role(
                "Manager",
                60,
                &[
                    "employees.view",
                    "projects.view",
                    "projects.create",
                    "projects.edit",
                    "tasks.view",
                    "tasks.create",
                    "tasks.edit",
                    "resources.view",
                    "resources.manage",
                    "contacts.view",
                    "contacts.manage",
                ],
                "Team and project management",
            ),
            role(
                "Employee",
                20,
                &["projects.view", "tasks.view", "contacts.view", "contacts.manage"],
                "Standard employee access",
            ),
        ]
    }
}

impl NewRecord<Role> for NewRole {
    fn into_record(self, id: Id, now: DateTime<Utc>) -> Role {
        Role {
            id,
            name: self.name,
            level: self.level,
            permissions: self.permissions,
            description: self.description,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Identifiable for Role {
    fn id(&self) -> Id {
        self.id
    }
}

impl Timestamped for Role {
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

    #[test]
    fn test_full_access_threshold() {
        let now = Utc::now();
        let defaults = NewRole::defaults();
        let roles: Vec<Role> = defaults
            .into_iter()
            .enumerate()
            .map(|(i, r)| r.into_record(i as Id + 1, now))
            .collect();

        let by_name = |n: &str| roles.iter().find(|r| r.name == n).unwrap();
        assert!(by_name("Root").has_full_access());
        assert!(by_name("Director").has_full_access());
        assert!(!by_name("Manager").has_full_access());
        assert!(!by_name("Employee").has_full_access());
    }

    #[test]
    fn test_level_validation() {
        let role = NewRole {
            name: "Intern".into(),
            level: 120,
            permissions: vec![],
            description: None,
        };
        assert!(role.validate().is_err());
    }
}
