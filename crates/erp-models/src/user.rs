//! User model (login identity)
//!
//! Table: users. HR profile data lives on [`crate::Employee`], which links
//! back through `employees.user_id`.

use chrono::{DateTime, Utc};
use erp_core::{Id, Identifiable, Timestamped};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::NewRecord;

text_enum! {
    pub enum UserStatus ("user status") {
        Active => "active",
        Inactive => "inactive",
        Locked => "locked",
    }
}

impl Default for UserStatus {
    fn default() -> Self {
        UserStatus::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Id,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role_id: Option<Id>,
    #[sqlx(try_from = "String")]
    pub status: UserStatus,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role_id: Option<Id>,
    pub status: UserStatus,
}

impl NewRecord<User> for NewUser {
    fn into_record(self, id: Id, now: DateTime<Utc>) -> User {
        User {
            id,
            name: self.name,
            email: self.email,
            password_hash: self.password_hash,
            role_id: self.role_id,
            status: self.status,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Identifiable for User {
    fn id(&self) -> Id {
        self.id
    }
}

impl Timestamped for User {
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
    fn test_password_hash_not_serialized() {
        let user = NewUser {
            name: "Asha".into(),
            email: "asha@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            role_id: None,
            status: UserStatus::Active,
        }
        .into_record(1, Utc::now());

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["status"], "active");
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("locked".parse::<UserStatus>().unwrap(), UserStatus::Locked);
        assert!("deleted".parse::<UserStatus>().is_err());
    }
}
