//! Activity log model
//!
//! Table: activity_logs. Records are append-only: they are inserted once
//! and never updated or deleted through the application.

use chrono::{DateTime, Utc};
use erp_core::{Id, Identifiable, Timestamped};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::NewRecord;

text_enum! {
    pub enum ActivityAction ("activity action") {
        View => "view",
        Create => "create",
        Update => "update",
        Delete => "delete",
        Login => "login",
        Logout => "logout",
        Export => "export",
        Other => "other",
    }
}

impl ActivityAction {
    /// Action implied by an HTTP method
    pub fn from_method(method: &str) -> Self {
        match method.to_ascii_uppercase().as_str() {
            "GET" | "HEAD" => ActivityAction::View,
            "POST" => ActivityAction::Create,
            "PUT" | "PATCH" => ActivityAction::Update,
            "DELETE" => ActivityAction::Delete,
            _ => ActivityAction::Other,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    pub id: Id,
    pub user_id: Option<Id>,
    pub user_name: String,
    #[sqlx(try_from = "String")]
    pub action: ActivityAction,
    pub resource: String,
    pub resource_id: Option<String>,
    pub method: String,
    pub path: String,
    pub status_code: i32,
    pub duration_ms: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub details: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewActivityLog {
    pub user_id: Option<Id>,
    pub user_name: String,
    pub action: ActivityAction,
    pub resource: String,
    pub resource_id: Option<String>,
    pub method: String,
    pub path: String,
    pub status_code: i32,
    pub duration_ms: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: serde_json::Value,
}

impl NewActivityLog {
    pub fn success(&self) -> bool {
        self.status_code < 400
    }
}

impl NewRecord<ActivityLog> for NewActivityLog {
    fn into_record(self, id: Id, now: DateTime<Utc>) -> ActivityLog {
        let success = self.success();
        ActivityLog {
            id,
            user_id: self.user_id,
            user_name: self.user_name,
            action: self.action,
            resource: self.resource,
            resource_id: self.resource_id,
            method: self.method,
            path: self.path,
            status_code: self.status_code,
            duration_ms: self.duration_ms,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            success,
            details: Json(self.details),
            created_at: now,
        }
    }
}

impl Identifiable for ActivityLog {
    fn id(&self) -> Id {
        self.id
    }
}

impl Timestamped for ActivityLog {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
