//! In-app notification model
//!
//! Table: notifications

use chrono::{DateTime, Utc};
use erp_core::{Id, Identifiable, Timestamped};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::NewRecord;

text_enum! {
    pub enum NotificationKind ("notification kind") {
        Info => "info",
        Success => "success",
        Warning => "warning",
        Error => "error",
        Project => "project",
        Task => "task",
        Budget => "budget",
        Chat => "chat",
        System => "system",
    }
}

text_enum! {
    pub enum NotificationPriority ("notification priority") {
        Low => "low",
        Medium => "medium",
        High => "high",
        Urgent => "urgent",
    }
}

impl Default for NotificationPriority {
    fn default() -> Self {
        NotificationPriority::Medium
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Id,
    pub user_id: Id,
    #[sqlx(try_from = "String")]
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[sqlx(try_from = "String")]
    pub priority: NotificationPriority,
    pub action_url: Option<String>,
    pub metadata: Json<serde_json::Value>,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn mark_read(&mut self, now: DateTime<Utc>) {
        if !self.read {
            self.read = true;
            self.read_at = Some(now);
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Id,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub priority: NotificationPriority,
    pub action_url: Option<String>,
    pub metadata: serde_json::Value,
}

impl NewNotification {
    pub fn new(
        user_id: Id,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
            priority: NotificationPriority::default(),
            action_url: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn action_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

impl NewRecord<Notification> for NewNotification {
    fn into_record(self, id: Id, now: DateTime<Utc>) -> Notification {
        Notification {
            id,
            user_id: self.user_id,
            kind: self.kind,
            title: self.title,
            message: self.message,
            priority: self.priority,
            action_url: self.action_url,
            metadata: Json(self.metadata),
            read: false,
            read_at: None,
            created_at: now,
        }
    }
}

impl Identifiable for Notification {
    fn id(&self) -> Id {
        self.id
    }
}

impl Timestamped for Notification {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_to_medium() {
        let n = NewNotification::new(5, NotificationKind::Task, "Assigned", "You have a task");
        assert_eq!(n.priority, NotificationPriority::Medium);

        let n = n.priority(NotificationPriority::Urgent).action_url("/tasks/1");
        assert_eq!(n.priority, NotificationPriority::Urgent);
        assert_eq!(n.action_url.as_deref(), Some("/tasks/1"));
    }

    #[test]
    fn test_mark_read_once() {
        let mut n = NewNotification::new(5, NotificationKind::Info, "t", "m").into_record(1, Utc::now());
        n.mark_read(Utc::now());
        let first = n.read_at;
        n.mark_read(Utc::now());
        assert!(n.read);
        assert_eq!(n.read_at, first);
    }

    #[test]
    fn test_kind_serialized_as_type() {
        let n = NewNotification::new(5, NotificationKind::Budget, "t", "m").into_record(1, Utc::now());
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "budget");
        assert_eq!(json["priority"], "medium");
    }

    #[test]
    fn test_error_kind_round_trips_through_text() {
        assert_eq!("error".parse::<NotificationKind>().unwrap(), NotificationKind::Error);
        assert_eq!(
            NotificationKind::try_from("warning".to_string()).unwrap(),
            NotificationKind::Warning
        );
        assert!("fatal".parse::<NotificationKind>().is_err());
    }
}
