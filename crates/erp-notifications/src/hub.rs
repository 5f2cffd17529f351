//! Real-time event hub
//!
//! A single `tokio::sync::broadcast` channel fans events out to every
//! connected socket; each socket forwards only the events addressed to one
//! of its rooms (or to nobody in particular). Delivery is best effort:
//! emitting with no subscribers succeeds, and slow subscribers lag.

use std::fmt;

use chrono::{DateTime, Utc};
use erp_core::Id;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

/// Event names pushed to clients
pub mod events {
    pub const NOTIFICATION_RECEIVED: &str = "notification:received";
    pub const ADMIN_NOTIFICATION: &str = "admin:notification";
    pub const ADMIN_ACTIVITY: &str = "admin:activity";
    pub const DASHBOARD_STATS: &str = "dashboard:stats";
    pub const PROJECT_CREATED: &str = "project:created";
    pub const PROJECT_UPDATED: &str = "project:updated";
    pub const PROJECT_DELETED: &str = "project:deleted";
    pub const TASK_CREATED: &str = "task:created";
    pub const TASK_UPDATED: &str = "task:updated";
    pub const TASK_DELETED: &str = "task:deleted";
    pub const TASK_DEPENDENCY_ADDED: &str = "task:dependency:added";
    pub const TASK_DEPENDENCY_REMOVED: &str = "task:dependency:removed";
    pub const BUDGET_ALERT: &str = "budget:alert";
    pub const CHAT_MESSAGE: &str = "chat:message";
}

/// Delivery target of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    User(Id),
    Admin,
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::User(id) => write!(f, "user:{}", id),
            Room::Admin => f.write_str("admin"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeEvent {
    pub event: String,
    /// `None` addresses every connection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl RealtimeEvent {
    pub fn new(event: impl Into<String>, room: Option<Room>, payload: Value) -> Self {
        Self {
            event: event.into(),
            room: room.map(|r| r.to_string()),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Whether a connection subscribed to `rooms` should receive this event
    pub fn is_for(&self, rooms: &[String]) -> bool {
        match &self.room {
            None => true,
            Some(room) => rooms.iter().any(|r| r == room),
        }
    }
}

/// Shared sender; cloning yields another handle to the same channel
#[derive(Clone)]
pub struct EventHub {
    sender: broadcast::Sender<RealtimeEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Emit an event; returns how many subscribers saw it
    pub fn emit(&self, event: &str, room: Option<Room>, payload: Value) -> usize {
        let delivered = self
            .sender
            .send(RealtimeEvent::new(event, room, payload))
            .unwrap_or(0);
        trace!(event, delivered, "Realtime event emitted");
        delivered
    }

    pub fn emit_to_user(&self, user_id: Id, event: &str, payload: Value) -> usize {
        self.emit(event, Some(Room::User(user_id)), payload)
    }

    pub fn emit_to_admins(&self, event: &str, payload: Value) -> usize {
        self.emit(event, Some(Room::Admin), payload)
    }

    pub fn broadcast(&self, event: &str, payload: Value) -> usize {
        self.emit(event, None, payload)
    }
}

/// Rooms a connection joins: its own user room, plus admin for full access
pub fn rooms_for(user_id: Id, is_admin: bool) -> Vec<String> {
    let mut rooms = vec![Room::User(user_id).to_string()];
    if is_admin {
        rooms.push(Room::Admin.to_string());
    }
    rooms
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_emit_without_subscribers() {
        let hub = EventHub::new(8);
        assert_eq!(hub.broadcast("ping", json!({})), 0);
    }

    #[tokio::test]
    async fn test_room_addressing() {
        let hub = EventHub::new(8);
        let mut rx = hub.subscribe();

        hub.emit_to_user(5, events::NOTIFICATION_RECEIVED, json!({"id": 1}));
        hub.emit_to_admins(events::ADMIN_ACTIVITY, json!({}));

        let user_rooms = rooms_for(5, false);
        let first = rx.recv().await.unwrap();
        assert_eq!(first.room.as_deref(), Some("user:5"));
        assert!(first.is_for(&user_rooms));
        assert!(!first.is_for(&rooms_for(6, true)));

        let second = rx.recv().await.unwrap();
        assert!(!second.is_for(&user_rooms));
        assert!(second.is_for(&rooms_for(1, true)));
    }

    #[test]
    fn test_event_serialization_omits_missing_room() {
        let event = RealtimeEvent::new("dashboard:stats", None, json!({"projects": 3}));
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("room").is_none());
        assert_eq!(value["payload"]["projects"], 3);
    }
}
