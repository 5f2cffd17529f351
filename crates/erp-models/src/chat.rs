//! Chat model
//!
//! Table: chats. Messages are an embedded JSONB array per conversation.

use chrono::{DateTime, Utc};
use erp_core::{Id, Identifiable, Timestamped};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::NewRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender_id: Id,
    pub content: String,
    pub file_id: Option<Id>,
    pub read_by: Vec<Id>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn is_read_by(&self, user_id: Id) -> bool {
        self.sender_id == user_id || self.read_by.contains(&user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: Id,
    pub name: Option<String>,
    pub is_group: bool,
    pub participants: Vec<Id>,
    pub messages: Json<Vec<ChatMessage>>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_by: Id,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn has_participant(&self, user_id: Id) -> bool {
        self.participants.contains(&user_id)
    }

    pub fn unread_count(&self, user_id: Id) -> usize {
        self.messages.iter().filter(|m| !m.is_read_by(user_id)).count()
    }

    /// Marks every message as read by `user_id`, returning how many changed
    pub fn mark_read(&mut self, user_id: Id) -> usize {
        let mut changed = 0;
        for message in self.messages.0.iter_mut() {
            if !message.is_read_by(user_id) {
                message.read_by.push(user_id);
                changed += 1;
            }
        }
        changed
    }

    pub fn push_message(&mut self, message: ChatMessage) {
        self.last_message_at = Some(message.created_at);
        self.messages.0.push(message);
    }
}

#[derive(Debug, Clone)]
pub struct NewChat {
    pub name: Option<String>,
    pub is_group: bool,
    pub participants: Vec<Id>,
    pub created_by: Id,
}

impl NewRecord<Chat> for NewChat {
    fn into_record(self, id: Id, now: DateTime<Utc>) -> Chat {
        Chat {
            id,
            name: self.name,
            is_group: self.is_group,
            participants: self.participants,
            messages: Json(Vec::new()),
            last_message_at: None,
            created_by: self.created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Identifiable for Chat {
    fn id(&self) -> Id {
        self.id
    }
}

impl Timestamped for Chat {
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

    fn message(sender: Id) -> ChatMessage {
        ChatMessage {
            id: Uuid::new_v4(),
            sender_id: sender,
            content: "hello".into(),
            file_id: None,
            read_by: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_unread_and_mark_read() {
        let mut chat = NewChat {
            name: None,
            is_group: false,
            participants: vec![1, 2],
            created_by: 1,
        }
        .into_record(1, Utc::now());

        chat.push_message(message(1));
        chat.push_message(message(1));
        chat.push_message(message(2));

        assert_eq!(chat.unread_count(2), 2);
        assert_eq!(chat.unread_count(1), 1);
        assert_eq!(chat.mark_read(2), 2);
        assert_eq!(chat.unread_count(2), 0);
        assert!(chat.last_message_at.is_some());
    }
}
