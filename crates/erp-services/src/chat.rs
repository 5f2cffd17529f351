//! Chat Service
//!
//! Direct and group conversations between users. New messages are pushed
//! as `chat:message` to every participant's room.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use erp_auth::CurrentUser;
use erp_core::{ErpError, ErpResult, Id};
use erp_db::{ChatStore, FileStore, UserStore};
use erp_models::{Chat, ChatMessage, FileContext, NewChat};
use erp_notifications::{events, EventHub, Room};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::support::{non_blank, publish};

#[derive(Debug, Clone, Deserialize)]
pub struct GroupInput {
    pub name: String,
    pub participants: Vec<Id>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageInput {
    #[serde(default)]
    pub content: String,
    pub file_id: Option<Id>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatUnread {
    pub chat_id: Id,
    pub unread: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCounts {
    pub total: usize,
    pub chats: Vec<ChatUnread>,
}

#[derive(Clone)]
pub struct ChatService {
    chats: Arc<dyn ChatStore>,
    users: Arc<dyn UserStore>,
    files: Arc<dyn FileStore>,
    hub: EventHub,
}

impl ChatService {
    pub fn new(
        chats: Arc<dyn ChatStore>,
        users: Arc<dyn UserStore>,
        files: Arc<dyn FileStore>,
        hub: EventHub,
    ) -> Self {
        Self {
            chats,
            users,
            files,
            hub,
        }
    }

    /// Most recently active first
    pub async fn list_chats(&self, user: &CurrentUser) -> ErpResult<Vec<Chat>> {
        Ok(self.chats.list_for_user(user.id).await?)
    }

    pub async fn get(&self, user: &CurrentUser, id: Id) -> ErpResult<Chat> {
        self.participating(user, id).await
    }

    /// Existing direct chat with `other`, or a new one
    pub async fn open_direct(&self, user: &CurrentUser, other: Id) -> ErpResult<Chat> {
        if other == user.id {
            return Err(ErpError::bad_request("Cannot start a chat with yourself"));
        }
        if !self.users.exists(other).await? {
            return Err(ErpError::not_found("User", other));
        }

        if let Some(chat) = self.chats.find_direct(user.id, other).await? {
            return Ok(chat);
        }

        let chat = self
            .chats
            .create(NewChat {
                name: None,
                is_group: false,
                participants: vec![user.id, other],
                created_by: user.id,
            })
            .await?;
        debug!(chat_id = chat.id, "Direct chat opened");
        Ok(chat)
    }

    pub async fn create_group(&self, user: &CurrentUser, input: GroupInput) -> ErpResult<Chat> {
        let name = non_blank(Some(&input.name))
            .ok_or_else(|| ErpError::invalid("name", "is required"))?;

        let mut participants: BTreeSet<Id> = input.participants.into_iter().collect();
        participants.insert(user.id);
        if participants.len() < 2 {
            return Err(ErpError::bad_request("A group needs at least one other participant"));
        }
        for &participant in &participants {
            if !self.users.exists(participant).await? {
                return Err(ErpError::not_found("User", participant));
            }
        }

        let chat = self
            .chats
            .create(NewChat {
                name: Some(name),
                is_group: true,
                participants: participants.into_iter().collect(),
                created_by: user.id,
            })
            .await?;
        info!(chat_id = chat.id, members = chat.participants.len(), "Group chat created");
        Ok(chat)
    }

    pub async fn send_message(
        &self,
        user: &CurrentUser,
        chat_id: Id,
        input: MessageInput,
    ) -> ErpResult<ChatMessage> {
        self.participating(user, chat_id).await?;

        let content = input.content.trim().to_string();
        if content.is_empty() && input.file_id.is_none() {
            return Err(ErpError::bad_request("Message content or a file is required"));
        }
        if let Some(file_id) = input.file_id {
            self.ensure_attachable(user, chat_id, file_id).await?;
        }

        let message = ChatMessage {
            id: Uuid::new_v4(),
            sender_id: user.id,
            content,
            file_id: input.file_id,
            read_by: vec![user.id],
            created_at: Utc::now(),
        };
        let chat = self.chats.append_message(chat_id, &message).await?;

        let payload = json!({
            "chatId": chat.id,
            "senderName": user.name,
            "message": message,
        });
        for &participant in &chat.participants {
            publish(&self.hub, events::CHAT_MESSAGE, Some(Room::User(participant)), &payload);
        }
        Ok(message)
    }

    /// Returns how many messages became read
    pub async fn mark_read(&self, user: &CurrentUser, chat_id: Id) -> ErpResult<usize> {
        let mut chat = self.participating(user, chat_id).await?;
        let changed = chat.mark_read(user.id);
        if changed > 0 {
            self.chats.update(chat_id, chat).await?;
        }
        Ok(changed)
    }

    pub async fn delete_message(
        &self,
        user: &CurrentUser,
        chat_id: Id,
        message_id: Uuid,
    ) -> ErpResult<()> {
        let mut chat = self.participating(user, chat_id).await?;

        let position = chat
            .messages
            .iter()
            .position(|m| m.id == message_id)
            .ok_or_else(|| ErpError::not_found("Message", message_id))?;
        if chat.messages[position].sender_id != user.id {
            return Err(ErpError::forbidden("Only the sender can delete this message"));
        }

        chat.messages.0.remove(position);
        chat.last_message_at = chat.messages.last().map(|m| m.created_at);
        self.chats.update(chat_id, chat).await?;
        Ok(())
    }

    pub async fn unread_counts(&self, user: &CurrentUser) -> ErpResult<UnreadCounts> {
        let chats: Vec<ChatUnread> = self
            .chats
            .list_for_user(user.id)
            .await?
            .iter()
            .map(|c| ChatUnread {
                chat_id: c.id,
                unread: c.unread_count(user.id),
            })
            .filter(|c| c.unread > 0)
            .collect();

        Ok(UnreadCounts {
            total: chats.iter().map(|c| c.unread).sum(),
            chats,
        })
    }

    async fn participating(&self, user: &CurrentUser, id: Id) -> ErpResult<Chat> {
        let chat = self
            .chats
            .find_by_id(id)
            .await?
            .ok_or_else(|| ErpError::not_found("Chat", id))?;
        if !chat.has_participant(user.id) {
            return Err(ErpError::forbidden("You are not a participant in this chat"));
        }
        Ok(chat)
    }

    /// The file must belong to this chat or to the sender
    async fn ensure_attachable(&self, user: &CurrentUser, chat_id: Id, file_id: Id) -> ErpResult<()> {
        let file = self
            .files
            .find_by_id(file_id)
            .await?
            .ok_or_else(|| ErpError::not_found("File", file_id))?;
        let in_chat = file.context == FileContext::Chat && file.context_id == chat_id;
        if !in_chat && file.owner_id != user.id {
            return Err(ErpError::forbidden("You cannot attach this file"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use erp_models::NewStoredFile;
    use crate::testing::{fixture, member};

    #[tokio::test]
    async fn test_open_direct_is_idempotent() {
        let fx = fixture().await;
        let a = fx.register("a@x.io").await;
        let b = fx.register("b@x.io").await;
        let me = member(a.id, &[]);

        let first = fx.services.chat.open_direct(&me, b.id).await.unwrap();
        let second = fx.services.chat.open_direct(&me, b.id).await.unwrap();
        assert_eq!(first.id, second.id);

        let reverse = fx.services.chat.open_direct(&member(b.id, &[]), a.id).await.unwrap();
        assert_eq!(first.id, reverse.id);

        let err = fx.services.chat.open_direct(&me, a.id).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_send_message_rules() {
        let fx = fixture().await;
        let a = fx.register("a@x.io").await;
        let b = fx.register("b@x.io").await;
        let c = fx.register("c@x.io").await;
        let chat = fx.services.chat.open_direct(&member(a.id, &[]), b.id).await.unwrap();

        let err = fx
            .services
            .chat
            .send_message(&member(c.id, &[]), chat.id, MessageInput { content: "hi".into(), file_id: None })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);

        let err = fx
            .services
            .chat
            .send_message(&member(a.id, &[]), chat.id, MessageInput { content: "  ".into(), file_id: None })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_attachment_must_be_reachable() {
        let fx = fixture().await;
        let a = fx.register("a@x.io").await;
        let b = fx.register("b@x.io").await;
        let c = fx.register("c@x.io").await;
        let alice = member(a.id, &[]);
        let chat = fx.services.chat.open_direct(&alice, b.id).await.unwrap();

        let upload = |owner_id, context, context_id| NewStoredFile {
            owner_id,
            context,
            context_id,
            original_name: "plan.pdf".into(),
            storage_key: Uuid::new_v4().to_string(),
            content_type: "application/pdf".into(),
            size: 10,
            digest: "00".into(),
        };
        let foreign = fx.stores.files.create(upload(c.id, FileContext::Project, 5)).await.unwrap();
        let shared = fx.stores.files.create(upload(b.id, FileContext::Chat, chat.id)).await.unwrap();
        let own = fx.stores.files.create(upload(a.id, FileContext::Project, 5)).await.unwrap();

        let send = |file_id| MessageInput { content: String::new(), file_id: Some(file_id) };
        let err = fx.services.chat.send_message(&alice, chat.id, send(foreign.id)).await.unwrap_err();
        assert_eq!(err.status_code(), 403);
        let err = fx.services.chat.send_message(&alice, chat.id, send(999)).await.unwrap_err();
        assert_eq!(err.status_code(), 404);

        fx.services.chat.send_message(&alice, chat.id, send(shared.id)).await.unwrap();
        fx.services.chat.send_message(&alice, chat.id, send(own.id)).await.unwrap();
        let chats = fx.services.chat.list_chats(&alice).await.unwrap();
        assert_eq!(chats[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn test_message_reaches_every_participant() {
        let fx = fixture().await;
        let a = fx.register("a@x.io").await;
        let b = fx.register("b@x.io").await;
        let c = fx.register("c@x.io").await;
        let group = fx
            .services
            .chat
            .create_group(
                &member(a.id, &[]),
                GroupInput {
                    name: "Launch".into(),
                    participants: vec![b.id, c.id],
                },
            )
            .await
            .unwrap();
        let mut rx = fx.hub.subscribe();

        fx.services
            .chat
            .send_message(&member(a.id, &[]), group.id, MessageInput { content: "ship it".into(), file_id: None })
            .await
            .unwrap();

        let mut rooms = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.event, events::CHAT_MESSAGE);
            rooms.extend(event.room);
        }
        rooms.sort();
        let mut expected: Vec<String> = [a.id, b.id, c.id].iter().map(|id| format!("user:{}", id)).collect();
        expected.sort();
        assert_eq!(rooms, expected);
    }

    #[tokio::test]
    async fn test_unread_and_delete() {
        let fx = fixture().await;
        let a = fx.register("a@x.io").await;
        let b = fx.register("b@x.io").await;
        let (alice, bob) = (member(a.id, &[]), member(b.id, &[]));
        let chat = fx.services.chat.open_direct(&alice, b.id).await.unwrap();

        let message = fx
            .services
            .chat
            .send_message(&alice, chat.id, MessageInput { content: "one".into(), file_id: None })
            .await
            .unwrap();
        fx.services
            .chat
            .send_message(&alice, chat.id, MessageInput { content: "two".into(), file_id: None })
            .await
            .unwrap();

        let counts = fx.services.chat.unread_counts(&bob).await.unwrap();
        assert_eq!(counts.total, 2);
        assert_eq!(fx.services.chat.unread_counts(&alice).await.unwrap().total, 0);

        let err = fx
            .services
            .chat
            .delete_message(&bob, chat.id, message.id)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
        fx.services.chat.delete_message(&alice, chat.id, message.id).await.unwrap();

        assert_eq!(fx.services.chat.mark_read(&bob, chat.id).await.unwrap(), 1);
        assert_eq!(fx.services.chat.unread_counts(&bob).await.unwrap().total, 0);
    }
}
