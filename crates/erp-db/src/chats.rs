//! Chat repository
//!
//! Messages are stored inline as a JSONB array. New messages go through
//! [`ChatStore::append_message`], which appends in a single statement.

use async_trait::async_trait;
use erp_core::Id;
use erp_models::{Chat, ChatMessage, NewChat};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::memory::MemoryTable;
use crate::repository::{Repository, RepositoryError, RepositoryResult};

const COLUMNS: &str =
    "id, name, is_group, participants, messages, last_message_at, created_by, created_at, updated_at";

#[async_trait]
pub trait ChatStore: Repository<Chat, NewChat, Chat> {
    /// Chats the user participates in, most recent activity first
    async fn list_for_user(&self, user_id: Id) -> RepositoryResult<Vec<Chat>>;

    /// The one-to-one chat between two users
    async fn find_direct(&self, a: Id, b: Id) -> RepositoryResult<Option<Chat>>;

    /// Append one message without rewriting the others
    async fn append_message(&self, chat_id: Id, message: &ChatMessage) -> RepositoryResult<Chat>;
}

/// Chat repository implementation
pub struct PgChatRepository {
    pool: PgPool,
}

impl PgChatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<Chat, NewChat, Chat> for PgChatRepository {
    async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<Chat>> {
        let sql = format!("SELECT {COLUMNS} FROM chats WHERE id = $1");
        let row = sqlx::query_as::<_, Chat>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Chat>> {
        let sql = format!("SELECT {COLUMNS} FROM chats ORDER BY id LIMIT $1 OFFSET $2");
        let rows = sqlx::query_as::<_, Chat>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn count(&self) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chats")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn create(&self, dto: NewChat) -> RepositoryResult<Chat> {
        let sql = format!(
            r#"
            INSERT INTO chats (name, is_group, participants, messages, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, '[]'::jsonb, $4, NOW(), NOW())
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Chat>(&sql)
            .bind(&dto.name)
            .bind(dto.is_group)
            .bind(&dto.participants)
            .bind(dto.created_by)
            .fetch_one(&self.pool)
            .await?;

        Ok(row)
    }

    async fn update(&self, id: Id, chat: Chat) -> RepositoryResult<Chat> {
        let sql = format!(
            r#"
            UPDATE chats SET
                name = $1,
                participants = $2,
                messages = $3,
                last_message_at = $4,
                updated_at = NOW()
            WHERE id = $5
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Chat>(&sql)
            .bind(&chat.name)
            .bind(&chat.participants)
            .bind(&chat.messages)
            .bind(chat.last_message_at)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Chat", id))?;

        Ok(row)
    }

    async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM chats WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("Chat", id));
        }

        Ok(())
    }

    async fn exists(&self, id: Id) -> RepositoryResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM chats WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }
}

#[async_trait]
impl ChatStore for PgChatRepository {
    async fn list_for_user(&self, user_id: Id) -> RepositoryResult<Vec<Chat>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM chats
            WHERE $1 = ANY(participants)
            ORDER BY COALESCE(last_message_at, created_at) DESC, id DESC
            "#
        );
        let rows = sqlx::query_as::<_, Chat>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn find_direct(&self, a: Id, b: Id) -> RepositoryResult<Option<Chat>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM chats
            WHERE is_group = FALSE
              AND participants @> ARRAY[$1, $2]::bigint[]
              AND cardinality(participants) = 2
            LIMIT 1
            "#
        );
        let row = sqlx::query_as::<_, Chat>(&sql)
            .bind(a)
            .bind(b)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn append_message(&self, chat_id: Id, message: &ChatMessage) -> RepositoryResult<Chat> {
        let sql = format!(
            r#"
            UPDATE chats SET
                messages = messages || $1,
                last_message_at = $2,
                updated_at = NOW()
            WHERE id = $3
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Chat>(&sql)
            .bind(Json(std::slice::from_ref(message)))
            .bind(message.created_at)
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Chat", chat_id))?;

        Ok(row)
    }
}

#[async_trait]
impl ChatStore for MemoryTable<Chat> {
    async fn list_for_user(&self, user_id: Id) -> RepositoryResult<Vec<Chat>> {
        let mut rows = self.select(|c| c.has_participant(user_id));
        rows.sort_by(|x, y| {
            let x_at = x.last_message_at.unwrap_or(x.created_at);
            let y_at = y.last_message_at.unwrap_or(y.created_at);
            y_at.cmp(&x_at).then_with(|| y.id.cmp(&x.id))
        });
        Ok(rows)
    }

    async fn find_direct(&self, a: Id, b: Id) -> RepositoryResult<Option<Chat>> {
        Ok(self.find_first(|c| {
            !c.is_group && c.participants.len() == 2 && c.has_participant(a) && c.has_participant(b)
        }))
    }

    async fn append_message(&self, chat_id: Id, message: &ChatMessage) -> RepositoryResult<Chat> {
        self.modify(chat_id, |chat| {
            chat.push_message(message.clone());
            chat.clone()
        })
        .ok_or_else(|| RepositoryError::not_found("Chat", chat_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_direct_ignores_groups() {
        let table = MemoryTable::<Chat>::new("Chat");
        let store: &dyn ChatStore = &table;
        store
            .create(NewChat {
                name: Some("Team".into()),
                is_group: true,
                participants: vec![1, 2],
                created_by: 1,
            })
            .await
            .unwrap();

        assert!(store.find_direct(2, 1).await.unwrap().is_none());

        let direct = store
            .create(NewChat {
                name: None,
                is_group: false,
                participants: vec![1, 2],
                created_by: 1,
            })
            .await
            .unwrap();

        assert_eq!(store.find_direct(2, 1).await.unwrap().map(|c| c.id), Some(direct.id));
        assert_eq!(store.list_for_user(1).await.unwrap().len(), 2);
        assert!(store.list_for_user(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_appends_keep_every_message() {
        let table = std::sync::Arc::new(MemoryTable::<Chat>::new("Chat"));
        let chat = table
            .create(NewChat {
                name: None,
                is_group: false,
                participants: vec![1, 2],
                created_by: 1,
            })
            .await
            .unwrap();

        let sends = (0..16).map(|i| {
            let table = table.clone();
            tokio::spawn(async move {
                let message = ChatMessage {
                    id: uuid::Uuid::new_v4(),
                    sender_id: 1 + i % 2,
                    content: format!("message {i}"),
                    file_id: None,
                    read_by: vec![1 + i % 2],
                    created_at: chrono::Utc::now(),
                };
                table.append_message(chat.id, &message).await.unwrap();
            })
        });
        for send in sends.collect::<Vec<_>>() {
            send.await.unwrap();
        }

        let chat = Repository::<Chat, NewChat, Chat>::find_by_id(&*table, chat.id).await.unwrap().unwrap();
        assert_eq!(chat.messages.len(), 16);
        assert!(chat.last_message_at.is_some());

        let missing = table.append_message(99, &chat.messages[0]).await.unwrap_err();
        assert!(matches!(missing, RepositoryError::NotFound(_)));
    }
}
