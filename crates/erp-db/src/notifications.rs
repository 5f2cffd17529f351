//! Notification repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use erp_core::Id;
use erp_models::{NewNotification, Notification};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::memory::MemoryTable;
use crate::repository::{paginate, Repository, RepositoryError, RepositoryResult};

const COLUMNS: &str = "id, user_id, kind, title, message, priority, action_url, metadata, read, \
                       read_at, created_at";

#[async_trait]
pub trait NotificationStore: Repository<Notification, NewNotification, Notification> {
    /// A user's notifications, newest first
    async fn list_for_user(
        &self,
        user_id: Id,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Notification>>;

    async fn count_for_user(&self, user_id: Id, unread_only: bool) -> RepositoryResult<i64>;

    /// Mark every unread notification of a user as read
    async fn mark_all_read(&self, user_id: Id, at: DateTime<Utc>) -> RepositoryResult<u64>;
}

/// Notification repository implementation
pub struct PgNotificationRepository {
    pool: PgPool,
}

impl PgNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<Notification, NewNotification, Notification> for PgNotificationRepository {
    async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<Notification>> {
        let sql = format!("SELECT {COLUMNS} FROM notifications WHERE id = $1");
        let row = sqlx::query_as::<_, Notification>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Notification>> {
        let sql = format!("SELECT {COLUMNS} FROM notifications ORDER BY id LIMIT $1 OFFSET $2");
        let rows = sqlx::query_as::<_, Notification>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn count(&self) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notifications")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn create(&self, dto: NewNotification) -> RepositoryResult<Notification> {
        let sql = format!(
            r#"
            INSERT INTO notifications (
                user_id, kind, title, message, priority, action_url, metadata, read, created_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, FALSE, NOW()
            )
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Notification>(&sql)
            .bind(dto.user_id)
            .bind(dto.kind.as_str())
            .bind(&dto.title)
            .bind(&dto.message)
            .bind(dto.priority.as_str())
            .bind(&dto.action_url)
            .bind(Json(&dto.metadata))
            .fetch_one(&self.pool)
            .await?;

        Ok(row)
    }

    async fn update(&self, id: Id, notification: Notification) -> RepositoryResult<Notification> {
        let sql = format!(
            r#"
            UPDATE notifications SET
                title = $1,
                message = $2,
                priority = $3,
                action_url = $4,
                metadata = $5,
                read = $6,
                read_at = $7
            WHERE id = $8
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Notification>(&sql)
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(notification.priority.as_str())
            .bind(&notification.action_url)
            .bind(&notification.metadata)
            .bind(notification.read)
            .bind(notification.read_at)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Notification", id))?;

        Ok(row)
    }

    async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("Notification", id));
        }

        Ok(())
    }

    async fn exists(&self, id: Id) -> RepositoryResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM notifications WHERE id = $1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}

#[async_trait]
impl NotificationStore for PgNotificationRepository {
    async fn list_for_user(
        &self,
        user_id: Id,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Notification>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM notifications
            WHERE user_id = $1 AND (NOT $2 OR read = FALSE)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#
        );
        let rows = sqlx::query_as::<_, Notification>(&sql)
            .bind(user_id)
            .bind(unread_only)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn count_for_user(&self, user_id: Id, unread_only: bool) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND (NOT $2 OR read = FALSE)",
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn mark_all_read(&self, user_id: Id, at: DateTime<Utc>) -> RepositoryResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET read = TRUE, read_at = $1 WHERE user_id = $2 AND read = FALSE",
        )
        .bind(at)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl NotificationStore for MemoryTable<Notification> {
    async fn list_for_user(
        &self,
        user_id: Id,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Notification>> {
        let mut rows = self.select(|n| n.user_id == user_id && (!unread_only || !n.read));
        rows.reverse();
        Ok(paginate(rows, limit, offset))
    }

    async fn count_for_user(&self, user_id: Id, unread_only: bool) -> RepositoryResult<i64> {
        let count = self.count_where(|n| n.user_id == user_id && (!unread_only || !n.read));
        Ok(count as i64)
    }

    async fn mark_all_read(&self, user_id: Id, at: DateTime<Utc>) -> RepositoryResult<u64> {
        let changed = self.modify_where(|n| {
            if n.user_id == user_id && !n.read {
                n.mark_read(at);
                true
            } else {
                false
            }
        });
        Ok(changed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use erp_models::NotificationKind;

    #[tokio::test]
    async fn test_unread_counts_and_mark_all_read() {
        let table = MemoryTable::<Notification>::new("Notification");
        let store: &dyn NotificationStore = &table;
        for i in 0..3 {
            store
                .create(NewNotification::new(1, NotificationKind::Task, format!("t{}", i), "m"))
                .await
                .unwrap();
        }
        store
            .create(NewNotification::new(2, NotificationKind::Task, "other", "m"))
            .await
            .unwrap();

        assert_eq!(store.count_for_user(1, true).await.unwrap(), 3);

        let newest = store.list_for_user(1, false, 1, 0).await.unwrap();
        assert_eq!(newest[0].title, "t2");

        assert_eq!(store.mark_all_read(1, Utc::now()).await.unwrap(), 3);
        assert_eq!(store.count_for_user(1, true).await.unwrap(), 0);
        assert_eq!(store.count_for_user(2, true).await.unwrap(), 1);
    }
}
