//! Activity log repository
//!
//! The log is append-only: the store exposes no update or delete.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use erp_core::Id;
use erp_models::{ActivityAction, ActivityLog, NewActivityLog, NewRecord};
use serde::Serialize;
use sqlx::PgPool;

use crate::memory::MemoryTable;
use crate::repository::{paginate, RepositoryResult};

const COLUMNS: &str = "id, user_id, user_name, action, resource, resource_id, method, path, \
                       status_code, duration_ms, ip_address, user_agent, success, details, created_at";

const FILTER: &str = r#"
    ($1::bigint IS NULL OR user_id = $1)
    AND ($2::text IS NULL OR resource = $2)
    AND ($3::text IS NULL OR action = $3)
    AND ($4::boolean IS NULL OR success = $4)
    AND ($5::timestamptz IS NULL OR created_at >= $5)
    AND ($6::timestamptz IS NULL OR created_at <= $6)
"#;

#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub user_id: Option<Id>,
    pub resource: Option<String>,
    pub action: Option<ActivityAction>,
    pub success: Option<bool>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl ActivityFilter {
    pub fn matches(&self, log: &ActivityLog) -> bool {
        self.user_id.map_or(true, |id| log.user_id == Some(id))
            && self.resource.as_ref().map_or(true, |r| *r == log.resource)
            && self.action.map_or(true, |a| a == log.action)
            && self.success.map_or(true, |s| s == log.success)
            && self.from.map_or(true, |from| log.created_at >= from)
            && self.to.map_or(true, |to| log.created_at <= to)
    }
}

/// Aggregate counts over a filtered slice of the log
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityCounts {
    pub total: i64,
    pub failures: i64,
    pub by_action: BTreeMap<String, i64>,
    pub by_resource: BTreeMap<String, i64>,
}

#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn append(&self, entry: NewActivityLog) -> RepositoryResult<ActivityLog>;

    /// Newest first
    async fn list(
        &self,
        filter: &ActivityFilter,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<ActivityLog>>;

    async fn count(&self, filter: &ActivityFilter) -> RepositoryResult<i64>;

    async fn counts(&self, filter: &ActivityFilter) -> RepositoryResult<ActivityCounts>;
}

/// Activity log repository implementation
pub struct PgActivityRepository {
    pool: PgPool,
}

impl PgActivityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn group_by(
        &self,
        column: &str,
        filter: &ActivityFilter,
    ) -> RepositoryResult<BTreeMap<String, i64>> {
        let sql = format!(
            "SELECT {column}, COUNT(*) FROM activity_logs WHERE {FILTER} GROUP BY {column}"
        );
        let rows = sqlx::query_as::<_, (String, i64)>(&sql)
            .bind(filter.user_id)
            .bind(filter.resource.as_deref())
            .bind(filter.action.map(|a| a.as_str()))
            .bind(filter.success)
            .bind(filter.from)
            .bind(filter.to)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().collect())
    }
}

#[async_trait]
impl ActivityStore for PgActivityRepository {
    async fn append(&self, entry: NewActivityLog) -> RepositoryResult<ActivityLog> {
        let success = entry.success();
        let sql = format!(
            r#"
            INSERT INTO activity_logs (
                user_id, user_name, action, resource, resource_id, method, path, status_code,
                duration_ms, ip_address, user_agent, success, details, created_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW()
            )
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ActivityLog>(&sql)
            .bind(entry.user_id)
            .bind(&entry.user_name)
            .bind(entry.action.as_str())
            .bind(&entry.resource)
            .bind(&entry.resource_id)
            .bind(&entry.method)
            .bind(&entry.path)
            .bind(entry.status_code)
            .bind(entry.duration_ms)
            .bind(&entry.ip_address)
            .bind(&entry.user_agent)
            .bind(success)
            .bind(sqlx::types::Json(&entry.details))
            .fetch_one(&self.pool)
            .await?;

        Ok(row)
    }

    async fn list(
        &self,
        filter: &ActivityFilter,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<ActivityLog>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM activity_logs WHERE {FILTER} \
             ORDER BY created_at DESC, id DESC LIMIT $7 OFFSET $8"
        );
        let rows = sqlx::query_as::<_, ActivityLog>(&sql)
            .bind(filter.user_id)
            .bind(filter.resource.as_deref())
            .bind(filter.action.map(|a| a.as_str()))
            .bind(filter.success)
            .bind(filter.from)
            .bind(filter.to)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn count(&self, filter: &ActivityFilter) -> RepositoryResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM activity_logs WHERE {FILTER}");
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(filter.user_id)
            .bind(filter.resource.as_deref())
            .bind(filter.action.map(|a| a.as_str()))
            .bind(filter.success)
            .bind(filter.from)
            .bind(filter.to)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn counts(&self, filter: &ActivityFilter) -> RepositoryResult<ActivityCounts> {
        let total = self.count(filter).await?;
        let failures = self
            .count(&ActivityFilter {
                success: Some(false),
                ..filter.clone()
            })
            .await?;

        Ok(ActivityCounts {
            total,
            failures,
            by_action: self.group_by("action", filter).await?,
            by_resource: self.group_by("resource", filter).await?,
        })
    }
}

#[async_trait]
impl ActivityStore for MemoryTable<ActivityLog> {
    async fn append(&self, entry: NewActivityLog) -> RepositoryResult<ActivityLog> {
        let now = Utc::now();
        Ok(self.insert_with(|id| entry.into_record(id, now)))
    }

    async fn list(
        &self,
        filter: &ActivityFilter,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<ActivityLog>> {
        let mut rows = self.select(|log| filter.matches(log));
        rows.reverse();
        Ok(paginate(rows, limit, offset))
    }

    async fn count(&self, filter: &ActivityFilter) -> RepositoryResult<i64> {
        Ok(self.count_where(|log| filter.matches(log)) as i64)
    }

    async fn counts(&self, filter: &ActivityFilter) -> RepositoryResult<ActivityCounts> {
        let mut counts = ActivityCounts::default();
        for log in self.select(|log| filter.matches(log)) {
            counts.total += 1;
            if !log.success {
                counts.failures += 1;
            }
            *counts.by_action.entry(log.action.to_string()).or_default() += 1;
            *counts.by_resource.entry(log.resource).or_default() += 1;
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(resource: &str, method: &str, status_code: i32) -> NewActivityLog {
        NewActivityLog {
            user_id: Some(1),
            user_name: "Asha".into(),
            action: ActivityAction::from_method(method),
            resource: resource.into(),
            resource_id: None,
            method: method.into(),
            path: format!("/api/{}", resource),
            status_code,
            duration_ms: 3,
            ip_address: None,
            user_agent: None,
            details: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_counts_group_by_action_and_resource() {
        let store = MemoryTable::<ActivityLog>::new("ActivityLog");
        store.append(entry("projects", "POST", 201)).await.unwrap();
        store.append(entry("projects", "PUT", 200)).await.unwrap();
        store.append(entry("tasks", "POST", 403)).await.unwrap();

        let counts = store.counts(&ActivityFilter::default()).await.unwrap();
        assert_eq!(counts.total, 3);
        assert_eq!(counts.failures, 1);
        assert_eq!(counts.by_action.get("create"), Some(&2));
        assert_eq!(counts.by_resource.get("projects"), Some(&2));
    }

    #[tokio::test]
    async fn test_list_filters_and_orders_newest_first() {
        let store = MemoryTable::<ActivityLog>::new("ActivityLog");
        store.append(entry("projects", "POST", 201)).await.unwrap();
        store.append(entry("tasks", "POST", 201)).await.unwrap();
        store.append(entry("tasks", "DELETE", 500)).await.unwrap();

        let filter = ActivityFilter {
            resource: Some("tasks".into()),
            ..Default::default()
        };
        let rows = store.list(&filter, 10, 0).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].action, ActivityAction::Delete);
        assert!(!rows[0].success);

        let failed = ActivityFilter {
            success: Some(false),
            ..Default::default()
        };
        assert_eq!(store.count(&failed).await.unwrap(), 1);
    }
}
