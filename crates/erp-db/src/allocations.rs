//! Resource allocation repository

use async_trait::async_trait;
use chrono::NaiveDate;
use erp_core::Id;
use erp_models::{AllocationStatus, NewResourceAllocation, ResourceAllocation};
use sqlx::PgPool;

use crate::memory::MemoryTable;
use crate::repository::{Repository, RepositoryError, RepositoryResult};

const COLUMNS: &str = "id, employee_id, project_id, start_date, end_date, allocated_hours, role, \
                       status, utilization_rate, notes, created_by, created_at, updated_at";

#[derive(Debug, Clone, Default)]
pub struct AllocationFilter {
    pub employee_id: Option<Id>,
    pub project_id: Option<Id>,
    /// Empty means any status
    pub statuses: Vec<AllocationStatus>,
    /// Inclusive range the allocation must overlap
    pub overlapping: Option<(NaiveDate, NaiveDate)>,
}

impl AllocationFilter {
    /// Planned or active allocations of one employee overlapping a range
    pub fn committed(employee_id: Id, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            employee_id: Some(employee_id),
            project_id: None,
            statuses: vec![AllocationStatus::Planned, AllocationStatus::Active],
            overlapping: Some((start, end)),
        }
    }

    pub fn matches(&self, allocation: &ResourceAllocation) -> bool {
        self.employee_id.map_or(true, |id| id == allocation.employee_id)
            && self.project_id.map_or(true, |id| id == allocation.project_id)
            && (self.statuses.is_empty() || self.statuses.contains(&allocation.status))
            && self
                .overlapping
                .map_or(true, |(start, end)| allocation.overlaps(start, end))
    }

    fn status_texts(&self) -> Option<Vec<String>> {
        if self.statuses.is_empty() {
            None
        } else {
            Some(self.statuses.iter().map(|s| s.to_string()).collect())
        }
    }
}

#[async_trait]
pub trait AllocationStore:
    Repository<ResourceAllocation, NewResourceAllocation, ResourceAllocation>
{
    /// Ordered by start date
    async fn list(&self, filter: &AllocationFilter) -> RepositoryResult<Vec<ResourceAllocation>>;
}

/// Resource allocation repository implementation
pub struct PgAllocationRepository {
    pool: PgPool,
}

impl PgAllocationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<ResourceAllocation, NewResourceAllocation, ResourceAllocation>
    for PgAllocationRepository
{
    async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<ResourceAllocation>> {
        let sql = format!("SELECT {COLUMNS} FROM resource_allocations WHERE id = $1");
        let row = sqlx::query_as::<_, ResourceAllocation>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<ResourceAllocation>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM resource_allocations ORDER BY id LIMIT $1 OFFSET $2"
        );
        let rows = sqlx::query_as::<_, ResourceAllocation>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn count(&self) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM resource_allocations")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn create(&self, dto: NewResourceAllocation) -> RepositoryResult<ResourceAllocation> {
        let sql = format!(
            r#"
            INSERT INTO resource_allocations (
                employee_id, project_id, start_date, end_date, allocated_hours, role, status,
                utilization_rate, notes, created_by, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW()
            )
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ResourceAllocation>(&sql)
            .bind(dto.employee_id)
            .bind(dto.project_id)
            .bind(dto.start_date)
            .bind(dto.end_date)
            .bind(dto.allocated_hours)
            .bind(&dto.role)
            .bind(dto.status.as_str())
            .bind(dto.utilization_rate)
            .bind(&dto.notes)
            .bind(dto.created_by)
            .fetch_one(&self.pool)
            .await?;

        Ok(row)
    }

    async fn update(
        &self,
        id: Id,
        allocation: ResourceAllocation,
    ) -> RepositoryResult<ResourceAllocation> {
        let sql = format!(
            r#"
            UPDATE resource_allocations SET
                employee_id = $1,
                project_id = $2,
                start_date = $3,
                end_date = $4,
                allocated_hours = $5,
                role = $6,
                status = $7,
                utilization_rate = $8,
                notes = $9,
                updated_at = NOW()
            WHERE id = $10
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ResourceAllocation>(&sql)
            .bind(allocation.employee_id)
            .bind(allocation.project_id)
            .bind(allocation.start_date)
            .bind(allocation.end_date)
            .bind(allocation.allocated_hours)
            .bind(&allocation.role)
            .bind(allocation.status.as_str())
            .bind(allocation.utilization_rate)
            .bind(&allocation.notes)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Resource allocation", id))?;

        Ok(row)
    }

    async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM resource_allocations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("Resource allocation", id));
        }

        Ok(())
    }

    async fn exists(&self, id: Id) -> RepositoryResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM resource_allocations WHERE id = $1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}

#[async_trait]
impl AllocationStore for PgAllocationRepository {
    async fn list(&self, filter: &AllocationFilter) -> RepositoryResult<Vec<ResourceAllocation>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM resource_allocations
            WHERE ($1::bigint IS NULL OR employee_id = $1)
              AND ($2::bigint IS NULL OR project_id = $2)
              AND ($3::text[] IS NULL OR status = ANY($3))
              AND ($4::date IS NULL OR (start_date <= $5 AND end_date >= $4))
            ORDER BY start_date, id
            "#
        );
        let rows = sqlx::query_as::<_, ResourceAllocation>(&sql)
            .bind(filter.employee_id)
            .bind(filter.project_id)
            .bind(filter.status_texts())
            .bind(filter.overlapping.map(|(start, _)| start))
            .bind(filter.overlapping.map(|(_, end)| end))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }
}

#[async_trait]
impl AllocationStore for MemoryTable<ResourceAllocation> {
    async fn list(&self, filter: &AllocationFilter) -> RepositoryResult<Vec<ResourceAllocation>> {
        let mut rows = self.select(|a| filter.matches(a));
        rows.sort_by_key(|a| (a.start_date, a.id));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn new_allocation(start: u32, end: u32, status: AllocationStatus) -> NewResourceAllocation {
        NewResourceAllocation {
            employee_id: 5,
            project_id: 1,
            start_date: date(start),
            end_date: date(end),
            allocated_hours: 20.0,
            role: None,
            status,
            utilization_rate: 50.0,
            notes: None,
            created_by: 1,
        }
    }

    #[tokio::test]
    async fn test_committed_filter_skips_cancelled_and_disjoint() {
        let table = MemoryTable::<ResourceAllocation>::new("Resource allocation");
        let store: &dyn AllocationStore = &table;
        store.create(new_allocation(1, 10, AllocationStatus::Active)).await.unwrap();
        store.create(new_allocation(5, 15, AllocationStatus::Planned)).await.unwrap();
        store.create(new_allocation(5, 15, AllocationStatus::Cancelled)).await.unwrap();
        store.create(new_allocation(20, 25, AllocationStatus::Active)).await.unwrap();

        let found = store
            .list(&AllocationFilter::committed(5, date(10), date(12)))
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|a| a.status.is_committed()));
    }
}
