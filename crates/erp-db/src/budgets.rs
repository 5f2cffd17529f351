//! Budget and budget-alert repositories
//!
//! Categories and approvals are JSONB arrays on the budget row. Alerts are
//! unique per (budget_id, threshold); inserting an existing pair is a no-op.

use async_trait::async_trait;
use chrono::Utc;
use erp_core::Id;
use erp_models::{
    Budget, BudgetAlert, BudgetStatus, BudgetType, NewBudget, NewBudgetAlert, NewRecord,
};
use sqlx::PgPool;

use crate::memory::MemoryTable;
use crate::repository::{Repository, RepositoryError, RepositoryResult};

const COLUMNS: &str = "id, project_id, project_name, budget_type, department, total_budget, \
                       actual_spent, currency, categories, status, fiscal_year, fiscal_period, \
                       approvals, notes, created_by, created_at, updated_at";

const ALERT_COLUMNS: &str = "id, budget_id, threshold, utilization, severity, message, created_at";

#[derive(Debug, Clone, Default)]
pub struct BudgetFilter {
    pub status: Option<BudgetStatus>,
    pub budget_type: Option<BudgetType>,
    pub project_id: Option<Id>,
    pub department: Option<String>,
    pub fiscal_year: Option<i32>,
}

impl BudgetFilter {
    pub fn matches(&self, budget: &Budget) -> bool {
        self.status.map_or(true, |s| s == budget.status)
            && self.budget_type.map_or(true, |t| t == budget.budget_type)
            && self.project_id.map_or(true, |id| budget.project_id == Some(id))
            && self
                .department
                .as_ref()
                .map_or(true, |d| budget.department.as_ref() == Some(d))
            && self.fiscal_year.map_or(true, |y| y == budget.fiscal_year)
    }
}

#[async_trait]
pub trait BudgetStore: Repository<Budget, NewBudget, Budget> {
    /// Newest first
    async fn list(&self, filter: &BudgetFilter) -> RepositoryResult<Vec<Budget>>;
}

#[async_trait]
pub trait BudgetAlertStore: Send + Sync {
    /// Store the alert unless (budget, threshold) already has one.
    /// Returns the new row, or `None` when it already existed.
    async fn insert_if_absent(&self, alert: NewBudgetAlert) -> RepositoryResult<Option<BudgetAlert>>;

    async fn list_for_budget(&self, budget_id: Id) -> RepositoryResult<Vec<BudgetAlert>>;

    async fn delete_for_budget(&self, budget_id: Id) -> RepositoryResult<u64>;
}

/// Budget repository implementation
pub struct PgBudgetRepository {
    pool: PgPool,
}

impl PgBudgetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<Budget, NewBudget, Budget> for PgBudgetRepository {
    async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<Budget>> {
        let sql = format!("SELECT {COLUMNS} FROM budgets WHERE id = $1");
        let row = sqlx::query_as::<_, Budget>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Budget>> {
        let sql = format!("SELECT {COLUMNS} FROM budgets ORDER BY id LIMIT $1 OFFSET $2");
        let rows = sqlx::query_as::<_, Budget>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn count(&self) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM budgets")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn create(&self, dto: NewBudget) -> RepositoryResult<Budget> {
        // Initial status and spent total come from the category breakdown
        let record = dto.into_record(0, Utc::now());

        let sql = format!(
            r#"
            INSERT INTO budgets (
                project_id, project_name, budget_type, department, total_budget, actual_spent,
                currency, categories, status, fiscal_year, fiscal_period, approvals, notes,
                created_by, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, NOW(), NOW()
            )
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Budget>(&sql)
            .bind(record.project_id)
            .bind(&record.project_name)
            .bind(record.budget_type.as_str())
            .bind(&record.department)
            .bind(record.total_budget)
            .bind(record.actual_spent)
            .bind(&record.currency)
            .bind(&record.categories)
            .bind(record.status.as_str())
            .bind(record.fiscal_year)
            .bind(&record.fiscal_period)
            .bind(&record.approvals)
            .bind(&record.notes)
            .bind(record.created_by)
            .fetch_one(&self.pool)
            .await?;

        Ok(row)
    }

    async fn update(&self, id: Id, budget: Budget) -> RepositoryResult<Budget> {
        let sql = format!(
            r#"
            UPDATE budgets SET
                project_id = $1,
                project_name = $2,
                budget_type = $3,
                department = $4,
                total_budget = $5,
                actual_spent = $6,
                currency = $7,
                categories = $8,
                status = $9,
                fiscal_year = $10,
                fiscal_period = $11,
                approvals = $12,
                notes = $13,
                updated_at = NOW()
            WHERE id = $14
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Budget>(&sql)
            .bind(budget.project_id)
            .bind(&budget.project_name)
            .bind(budget.budget_type.as_str())
            .bind(&budget.department)
            .bind(budget.total_budget)
            .bind(budget.actual_spent)
            .bind(&budget.currency)
            .bind(&budget.categories)
            .bind(budget.status.as_str())
            .bind(budget.fiscal_year)
            .bind(&budget.fiscal_period)
            .bind(&budget.approvals)
            .bind(&budget.notes)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Budget", id))?;

        Ok(row)
    }

    async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM budgets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("Budget", id));
        }

        Ok(())
    }

    async fn exists(&self, id: Id) -> RepositoryResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM budgets WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }
}

#[async_trait]
impl BudgetStore for PgBudgetRepository {
    async fn list(&self, filter: &BudgetFilter) -> RepositoryResult<Vec<Budget>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM budgets
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR budget_type = $2)
              AND ($3::bigint IS NULL OR project_id = $3)
              AND ($4::text IS NULL OR department = $4)
              AND ($5::int IS NULL OR fiscal_year = $5)
            ORDER BY created_at DESC, id DESC
            "#
        );
        let rows = sqlx::query_as::<_, Budget>(&sql)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.budget_type.map(|t| t.as_str()))
            .bind(filter.project_id)
            .bind(filter.department.as_deref())
            .bind(filter.fiscal_year)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }
}

/// Budget alert repository implementation
pub struct PgBudgetAlertRepository {
    pool: PgPool,
}

impl PgBudgetAlertRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BudgetAlertStore for PgBudgetAlertRepository {
    async fn insert_if_absent(&self, alert: NewBudgetAlert) -> RepositoryResult<Option<BudgetAlert>> {
        let sql = format!(
            r#"
            INSERT INTO budget_alerts (budget_id, threshold, utilization, severity, message, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (budget_id, threshold) DO NOTHING
            RETURNING {ALERT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, BudgetAlert>(&sql)
            .bind(alert.budget_id)
            .bind(alert.threshold)
            .bind(alert.utilization)
            .bind(alert.severity.as_str())
            .bind(&alert.message)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn list_for_budget(&self, budget_id: Id) -> RepositoryResult<Vec<BudgetAlert>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM budget_alerts WHERE budget_id = $1 ORDER BY threshold"
        );
        let rows = sqlx::query_as::<_, BudgetAlert>(&sql)
            .bind(budget_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn delete_for_budget(&self, budget_id: Id) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM budget_alerts WHERE budget_id = $1")
            .bind(budget_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl BudgetStore for MemoryTable<Budget> {
    async fn list(&self, filter: &BudgetFilter) -> RepositoryResult<Vec<Budget>> {
        let mut rows = self.select(|b| filter.matches(b));
        rows.reverse();
        Ok(rows)
    }
}

#[async_trait]
impl BudgetAlertStore for MemoryTable<BudgetAlert> {
    async fn insert_if_absent(&self, alert: NewBudgetAlert) -> RepositoryResult<Option<BudgetAlert>> {
        let (budget_id, threshold) = (alert.budget_id, alert.threshold);
        let now = Utc::now();
        Ok(self.insert_unless(
            |a| a.budget_id == budget_id && a.threshold == threshold,
            |id| alert.into_record(id, now),
        ))
    }

    async fn list_for_budget(&self, budget_id: Id) -> RepositoryResult<Vec<BudgetAlert>> {
        let mut rows = self.select(|a| a.budget_id == budget_id);
        rows.sort_by_key(|a| a.threshold);
        Ok(rows)
    }

    async fn delete_for_budget(&self, budget_id: Id) -> RepositoryResult<u64> {
        Ok(self.remove_where(|a| a.budget_id == budget_id) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use erp_models::AlertSeverity;

    fn alert(budget_id: Id, threshold: i32) -> NewBudgetAlert {
        NewBudgetAlert {
            budget_id,
            threshold,
            utilization: threshold as f64,
            severity: AlertSeverity::for_threshold(threshold),
            message: format!("{}% reached", threshold),
        }
    }

    #[tokio::test]
    async fn test_alert_stored_once_per_threshold() {
        let store = MemoryTable::<BudgetAlert>::new("BudgetAlert");

        assert!(store.insert_if_absent(alert(1, 80)).await.unwrap().is_some());
        assert!(store.insert_if_absent(alert(1, 80)).await.unwrap().is_none());
        assert!(store.insert_if_absent(alert(1, 90)).await.unwrap().is_some());
        assert!(store.insert_if_absent(alert(2, 80)).await.unwrap().is_some());

        let alerts = store.list_for_budget(1).await.unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[1].severity, AlertSeverity::High);

        assert_eq!(store.delete_for_budget(1).await.unwrap(), 2);
    }
}
