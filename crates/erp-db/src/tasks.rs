//! Task repository
//!
//! Comments, time entries and dependencies are JSONB arrays on the task row.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use erp_core::Id;
use erp_models::{NewTask, Priority, Task, TaskStatus};
use sqlx::PgPool;

use crate::memory::MemoryTable;
use crate::repository::{
    contains_ci, like_pattern, paginate, Repository, RepositoryError, RepositoryResult,
};

const COLUMNS: &str = "id, project_id, title, description, status, priority, assigned_to, \
                       created_by, due_date, estimated_hours, actual_hours, tags, comments, \
                       time_entries, dependencies, completed_at, created_at, updated_at";

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub project_id: Option<Id>,
    /// Assigned employee
    pub assigned_to: Option<Id>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    /// Title or description substring
    pub search: Option<String>,
}

impl TaskFilter {
    pub fn for_project(project_id: Id) -> Self {
        Self {
            project_id: Some(project_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        if self.project_id.map_or(false, |id| id != task.project_id) {
            return false;
        }
        if self.assigned_to.is_some() && self.assigned_to != task.assigned_to {
            return false;
        }
        if self.status.map_or(false, |s| s != task.status) {
            return false;
        }
        if self.priority.map_or(false, |p| p != task.priority) {
            return false;
        }
        match self.search {
            Some(ref term) => contains_ci(&task.title, term) || contains_ci(&task.description, term),
            None => true,
        }
    }
}

#[async_trait]
pub trait TaskStore: Repository<Task, NewTask, Task> {
    async fn list(&self, filter: &TaskFilter, limit: i64, offset: i64)
        -> RepositoryResult<Vec<Task>>;

    async fn count_matching(&self, filter: &TaskFilter) -> RepositoryResult<i64>;

    /// Task count per status text, optionally within one project
    async fn count_by_status(&self, project_id: Option<Id>)
        -> RepositoryResult<BTreeMap<String, i64>>;

    /// Open tasks whose due date is before `today`
    async fn count_overdue(&self, today: NaiveDate) -> RepositoryResult<i64>;

    async fn delete_for_project(&self, project_id: Id) -> RepositoryResult<u64>;

    /// Removes `task_id` from every dependency list; returns the rows changed
    async fn drop_dependency_on(&self, task_id: Id) -> RepositoryResult<u64>;
}

/// Task repository implementation
pub struct PgTaskRepository {
    pool: PgPool,
}

impl PgTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const FILTER: &str = r#"
    ($1::bigint IS NULL OR project_id = $1)
    AND ($2::bigint IS NULL OR assigned_to = $2)
    AND ($3::text IS NULL OR status = $3)
    AND ($4::text IS NULL OR priority = $4)
    AND ($5::text IS NULL OR title ILIKE $5 OR description ILIKE $5)
"#;

#[async_trait]
impl Repository<Task, NewTask, Task> for PgTaskRepository {
    async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<Task>> {
        let sql = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1");
        let row = sqlx::query_as::<_, Task>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Task>> {
        let sql = format!("SELECT {COLUMNS} FROM tasks ORDER BY id LIMIT $1 OFFSET $2");
        let rows = sqlx::query_as::<_, Task>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn count(&self) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tasks")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn create(&self, dto: NewTask) -> RepositoryResult<Task> {
        let sql = format!(
            r#"
            INSERT INTO tasks (
                project_id, title, description, status, priority, assigned_to, created_by,
                due_date, estimated_hours, actual_hours, tags, comments, time_entries,
                dependencies, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, 0, $10, '[]'::jsonb, '[]'::jsonb,
                '[]'::jsonb, NOW(), NOW()
            )
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Task>(&sql)
            .bind(dto.project_id)
            .bind(&dto.title)
            .bind(&dto.description)
            .bind(dto.status.as_str())
            .bind(dto.priority.as_str())
            .bind(dto.assigned_to)
            .bind(dto.created_by)
            .bind(dto.due_date)
            .bind(dto.estimated_hours)
            .bind(&dto.tags)
            .fetch_one(&self.pool)
            .await?;

        Ok(row)
    }

    async fn update(&self, id: Id, task: Task) -> RepositoryResult<Task> {
        let sql = format!(
            r#"
            UPDATE tasks SET
                title = $1,
                description = $2,
                status = $3,
                priority = $4,
                assigned_to = $5,
                due_date = $6,
                estimated_hours = $7,
                actual_hours = $8,
                tags = $9,
                comments = $10,
                time_entries = $11,
                dependencies = $12,
                completed_at = $13,
                updated_at = NOW()
            WHERE id = $14
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Task>(&sql)
            .bind(&task.title)
            .bind(&task.description)
            .bind(task.status.as_str())
            .bind(task.priority.as_str())
            .bind(task.assigned_to)
            .bind(task.due_date)
            .bind(task.estimated_hours)
            .bind(task.actual_hours)
            .bind(&task.tags)
            .bind(&task.comments)
            .bind(&task.time_entries)
            .bind(&task.dependencies)
            .bind(task.completed_at)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Task", id))?;

        Ok(row)
    }

    async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("Task", id));
        }

        Ok(())
    }

    async fn exists(&self, id: Id) -> RepositoryResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM tasks WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }
}

#[async_trait]
impl TaskStore for PgTaskRepository {
    async fn list(
        &self,
        filter: &TaskFilter,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Task>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM tasks WHERE {FILTER} \
             ORDER BY created_at DESC, id DESC LIMIT $6 OFFSET $7"
        );
        let rows = sqlx::query_as::<_, Task>(&sql)
            .bind(filter.project_id)
            .bind(filter.assigned_to)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.priority.map(|p| p.as_str()))
            .bind(filter.search.as_deref().map(like_pattern))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn count_matching(&self, filter: &TaskFilter) -> RepositoryResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM tasks WHERE {FILTER}");
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(filter.project_id)
            .bind(filter.assigned_to)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.priority.map(|p| p.as_str()))
            .bind(filter.search.as_deref().map(like_pattern))
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn count_by_status(
        &self,
        project_id: Option<Id>,
    ) -> RepositoryResult<BTreeMap<String, i64>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT status, COUNT(*) FROM tasks
            WHERE ($1::bigint IS NULL OR project_id = $1)
            GROUP BY status
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn count_overdue(&self, today: NaiveDate) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tasks WHERE status <> 'completed' AND due_date < $1",
        )
        .bind(today)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn delete_for_project(&self, project_id: Id) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM tasks WHERE project_id = $1")
            .bind(project_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn drop_dependency_on(&self, task_id: Id) -> RepositoryResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE tasks SET
                dependencies = COALESCE(
                    (SELECT jsonb_agg(d) FROM jsonb_array_elements(dependencies) d
                     WHERE (d->>'taskId')::bigint <> $1),
                    '[]'::jsonb
                ),
                updated_at = NOW()
            WHERE dependencies @> jsonb_build_array(jsonb_build_object('taskId', $1::bigint))
            "#,
        )
        .bind(task_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl TaskStore for MemoryTable<Task> {
    async fn list(
        &self,
        filter: &TaskFilter,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Task>> {
        let mut rows = self.select(|t| filter.matches(t));
        rows.reverse();
        Ok(paginate(rows, limit, offset))
    }

    async fn count_matching(&self, filter: &TaskFilter) -> RepositoryResult<i64> {
        Ok(self.count_where(|t| filter.matches(t)) as i64)
    }

    async fn count_by_status(
        &self,
        project_id: Option<Id>,
    ) -> RepositoryResult<BTreeMap<String, i64>> {
        let mut counts = BTreeMap::new();
        for task in self.select(|t| project_id.map_or(true, |id| t.project_id == id)) {
            *counts.entry(task.status.to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn count_overdue(&self, today: NaiveDate) -> RepositoryResult<i64> {
        Ok(self.count_where(|t| t.is_overdue(today)) as i64)
    }

    async fn delete_for_project(&self, project_id: Id) -> RepositoryResult<u64> {
        Ok(self.remove_where(|t| t.project_id == project_id) as u64)
    }

    async fn drop_dependency_on(&self, task_id: Id) -> RepositoryResult<u64> {
        Ok(self.modify_where(|t| t.remove_dependency(task_id)) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_task(project_id: Id, title: &str, due: Option<NaiveDate>) -> NewTask {
        NewTask {
            project_id,
            title: title.into(),
            description: String::new(),
            status: TaskStatus::Todo,
            priority: Priority::High,
            assigned_to: Some(7),
            created_by: 1,
            due_date: due,
            estimated_hours: 4.0,
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn test_counts_and_project_cascade() {
        let table = MemoryTable::<Task>::new("Task");
        let store: &dyn TaskStore = &table;
        let yesterday = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();

        store.create(new_task(1, "Outline", Some(yesterday))).await.unwrap();
        let done = store.create(new_task(1, "Build", Some(yesterday))).await.unwrap();
        store.create(new_task(2, "Ship", None)).await.unwrap();

        let mut done = done;
        done.set_status(TaskStatus::Completed, chrono::Utc::now());
        store.update(done.id, done).await.unwrap();

        assert_eq!(store.count_overdue(today).await.unwrap(), 1);

        let counts = store.count_by_status(Some(1)).await.unwrap();
        assert_eq!(counts.get("todo"), Some(&1));
        assert_eq!(counts.get("completed"), Some(&1));

        assert_eq!(store.delete_for_project(1).await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_drop_dependency_on_deleted_task() {
        let table = MemoryTable::<Task>::new("Task");
        let store: &dyn TaskStore = &table;
        let design = store.create(new_task(1, "Design", None)).await.unwrap();
        let mut build = store.create(new_task(1, "Build", None)).await.unwrap();
        build.add_dependency(design.id, erp_models::DependencyType::FinishToStart);
        let build = store.update(build.id, build).await.unwrap();
        assert!(build.depends_on(design.id));

        assert_eq!(store.drop_dependency_on(design.id).await.unwrap(), 1);
        assert_eq!(store.drop_dependency_on(design.id).await.unwrap(), 0);
        let build = store.find_by_id(build.id).await.unwrap().unwrap();
        assert!(build.dependencies.is_empty());
    }
}
