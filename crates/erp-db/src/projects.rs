//! Project repository

use std::collections::BTreeMap;

use async_trait::async_trait;
use erp_core::Id;
use erp_models::{NewProject, Priority, Project, ProjectStatus};
use sqlx::PgPool;

use crate::memory::MemoryTable;
use crate::repository::{
    contains_ci, like_pattern, paginate, Repository, RepositoryError, RepositoryResult,
};

const COLUMNS: &str = "id, name, description, status, priority, start_date, end_date, budget, \
                       progress, manager_id, owner_id, team, members, department, created_at, updated_at";

/// Restricts a listing to projects a user is attached to
#[derive(Debug, Clone, Copy)]
pub struct ProjectViewer {
    pub user_id: Id,
    pub employee_id: Option<Id>,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    pub priority: Option<Priority>,
    /// Name or description substring
    pub search: Option<String>,
    pub department: Option<String>,
    pub visible_to: Option<ProjectViewer>,
}

impl ProjectFilter {
    pub fn matches(&self, project: &Project) -> bool {
        if self.status.map_or(false, |s| s != project.status) {
            return false;
        }
        if self.priority.map_or(false, |p| p != project.priority) {
            return false;
        }
        if let Some(ref term) = self.search {
            if !contains_ci(&project.name, term) && !contains_ci(&project.description, term) {
                return false;
            }
        }
        if self.department.is_some() && self.department != project.department {
            return false;
        }
        match self.visible_to {
            Some(viewer) => project.is_assigned(viewer.user_id, viewer.employee_id),
            None => true,
        }
    }
}

#[async_trait]
pub trait ProjectStore: Repository<Project, NewProject, Project> {
    async fn list(
        &self,
        filter: &ProjectFilter,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Project>>;

    async fn count_matching(&self, filter: &ProjectFilter) -> RepositoryResult<i64>;

    /// Project count per status text
    async fn count_by_status(&self) -> RepositoryResult<BTreeMap<String, i64>>;
}

/// Project repository implementation
pub struct PgProjectRepository {
    pool: PgPool,
}

impl PgProjectRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const FILTER: &str = r#"
    ($1::text IS NULL OR status = $1)
    AND ($2::text IS NULL OR priority = $2)
    AND ($3::text IS NULL OR name ILIKE $3 OR description ILIKE $3)
    AND ($4::text IS NULL OR department = $4)
    AND ($5::bigint IS NULL
         OR owner_id = $5
         OR $5 = ANY(members)
         OR ($6::bigint IS NOT NULL AND (manager_id = $6 OR $6 = ANY(team))))
"#;

#[async_trait]
impl Repository<Project, NewProject, Project> for PgProjectRepository {
    async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<Project>> {
        let sql = format!("SELECT {COLUMNS} FROM projects WHERE id = $1");
        let row = sqlx::query_as::<_, Project>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Project>> {
        let sql = format!("SELECT {COLUMNS} FROM projects ORDER BY id LIMIT $1 OFFSET $2");
        let rows = sqlx::query_as::<_, Project>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn count(&self) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM projects")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn create(&self, dto: NewProject) -> RepositoryResult<Project> {
        let sql = format!(
            r#"
            INSERT INTO projects (
                name, description, status, priority, start_date, end_date, budget,
                progress, manager_id, owner_id, team, members, department,
                created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, 0, $8, $9, $10, $11, $12, NOW(), NOW()
            )
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Project>(&sql)
            .bind(&dto.name)
            .bind(&dto.description)
            .bind(dto.status.as_str())
            .bind(dto.priority.as_str())
            .bind(dto.start_date)
            .bind(dto.end_date)
            .bind(dto.budget)
            .bind(dto.manager_id)
            .bind(dto.owner_id)
            .bind(&dto.team)
            .bind(&dto.members)
            .bind(&dto.department)
            .fetch_one(&self.pool)
            .await?;

        Ok(row)
    }

    async fn update(&self, id: Id, project: Project) -> RepositoryResult<Project> {
        let sql = format!(
            r#"
            UPDATE projects SET
                name = $1,
                description = $2,
                status = $3,
                priority = $4,
                start_date = $5,
                end_date = $6,
                budget = $7,
                progress = $8,
                manager_id = $9,
                team = $10,
                members = $11,
                department = $12,
                updated_at = NOW()
            WHERE id = $13
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Project>(&sql)
            .bind(&project.name)
            .bind(&project.description)
            .bind(project.status.as_str())
            .bind(project.priority.as_str())
            .bind(project.start_date)
            .bind(project.end_date)
            .bind(project.budget)
            .bind(project.progress)
            .bind(project.manager_id)
            .bind(&project.team)
            .bind(&project.members)
            .bind(&project.department)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Project", id))?;

        Ok(row)
    }

    async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("Project", id));
        }

        Ok(())
    }

    async fn exists(&self, id: Id) -> RepositoryResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM projects WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }
}

#[async_trait]
impl ProjectStore for PgProjectRepository {
    async fn list(
        &self,
        filter: &ProjectFilter,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Project>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM projects WHERE {FILTER} \
             ORDER BY created_at DESC, id DESC LIMIT $7 OFFSET $8"
        );
        let rows = sqlx::query_as::<_, Project>(&sql)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.priority.map(|p| p.as_str()))
            .bind(filter.search.as_deref().map(like_pattern))
            .bind(filter.department.as_deref())
            .bind(filter.visible_to.map(|v| v.user_id))
            .bind(filter.visible_to.and_then(|v| v.employee_id))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn count_matching(&self, filter: &ProjectFilter) -> RepositoryResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM projects WHERE {FILTER}");
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.priority.map(|p| p.as_str()))
            .bind(filter.search.as_deref().map(like_pattern))
            .bind(filter.department.as_deref())
            .bind(filter.visible_to.map(|v| v.user_id))
            .bind(filter.visible_to.and_then(|v| v.employee_id))
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn count_by_status(&self) -> RepositoryResult<BTreeMap<String, i64>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM projects GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }
}

#[async_trait]
impl ProjectStore for MemoryTable<Project> {
    async fn list(
        &self,
        filter: &ProjectFilter,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Project>> {
        let mut rows = self.select(|p| filter.matches(p));
        rows.reverse();
        Ok(paginate(rows, limit, offset))
    }

    async fn count_matching(&self, filter: &ProjectFilter) -> RepositoryResult<i64> {
        Ok(self.count_where(|p| filter.matches(p)) as i64)
    }

    async fn count_by_status(&self) -> RepositoryResult<BTreeMap<String, i64>> {
        let mut counts = BTreeMap::new();
        for project in self.select(|_| true) {
            *counts.entry(project.status.to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn new_project(name: &str, owner: Id, team: Vec<Id>) -> NewProject {
        NewProject {
            name: name.into(),
            description: String::new(),
            status: ProjectStatus::Active,
            priority: Priority::Medium,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: None,
            budget: 0.0,
            manager_id: None,
            owner_id: owner,
            team,
            members: vec![],
            department: None,
        }
    }

    #[tokio::test]
    async fn test_visibility_filter() {
        let table = MemoryTable::<Project>::new("Project");
        let store: &dyn ProjectStore = &table;
        store.create(new_project("Mine", 1, vec![])).await.unwrap();
        store.create(new_project("Team", 2, vec![40])).await.unwrap();
        store.create(new_project("Other", 3, vec![])).await.unwrap();

        let filter = ProjectFilter {
            visible_to: Some(ProjectViewer {
                user_id: 1,
                employee_id: Some(40),
            }),
            ..Default::default()
        };
        let visible = store.list(&filter, 50, 0).await.unwrap();
        let names: Vec<_> = visible.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Team", "Mine"]);

        let counts = store.count_by_status().await.unwrap();
        assert_eq!(counts.get("active"), Some(&3));
    }
}
