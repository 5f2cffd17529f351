//! Department repository

use async_trait::async_trait;
use erp_core::Id;
use erp_models::{Department, DepartmentStatus, NewDepartment};
use sqlx::PgPool;

use crate::memory::MemoryTable;
use crate::repository::{contains_ci, like_pattern, Repository, RepositoryError, RepositoryResult};

const COLUMNS: &str = "id, name, description, location, manager, budget, status, permissions, \
                       employee_count, created_at, updated_at";

#[derive(Debug, Clone, Default)]
pub struct DepartmentFilter {
    /// Name, manager name or location substring
    pub search: Option<String>,
    pub status: Option<DepartmentStatus>,
}

impl DepartmentFilter {
    pub fn matches(&self, department: &Department) -> bool {
        if let Some(ref term) = self.search {
            let hit = contains_ci(&department.name, term)
                || contains_ci(&department.location, term)
                || department
                    .manager_name()
                    .map_or(false, |name| contains_ci(name, term));
            if !hit {
                return false;
            }
        }
        self.status.map_or(true, |s| s == department.status)
    }
}

#[async_trait]
pub trait DepartmentStore: Repository<Department, NewDepartment, Department> {
    /// Case-insensitive lookup
    async fn find_by_name(&self, name: &str) -> RepositoryResult<Option<Department>>;

    /// Departments whose names are in `names`
    async fn find_by_names(&self, names: &[String]) -> RepositoryResult<Vec<Department>>;

    async fn list(&self, filter: &DepartmentFilter) -> RepositoryResult<Vec<Department>>;

    async fn set_employee_count(&self, id: Id, count: i32) -> RepositoryResult<()>;
}

/// Department repository implementation
pub struct PgDepartmentRepository {
    pool: PgPool,
}

impl PgDepartmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<Department, NewDepartment, Department> for PgDepartmentRepository {
    async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<Department>> {
        let sql = format!("SELECT {COLUMNS} FROM departments WHERE id = $1");
        let row = sqlx::query_as::<_, Department>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Department>> {
        let sql = format!("SELECT {COLUMNS} FROM departments ORDER BY name LIMIT $1 OFFSET $2");
        let rows = sqlx::query_as::<_, Department>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn count(&self) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM departments")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn create(&self, dto: NewDepartment) -> RepositoryResult<Department> {
        let sql = format!(
            r#"
            INSERT INTO departments (
                name, description, location, manager, budget, status, permissions,
                employee_count, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, 0, NOW(), NOW()
            )
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Department>(&sql)
            .bind(&dto.name)
            .bind(&dto.description)
            .bind(&dto.location)
            .bind(dto.manager.as_ref().map(sqlx::types::Json))
            .bind(dto.budget)
            .bind(dto.status.as_str())
            .bind(&dto.permissions)
            .fetch_one(&self.pool)
            .await?;

        Ok(row)
    }

    async fn update(&self, id: Id, department: Department) -> RepositoryResult<Department> {
        let sql = format!(
            r#"
            UPDATE departments SET
                name = $1,
                description = $2,
                location = $3,
                manager = $4,
                budget = $5,
                status = $6,
                permissions = $7,
                employee_count = $8,
                updated_at = NOW()
            WHERE id = $9
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Department>(&sql)
            .bind(&department.name)
            .bind(&department.description)
            .bind(&department.location)
            .bind(&department.manager)
            .bind(department.budget)
            .bind(department.status.as_str())
            .bind(&department.permissions)
            .bind(department.employee_count)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Department", id))?;

        Ok(row)
    }

    async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM departments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("Department", id));
        }

        Ok(())
    }

    async fn exists(&self, id: Id) -> RepositoryResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM departments WHERE id = $1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}

#[async_trait]
impl DepartmentStore for PgDepartmentRepository {
    async fn find_by_name(&self, name: &str) -> RepositoryResult<Option<Department>> {
        let sql = format!("SELECT {COLUMNS} FROM departments WHERE LOWER(name) = LOWER($1)");
        let row = sqlx::query_as::<_, Department>(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn find_by_names(&self, names: &[String]) -> RepositoryResult<Vec<Department>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {COLUMNS} FROM departments WHERE name = ANY($1)");
        let rows = sqlx::query_as::<_, Department>(&sql)
            .bind(names)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn list(&self, filter: &DepartmentFilter) -> RepositoryResult<Vec<Department>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM departments
            WHERE ($1::text IS NULL OR name ILIKE $1 OR location ILIKE $1 OR manager->>'name' ILIKE $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY name
            "#
        );
        let rows = sqlx::query_as::<_, Department>(&sql)
            .bind(filter.search.as_deref().map(like_pattern))
            .bind(filter.status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn set_employee_count(&self, id: Id, count: i32) -> RepositoryResult<()> {
        sqlx::query("UPDATE departments SET employee_count = $1 WHERE id = $2")
            .bind(count)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl DepartmentStore for MemoryTable<Department> {
    async fn find_by_name(&self, name: &str) -> RepositoryResult<Option<Department>> {
        Ok(self.find_first(|d| d.name.eq_ignore_ascii_case(name)))
    }

    async fn find_by_names(&self, names: &[String]) -> RepositoryResult<Vec<Department>> {
        Ok(self.select(|d| names.contains(&d.name)))
    }

    async fn list(&self, filter: &DepartmentFilter) -> RepositoryResult<Vec<Department>> {
        let mut rows = self.select(|d| filter.matches(d));
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn set_employee_count(&self, id: Id, count: i32) -> RepositoryResult<()> {
        self.modify(id, |d| d.employee_count = count)
            .ok_or_else(|| RepositoryError::not_found("Department", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use erp_models::DepartmentManager;

    fn new_department(name: &str, manager: &str, location: &str) -> NewDepartment {
        NewDepartment {
            name: name.into(),
            description: "d".into(),
            location: location.into(),
            manager: Some(DepartmentManager {
                name: manager.into(),
                ..Default::default()
            }),
            budget: 0.0,
            status: DepartmentStatus::Active,
            permissions: vec![],
        }
    }

    #[tokio::test]
    async fn test_search_covers_manager_and_location() {
        let table = MemoryTable::<Department>::new("Department");
        let store: &dyn DepartmentStore = &table;
        store.create(new_department("Sales", "Priya", "Mumbai")).await.unwrap();
        store.create(new_department("Engineering", "Tom", "Pune")).await.unwrap();

        let by_manager = DepartmentFilter {
            search: Some("priya".into()),
            ..Default::default()
        };
        assert_eq!(store.list(&by_manager).await.unwrap().len(), 1);

        let by_location = DepartmentFilter {
            search: Some("PUNE".into()),
            ..Default::default()
        };
        let found = store.list(&by_location).await.unwrap();
        assert_eq!(found[0].name, "Engineering");

        assert!(store.find_by_name("sales").await.unwrap().is_some());
    }
}
