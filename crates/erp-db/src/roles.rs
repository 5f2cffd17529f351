//! Role repository
//!
//! Roles carry a level (0-100) and a list of permission strings.

use async_trait::async_trait;
use erp_core::Id;
use erp_models::{NewRole, Role};
use sqlx::PgPool;

use crate::memory::MemoryTable;
use crate::repository::{Repository, RepositoryError, RepositoryResult};

const COLUMNS: &str = "id, name, level, permissions, description, created_at, updated_at";

#[async_trait]
pub trait RoleStore: Repository<Role, NewRole, Role> {
    /// Case-insensitive lookup
    async fn find_by_name(&self, name: &str) -> RepositoryResult<Option<Role>>;

    /// Every role, highest level first
    async fn list(&self) -> RepositoryResult<Vec<Role>>;
}

/// Role repository implementation
pub struct PgRoleRepository {
    pool: PgPool,
}

impl PgRoleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<Role, NewRole, Role> for PgRoleRepository {
    async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<Role>> {
        let sql = format!("SELECT {COLUMNS} FROM roles WHERE id = $1");
        let row = sqlx::query_as::<_, Role>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Role>> {
        let sql = format!("SELECT {COLUMNS} FROM roles ORDER BY id LIMIT $1 OFFSET $2");
        let rows = sqlx::query_as::<_, Role>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn count(&self) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM roles")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn create(&self, dto: NewRole) -> RepositoryResult<Role> {
        let sql = format!(
            r#"
            INSERT INTO roles (name, level, permissions, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Role>(&sql)
            .bind(&dto.name)
            .bind(dto.level)
            .bind(&dto.permissions)
            .bind(&dto.description)
            .fetch_one(&self.pool)
            .await?;

        Ok(row)
    }

    async fn update(&self, id: Id, role: Role) -> RepositoryResult<Role> {
        let sql = format!(
            r#"
            UPDATE roles SET
                name = $1,
                level = $2,
                permissions = $3,
                description = $4,
                updated_at = NOW()
            WHERE id = $5
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Role>(&sql)
            .bind(&role.name)
            .bind(role.level)
            .bind(&role.permissions)
            .bind(&role.description)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Role", id))?;

        Ok(row)
    }

    async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("Role", id));
        }

        Ok(())
    }

    async fn exists(&self, id: Id) -> RepositoryResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM roles WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }
}

#[async_trait]
impl RoleStore for PgRoleRepository {
    async fn find_by_name(&self, name: &str) -> RepositoryResult<Option<Role>> {
        let sql = format!("SELECT {COLUMNS} FROM roles WHERE LOWER(name) = LOWER($1)");
        let row = sqlx::query_as::<_, Role>(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn list(&self) -> RepositoryResult<Vec<Role>> {
        let sql = format!("SELECT {COLUMNS} FROM roles ORDER BY level DESC, name ASC");
        let rows = sqlx::query_as::<_, Role>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }
}

#[async_trait]
impl RoleStore for MemoryTable<Role> {
    async fn find_by_name(&self, name: &str) -> RepositoryResult<Option<Role>> {
        Ok(self.find_first(|r| r.name.eq_ignore_ascii_case(name)))
    }

    async fn list(&self) -> RepositoryResult<Vec<Role>> {
        let mut roles = self.select(|_| true);
        roles.sort_by(|a, b| b.level.cmp(&a.level).then_with(|| a.name.cmp(&b.name)));
        Ok(roles)
    }
}

/// Insert the default roles that are missing; returns how many were created
pub async fn seed_default_roles(store: &dyn RoleStore) -> RepositoryResult<usize> {
    let mut created = 0;
    for role in NewRole::defaults() {
        if store.find_by_name(&role.name).await?.is_none() {
            tracing::info!(role = %role.name, level = role.level, "Seeding role");
            store.create(role).await?;
            created += 1;
        }
    }
    Ok(created)
}
