//! User repository
//!
//! Login identities. Emails are unique (case-insensitive).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use erp_core::Id;
use erp_models::{NewUser, User, UserStatus};
use sqlx::PgPool;

use crate::memory::MemoryTable;
use crate::repository::{
    contains_ci, like_pattern, paginate, Repository, RepositoryError, RepositoryResult,
};

const COLUMNS: &str =
    "id, name, email, password_hash, role_id, status, last_login_at, created_at, updated_at";

/// Admin user listing filter
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Name or email substring
    pub search: Option<String>,
    pub status: Option<UserStatus>,
    pub role_id: Option<Id>,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        if let Some(ref term) = self.search {
            if !contains_ci(&user.name, term) && !contains_ci(&user.email, term) {
                return false;
            }
        }
        if self.status.map_or(false, |s| s != user.status) {
            return false;
        }
        if self.role_id.is_some() && self.role_id != user.role_id {
            return false;
        }
        true
    }
}

#[async_trait]
pub trait UserStore: Repository<User, NewUser, User> {
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>>;

    async fn list(&self, filter: &UserFilter, limit: i64, offset: i64) -> RepositoryResult<Vec<User>>;

    async fn count_matching(&self, filter: &UserFilter) -> RepositoryResult<i64>;

    async fn touch_login(&self, id: Id, at: DateTime<Utc>) -> RepositoryResult<()>;
}

/// User repository implementation
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const FILTER: &str = r#"
    ($1::text IS NULL OR name ILIKE $1 OR email ILIKE $1)
    AND ($2::text IS NULL OR status = $2)
    AND ($3::bigint IS NULL OR role_id = $3)
"#;

#[async_trait]
impl Repository<User, NewUser, User> for PgUserRepository {
    async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<User>> {
        let sql = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<User>> {
        let sql = format!("SELECT {COLUMNS} FROM users ORDER BY id LIMIT $1 OFFSET $2");
        let rows = sqlx::query_as::<_, User>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn count(&self) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn create(&self, dto: NewUser) -> RepositoryResult<User> {
        let sql = format!(
            r#"
            INSERT INTO users (name, email, password_hash, role_id, status, created_at, updated_at)
            VALUES ($1, LOWER($2), $3, $4, $5, NOW(), NOW())
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, User>(&sql)
            .bind(&dto.name)
            .bind(&dto.email)
            .bind(&dto.password_hash)
            .bind(dto.role_id)
            .bind(dto.status.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(row)
    }

    async fn update(&self, id: Id, user: User) -> RepositoryResult<User> {
        let sql = format!(
            r#"
            UPDATE users SET
                name = $1,
                email = LOWER($2),
                password_hash = $3,
                role_id = $4,
                status = $5,
                last_login_at = $6,
                updated_at = NOW()
            WHERE id = $7
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, User>(&sql)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role_id)
            .bind(user.status.as_str())
            .bind(user.last_login_at)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::not_found("User", id))?;

        Ok(row)
    }

    async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("User", id));
        }

        Ok(())
    }

    async fn exists(&self, id: Id) -> RepositoryResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }
}

#[async_trait]
impl UserStore for PgUserRepository {
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        let sql = format!("SELECT {COLUMNS} FROM users WHERE email = LOWER($1)");
        let row = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn list(&self, filter: &UserFilter, limit: i64, offset: i64) -> RepositoryResult<Vec<User>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM users WHERE {FILTER} ORDER BY id LIMIT $4 OFFSET $5"
        );
        let rows = sqlx::query_as::<_, User>(&sql)
            .bind(filter.search.as_deref().map(like_pattern))
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.role_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn count_matching(&self, filter: &UserFilter) -> RepositoryResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM users WHERE {FILTER}");
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(filter.search.as_deref().map(like_pattern))
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.role_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn touch_login(&self, id: Id, at: DateTime<Utc>) -> RepositoryResult<()> {
        sqlx::query("UPDATE users SET last_login_at = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryTable<User> {
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        Ok(self.find_first(|u| u.email.eq_ignore_ascii_case(email)))
    }

    async fn list(&self, filter: &UserFilter, limit: i64, offset: i64) -> RepositoryResult<Vec<User>> {
        Ok(paginate(self.select(|u| filter.matches(u)), limit, offset))
    }

    async fn count_matching(&self, filter: &UserFilter) -> RepositoryResult<i64> {
        Ok(self.count_where(|u| filter.matches(u)) as i64)
    }

    async fn touch_login(&self, id: Id, at: DateTime<Utc>) -> RepositoryResult<()> {
        self.modify(id, |u| u.last_login_at = Some(at))
            .ok_or_else(|| RepositoryError::not_found("User", id))
    }
}
