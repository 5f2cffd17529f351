//! Repository traits and base implementations
//!
//! Provides generic CRUD operations for database entities. Every entity store
//! extends [`Repository`] with `UpdateDto = T`: updates write the whole record
//! back after the service layer has mutated it.

use async_trait::async_trait;
use erp_core::{ErpError, Id};

/// Error type for repository operations
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl RepositoryError {
    pub fn not_found(entity: &str, id: Id) -> Self {
        RepositoryError::NotFound(format!("{} with id {} not found", entity, id))
    }

    /// Postgres `unique_violation` (SQLSTATE 23505)
    pub fn is_unique_violation(&self) -> bool {
        match self {
            RepositoryError::Conflict(_) => true,
            RepositoryError::Database(err) => err
                .as_database_error()
                .and_then(|e| e.code())
                .map_or(false, |code| code == "23505"),
            _ => false,
        }
    }
}

impl From<RepositoryError> for ErpError {
    fn from(err: RepositoryError) -> Self {
        if err.is_unique_violation() {
            let message = match err {
                RepositoryError::Conflict(message) => message,
                _ => "Record already exists".to_string(),
            };
            return ErpError::conflict(message);
        }

        match err {
            RepositoryError::NotFound(message) => ErpError::NotFound {
                entity: "Record",
                id: message,
            },
            RepositoryError::Database(sqlx::Error::RowNotFound) => ErpError::NotFound {
                entity: "Record",
                id: String::new(),
            },
            RepositoryError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                ErpError::Database(e.to_string())
            }
            RepositoryError::Validation(message) => ErpError::bad_request(message),
            RepositoryError::Conflict(message) => ErpError::conflict(message),
        }
    }
}

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Base repository trait for CRUD operations
#[async_trait]
pub trait Repository<T, CreateDto, UpdateDto>: Send + Sync {
    /// Find an entity by ID
    async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<T>>;

    /// Find all entities with pagination
    async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<T>>;

    /// Count all entities
    async fn count(&self) -> RepositoryResult<i64>;

    /// Create a new entity
    async fn create(&self, dto: CreateDto) -> RepositoryResult<T>;

    /// Update an existing entity
    async fn update(&self, id: Id, dto: UpdateDto) -> RepositoryResult<T>;

    /// Delete an entity by ID
    async fn delete(&self, id: Id) -> RepositoryResult<()>;

    /// Check if an entity exists
    async fn exists(&self, id: Id) -> RepositoryResult<bool>;
}

/// `LIMIT`/`OFFSET` applied to an in-memory result
pub(crate) fn paginate<T>(rows: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    rows.into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

/// `%term%` for ILIKE, with LIKE metacharacters escaped
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Case-insensitive substring match used by the in-memory stores
pub(crate) fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
