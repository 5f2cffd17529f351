//! Stored file metadata repository

use async_trait::async_trait;
use erp_core::Id;
use erp_models::{FileContext, NewStoredFile, StoredFile};
use sqlx::PgPool;

use crate::memory::MemoryTable;
use crate::repository::{Repository, RepositoryError, RepositoryResult};

const COLUMNS: &str = "id, owner_id, context, context_id, original_name, storage_key, \
                       content_type, size, digest, created_at";

#[async_trait]
pub trait FileStore: Repository<StoredFile, NewStoredFile, StoredFile> {
    /// Files attached to one chat or project, oldest first
    async fn list_for_context(
        &self,
        context: FileContext,
        context_id: Id,
    ) -> RepositoryResult<Vec<StoredFile>>;
}

/// Stored file repository implementation
pub struct PgFileRepository {
    pool: PgPool,
}

impl PgFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<StoredFile, NewStoredFile, StoredFile> for PgFileRepository {
    async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<StoredFile>> {
        let sql = format!("SELECT {COLUMNS} FROM stored_files WHERE id = $1");
        let row = sqlx::query_as::<_, StoredFile>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<StoredFile>> {
        let sql = format!("SELECT {COLUMNS} FROM stored_files ORDER BY id LIMIT $1 OFFSET $2");
        let rows = sqlx::query_as::<_, StoredFile>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn count(&self) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM stored_files")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn create(&self, dto: NewStoredFile) -> RepositoryResult<StoredFile> {
        let sql = format!(
            r#"
            INSERT INTO stored_files (
                owner_id, context, context_id, original_name, storage_key, content_type, size,
                digest, created_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, NOW()
            )
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, StoredFile>(&sql)
            .bind(dto.owner_id)
            .bind(dto.context.as_str())
            .bind(dto.context_id)
            .bind(&dto.original_name)
            .bind(&dto.storage_key)
            .bind(&dto.content_type)
            .bind(dto.size)
            .bind(&dto.digest)
            .fetch_one(&self.pool)
            .await?;

        Ok(row)
    }

    async fn update(&self, id: Id, file: StoredFile) -> RepositoryResult<StoredFile> {
        let sql = format!(
            "UPDATE stored_files SET original_name = $1 WHERE id = $2 RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, StoredFile>(&sql)
            .bind(&file.original_name)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::not_found("File", id))?;

        Ok(row)
    }

    async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM stored_files WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("File", id));
        }

        Ok(())
    }

    async fn exists(&self, id: Id) -> RepositoryResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM stored_files WHERE id = $1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}

#[async_trait]
impl FileStore for PgFileRepository {
    async fn list_for_context(
        &self,
        context: FileContext,
        context_id: Id,
    ) -> RepositoryResult<Vec<StoredFile>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM stored_files WHERE context = $1 AND context_id = $2 ORDER BY id"
        );
        let rows = sqlx::query_as::<_, StoredFile>(&sql)
            .bind(context.as_str())
            .bind(context_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }
}

#[async_trait]
impl FileStore for MemoryTable<StoredFile> {
    async fn list_for_context(
        &self,
        context: FileContext,
        context_id: Id,
    ) -> RepositoryResult<Vec<StoredFile>> {
        Ok(self.select(|f| f.context == context && f.context_id == context_id))
    }
}
