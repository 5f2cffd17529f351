//! Stored file metadata
//!
//! Table: stored_files. Bytes live in the storage backend under `storage_key`.

use chrono::{DateTime, Utc};
use erp_core::{Id, Identifiable, Timestamped};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::NewRecord;

text_enum! {
    /// What a file is attached to
    pub enum FileContext ("file context") {
        Chat => "chat",
        Project => "project",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub id: Id,
    pub owner_id: Id,
    #[sqlx(try_from = "String")]
    pub context: FileContext,
    pub context_id: Id,
    pub original_name: String,
    #[serde(skip_serializing)]
    pub storage_key: String,
    pub content_type: String,
    pub size: i64,
    pub digest: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewStoredFile {
    pub owner_id: Id,
    pub context: FileContext,
    pub context_id: Id,
    pub original_name: String,
    pub storage_key: String,
    pub content_type: String,
    pub size: i64,
    pub digest: String,
}

impl NewRecord<StoredFile> for NewStoredFile {
    fn into_record(self, id: Id, now: DateTime<Utc>) -> StoredFile {
        StoredFile {
            id,
            owner_id: self.owner_id,
            context: self.context,
            context_id: self.context_id,
            original_name: self.original_name,
            storage_key: self.storage_key,
            content_type: self.content_type,
            size: self.size,
            digest: self.digest,
            created_at: now,
        }
    }
}

impl Identifiable for StoredFile {
    fn id(&self) -> Id {
        self.id
    }
}

impl Timestamped for StoredFile {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
