//! Storage Abstraction
//!
//! Byte storage for uploaded files, addressed by opaque keys.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use erp_core::ErpError;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for ErpError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => ErpError::not_found("File", key),
            StorageError::InvalidPath(key) => {
                ErpError::bad_request(format!("Invalid file key: {}", key))
            }
            StorageError::IoError(e) => ErpError::internal(format!("Storage failure: {}", e)),
        }
    }
}

/// What storage learned about stored bytes
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    /// SHA-256, hex encoded
    pub digest: String,
}

impl FileMetadata {
    fn of(data: &[u8]) -> Self {
        Self {
            size: data.len() as u64,
            digest: sha256_hex(data),
        }
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Storage trait - unified interface for storage backends
#[async_trait]
pub trait Storage: Send + Sync {
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<FileMetadata>;

    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Deleting a missing key is not an error
    async fn delete(&self, key: &str) -> StorageResult<()>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get storage name for logging
    fn name(&self) -> &str;
}

/// Local filesystem storage
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Resolve a key to a full path
    fn resolve_path(&self, key: &str) -> StorageResult<PathBuf> {
        // Prevent directory traversal
        if key.is_empty() || key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidPath(key.to_string()));
        }

        Ok(self.root.join(key))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    #[instrument(skip(self, data), fields(storage = "local"))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<FileMetadata> {
        let path = self.resolve_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let metadata = FileMetadata::of(&data);

        let mut file = fs::File::create(&path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;

        debug!(path = ?path, size = metadata.size, "File stored");
        Ok(metadata)
    }

    #[instrument(skip(self), fields(storage = "local"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.resolve_path(key)?;
        match fs::read(&path).await {
            Ok(buffer) => Ok(Bytes::from(buffer)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self), fields(storage = "local"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.resolve_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = ?path, "File deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.resolve_path(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// In-memory storage for development and testing
#[derive(Default)]
pub struct MemoryStorage {
    files: RwLock<HashMap<String, Bytes>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<FileMetadata> {
        let metadata = FileMetadata::of(&data);
        self.files.write().await.insert(key.to_string(), data);
        Ok(metadata)
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.files
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.files.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.files.read().await.contains_key(key))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Generate a unique storage key that keeps the original extension
pub fn generate_key(filename: &str) -> String {
    let uuid = Uuid::new_v4();
    let date = chrono::Utc::now().format("%Y/%m");
    let ext = Path::new(filename)
        .extension()
        .and_then(|s| s.to_str())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("");

    if ext.is_empty() {
        format!("{}/{}", date, uuid)
    } else {
        format!("{}/{}.{}", date, uuid, ext.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage_put_get() {
        let storage = MemoryStorage::new();
        let data = Bytes::from("Hello, World!");

        let meta = storage.put("test.txt", data.clone()).await.unwrap();
        assert_eq!(meta.size, 13);
        assert_eq!(
            meta.digest,
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );

        assert_eq!(storage.get("test.txt").await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_memory_storage_delete() {
        let storage = MemoryStorage::new();
        storage.put("test.txt", Bytes::from("x")).await.unwrap();
        assert!(storage.exists("test.txt").await.unwrap());

        storage.delete("test.txt").await.unwrap();
        assert!(!storage.exists("test.txt").await.unwrap());
        assert!(matches!(storage.get("test.txt").await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_local_storage_round_trip() {
        let root = std::env::temp_dir().join(format!("erp-files-{}", Uuid::new_v4()));
        let storage = LocalStorage::new(&root);

        storage.put("2024/01/a.txt", Bytes::from("abc")).await.unwrap();
        assert_eq!(storage.get("2024/01/a.txt").await.unwrap(), Bytes::from("abc"));

        storage.delete("2024/01/a.txt").await.unwrap();
        storage.delete("2024/01/a.txt").await.unwrap();
        assert!(matches!(
            storage.get("2024/01/a.txt").await,
            Err(StorageError::NotFound(_))
        ));

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_local_storage_path_traversal() {
        let storage = LocalStorage::new(std::env::temp_dir());

        let result = storage.get("../../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidPath(_))));
    }

    #[test]
    fn test_generate_key() {
        let key = generate_key("Report.PDF");
        assert!(key.ends_with(".pdf"));
        assert_eq!(key.matches('/').count(), 2);

        assert!(!generate_key("noext").contains('.'));
        assert!(!generate_key("weird.ex/t").contains("ex/t"));
    }
}
