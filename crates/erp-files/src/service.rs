//! File Service
//!
//! Business logic for uploaded files: size limits, storage keys, digests
//! and ownership checks on delete.

use std::sync::Arc;

use bytes::Bytes;
use erp_core::{ErpError, ErpResult, Id};
use erp_db::FileStore;
use erp_models::{FileContext, NewStoredFile, StoredFile};
use tracing::{info, warn};

use crate::storage::{generate_key, Storage};

/// A file received from a client
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    /// Content type claimed by the client; guessed from the name when absent
    pub content_type: Option<String>,
    pub data: Bytes,
}

#[derive(Clone)]
pub struct FileService {
    store: Arc<dyn FileStore>,
    storage: Arc<dyn Storage>,
    max_upload_bytes: usize,
}

impl FileService {
    pub fn new(store: Arc<dyn FileStore>, storage: Arc<dyn Storage>, max_upload_bytes: usize) -> Self {
        Self {
            store,
            storage,
            max_upload_bytes,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Store the bytes and record their metadata
    pub async fn upload(
        &self,
        owner_id: Id,
        context: FileContext,
        context_id: Id,
        upload: Upload,
    ) -> ErpResult<StoredFile> {
        if upload.data.len() > self.max_upload_bytes {
            return Err(ErpError::bad_request("File too large"));
        }
        if upload.data.is_empty() {
            return Err(ErpError::bad_request("File is empty"));
        }

        let original_name = sanitize_filename(&upload.filename);
        if original_name.is_empty() {
            return Err(ErpError::bad_request("File name is required"));
        }

        let content_type = upload
            .content_type
            .filter(|ct| {
                ct.trim()
                    .parse::<mime::Mime>()
                    .map_or(false, |m| m != mime::APPLICATION_OCTET_STREAM)
            })
            .unwrap_or_else(|| {
                mime_guess::from_path(&original_name)
                    .first_or_octet_stream()
                    .to_string()
            });

        let storage_key = generate_key(&original_name);
        let metadata = self.storage.put(&storage_key, upload.data).await?;

        let record = self
            .store
            .create(NewStoredFile {
                owner_id,
                context,
                context_id,
                original_name,
                storage_key: storage_key.clone(),
                content_type,
                size: metadata.size as i64,
                digest: metadata.digest,
            })
            .await;

        let file = match record {
            Ok(file) => file,
            Err(e) => {
                // Do not leave orphaned bytes behind
                if let Err(cleanup) = self.storage.delete(&storage_key).await {
                    warn!(key = %storage_key, "Failed to remove orphaned upload: {}", cleanup);
                }
                return Err(e.into());
            }
        };

        info!(
            file_id = file.id,
            owner_id,
            context = %file.context,
            context_id,
            size = file.size,
            storage = self.storage.name(),
            "File uploaded"
        );

        Ok(file)
    }

    pub async fn get(&self, id: Id) -> ErpResult<StoredFile> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| ErpError::not_found("File", id))
    }

    /// Metadata and bytes of a stored file
    pub async fn download(&self, id: Id) -> ErpResult<(StoredFile, Bytes)> {
        let file = self.get(id).await?;
        let data = self.storage.get(&file.storage_key).await?;
        Ok((file, data))
    }

    pub async fn list(&self, context: FileContext, context_id: Id) -> ErpResult<Vec<StoredFile>> {
        Ok(self.store.list_for_context(context, context_id).await?)
    }

    /// Delete a file; only its owner or a full-access user may
    pub async fn delete(&self, id: Id, requester_id: Id, full_access: bool) -> ErpResult<()> {
        let file = self.get(id).await?;
        if file.owner_id != requester_id && !full_access {
            return Err(ErpError::forbidden("Only the file owner can delete this file"));
        }

        self.storage.delete(&file.storage_key).await?;
        self.store.delete(id).await?;

        info!(file_id = id, requester_id, "File deleted");
        Ok(())
    }
}

/// Strip any path components a client sent along with the name
pub fn sanitize_filename(name: &str) -> String {
    name.rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// `Content-Disposition` value for a download
pub fn content_disposition(file: &StoredFile) -> String {
    let escaped: String = file
        .original_name
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if c == '"' { '\'' } else { c })
        .collect();
    format!("attachment; filename=\"{}\"", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use erp_db::Stores;

    fn service(max: usize) -> FileService {
        FileService::new(Stores::memory().files, Arc::new(MemoryStorage::new()), max)
    }

    fn upload(name: &str, data: &'static [u8]) -> Upload {
        Upload {
            filename: name.to_string(),
            content_type: None,
            data: Bytes::from_static(data),
        }
    }

    #[tokio::test]
    async fn test_upload_and_download() {
        let service = service(1024);

        let file = service
            .upload(1, FileContext::Project, 5, upload("notes/plan.txt", b"hello"))
            .await
            .unwrap();

        assert_eq!(file.original_name, "plan.txt");
        assert_eq!(file.content_type, "text/plain");
        assert_eq!(file.size, 5);
        assert_eq!(file.digest.len(), 64);

        let (meta, data) = service.download(file.id).await.unwrap();
        assert_eq!(meta.id, file.id);
        assert_eq!(data, Bytes::from_static(b"hello"));

        let listed = service.list(FileContext::Project, 5).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(service.list(FileContext::Chat, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_too_large() {
        let service = service(4);

        let err = service
            .upload(1, FileContext::Chat, 1, upload("big.bin", b"12345"))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_string(), "File too large");
    }

    #[tokio::test]
    async fn test_delete_requires_owner_or_full_access() {
        let service = service(1024);
        let file = service
            .upload(1, FileContext::Chat, 3, upload("a.png", b"png"))
            .await
            .unwrap();

        let err = service.delete(file.id, 2, false).await.unwrap_err();
        assert_eq!(err.status_code(), 403);

        service.delete(file.id, 2, true).await.unwrap();
        assert_eq!(service.get(file.id).await.unwrap_err().status_code(), 404);
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("C:\\temp\\report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename(" plain.txt "), "plain.txt");
    }
}
