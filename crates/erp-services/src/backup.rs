//! Backup export
//!
//! Produces a zip archive with `manifest.json` and one JSON document per
//! collection. Users are exported without password hashes.

use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use chrono::{DateTime, Utc};
use erp_auth::{builtin, CurrentUser};
use erp_core::{ErpError, ErpResult};
use erp_db::{ActivityFilter, Stores};
use serde::Serialize;
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const FORMAT_VERSION: &str = "1";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupManifest {
    pub created_at: DateTime<Utc>,
    pub version: String,
    pub app_version: String,
    pub counts: BTreeMap<String, usize>,
}

/// A finished archive
#[derive(Debug)]
pub struct BackupArchive {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub manifest: BackupManifest,
}

#[derive(Clone)]
pub struct BackupService {
    stores: Stores,
}

struct ArchiveBuilder {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
    counts: BTreeMap<String, usize>,
}

impl ArchiveBuilder {
    fn new() -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            options: SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated),
            counts: BTreeMap::new(),
        }
    }

    fn collection<T: Serialize>(&mut self, name: &str, rows: &[T]) -> ErpResult<()> {
        self.counts.insert(name.to_string(), rows.len());
        self.entry(&format!("{}.json", name), rows)
    }

    fn entry<T: Serialize + ?Sized>(&mut self, path: &str, value: &T) -> ErpResult<()> {
        let json = serde_json::to_vec_pretty(value)
            .map_err(|e| ErpError::internal(format!("Failed to encode {}: {}", path, e)))?;
        self.zip
            .start_file(path, self.options)
            .map_err(|e| ErpError::internal(format!("Failed to add {}: {}", path, e)))?;
        self.zip
            .write_all(&json)
            .map_err(|e| ErpError::internal(format!("Failed to write {}: {}", path, e)))?;
        Ok(())
    }

    fn finish(mut self, created_at: DateTime<Utc>) -> ErpResult<(Vec<u8>, BackupManifest)> {
        let manifest = BackupManifest {
            created_at,
            version: FORMAT_VERSION.to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            counts: std::mem::take(&mut self.counts),
        };
        self.entry("manifest.json", &manifest)?;

        let cursor = self
            .zip
            .finish()
            .map_err(|e| ErpError::internal(format!("Failed to finish archive: {}", e)))?;
        Ok((cursor.into_inner(), manifest))
    }
}

impl BackupService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    pub async fn export(&self, user: &CurrentUser) -> ErpResult<BackupArchive> {
        user.require(builtin::ADMIN_BACKUP)?;
        let s = &self.stores;
        let all = i64::MAX;

        let mut archive = ArchiveBuilder::new();
        archive.collection("roles", &s.roles.find_all(all, 0).await?)?;
        archive.collection("users", &s.users.find_all(all, 0).await?)?;
        archive.collection("employees", &s.employees.find_all(all, 0).await?)?;
        archive.collection("departments", &s.departments.find_all(all, 0).await?)?;
        archive.collection("projects", &s.projects.find_all(all, 0).await?)?;
        archive.collection("tasks", &s.tasks.find_all(all, 0).await?)?;
        archive.collection("budgets", &s.budgets.find_all(all, 0).await?)?;
        archive.collection("resource_allocations", &s.allocations.find_all(all, 0).await?)?;
        archive.collection("contacts", &s.contacts.find_all(all, 0).await?)?;
        archive.collection("chats", &s.chats.find_all(all, 0).await?)?;
        archive.collection("notifications", &s.notifications.find_all(all, 0).await?)?;
        archive.collection(
            "activity_logs",
            &s.activity.list(&ActivityFilter::default(), all, 0).await?,
        )?;

        let created_at = Utc::now();
        let (bytes, manifest) = archive.finish(created_at)?;
        info!(
            user_id = user.id,
            size = bytes.len(),
            "Backup exported"
        );

        Ok(BackupArchive {
            filename: format!("erp-backup-{}.zip", created_at.format("%Y%m%d-%H%M%S")),
            bytes,
            manifest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{admin, fixture, member};
    use std::io::Read;
    use zip::ZipArchive;

    #[tokio::test]
    async fn test_export_contains_manifest_and_collections() {
        let fx = fixture().await;
        fx.register("a@x.io").await;

        let archive = fx.services.backup.export(&admin()).await.unwrap();
        assert!(archive.filename.ends_with(".zip"));
        assert_eq!(archive.manifest.counts["users"], 1);
        assert_eq!(archive.manifest.counts["roles"], 4);

        let mut zip = ZipArchive::new(Cursor::new(archive.bytes)).unwrap();
        assert_eq!(zip.len(), 13);

        let mut users = String::new();
        zip.by_name("users.json").unwrap().read_to_string(&mut users).unwrap();
        assert!(users.contains("a@x.io"));
        assert!(!users.contains("passwordHash"));
        assert!(!users.contains("$argon2"));

        let mut manifest = String::new();
        zip.by_name("manifest.json").unwrap().read_to_string(&mut manifest).unwrap();
        let manifest: serde_json::Value = serde_json::from_str(&manifest).unwrap();
        assert_eq!(manifest["counts"]["activity_logs"], 0);
    }

    #[tokio::test]
    async fn test_export_requires_permission() {
        let fx = fixture().await;
        let err = fx.services.backup.export(&member(2, &[])).await.unwrap_err();
        assert_eq!(err.status_code(), 403);
    }
}
