//! # erp-files
//!
//! File storage for chat and project attachments.
//!
//! Bytes go to a [`Storage`] backend (local disk or memory) under generated
//! keys; metadata is recorded through [`erp_db::FileStore`].

pub mod service;
pub mod storage;

pub use service::{content_disposition, sanitize_filename, FileService, Upload};
pub use storage::{
    generate_key, sha256_hex, FileMetadata, LocalStorage, MemoryStorage, Storage, StorageError,
    StorageResult,
};
