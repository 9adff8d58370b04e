//! Object-storage abstraction trait
//!
//! This module defines the ObjectStorage trait that all backends must
//! implement.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Object-storage abstraction.
///
/// Keys are slash-separated paths (`uploads/images/jpg/abc.jpg`); they must
/// not contain `..` or a leading `/`. Key mapping between originals and
/// transformed outputs is centralized in the `keys` module.
#[async_trait]
pub trait ObjectStorage: Send + Sync + std::fmt::Debug {
    /// Download an object's bytes by key.
    async fn download(&self, key: &str) -> StorageResult<Bytes>;

    /// Upload bytes under a specific key, overwriting any existing object.
    async fn upload(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()>;

    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Delete an object by key.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Reject keys that escape the storage root.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.starts_with('/') || key.split('/').any(|seg| seg == "..") {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
