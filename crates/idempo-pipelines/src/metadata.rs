//! File metadata repository.
//!
//! The thumbnail pipeline looks up the owning metadata row for an uploaded
//! object and records its status transitions here. The repository is the
//! source of truth for file status; the notifier only broadcasts it.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use idempo_core::models::{FileMetadata, FileStatus};

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("File metadata not found: {0}")]
    NotFound(String),

    #[error("Metadata backend error: {0}")]
    Backend(String),
}

pub type MetadataResult<T> = Result<T, MetadataError>;

/// Persistence seam for file metadata.
#[async_trait]
pub trait FileMetadataRepository: Send + Sync {
    async fn insert(&self, metadata: FileMetadata) -> MetadataResult<()>;

    /// Look up the metadata row owning an object-storage key.
    async fn find_by_key(&self, key: &str) -> MetadataResult<Option<FileMetadata>>;

    /// Transition a file's status, bumping `updated_at`.
    async fn set_status(&self, id: Uuid, status: FileStatus) -> MetadataResult<FileMetadata>;
}

/// In-memory repository for tests and single-process deployments.
#[derive(Clone, Default)]
pub struct MemoryFileMetadataRepository {
    rows: Arc<Mutex<HashMap<Uuid, FileMetadata>>>,
}

impl MemoryFileMetadataRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FileMetadataRepository for MemoryFileMetadataRepository {
    async fn insert(&self, metadata: FileMetadata) -> MetadataResult<()> {
        let mut rows = self.rows.lock().await;
        rows.insert(metadata.id, metadata);
        Ok(())
    }

    async fn find_by_key(&self, key: &str) -> MetadataResult<Option<FileMetadata>> {
        let rows = self.rows.lock().await;
        Ok(rows.values().find(|row| row.key == key).cloned())
    }

    async fn set_status(&self, id: Uuid, status: FileStatus) -> MetadataResult<FileMetadata> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .get_mut(&id)
            .ok_or_else(|| MetadataError::NotFound(id.to_string()))?;
        row.status = status;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn find_by_key_returns_the_owning_row() {
        let repo = MemoryFileMetadataRepository::new();
        let meta = FileMetadata::new("user-1", "uploads/images/jpg/abc.jpg", "image/jpeg");
        let id = meta.id;
        repo.insert(meta).await.unwrap();

        let found = repo
            .find_by_key("uploads/images/jpg/abc.jpg")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, id);
        assert!(repo.find_by_key("uploads/other.jpg").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_status_transitions_and_bumps_updated_at() {
        let repo = MemoryFileMetadataRepository::new();
        let meta = FileMetadata::new("user-1", "uploads/a.jpg", "image/jpeg");
        let id = meta.id;
        let created = meta.updated_at;
        repo.insert(meta).await.unwrap();

        let updated = repo.set_status(id, FileStatus::Working).await.unwrap();
        assert_eq!(updated.status, FileStatus::Working);
        assert!(updated.updated_at >= created);
    }

    #[tokio::test]
    async fn set_status_on_unknown_id_is_not_found() {
        let repo = MemoryFileMetadataRepository::new();
        let err = repo
            .set_status(Uuid::new_v4(), FileStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::NotFound(_)));
    }
}
