//! Local filesystem storage backend.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::traits::{validate_key, ObjectStorage, StorageError, StorageResult};

/// Stores objects as files under a base directory, mirroring the key layout.
#[derive(Clone, Debug)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;
        Ok(Self { base_path })
    }

    fn object_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.base_path.join(Path::new(key)))
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn download(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.object_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => {
                tracing::error!(error = %e, key = %key, "Local download failed");
                Err(StorageError::DownloadFailed(e.to_string()))
            }
        }
    }

    async fn upload(&self, key: &str, data: Bytes, _content_type: &str) -> StorageResult<()> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &data).await.map_err(|e| {
            tracing::error!(error = %e, key = %key, "Local upload failed");
            StorageError::UploadFailed(e.to_string())
        })?;
        tracing::debug!(key = %key, size_bytes = data.len(), "Local upload successful");
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.object_path(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn storage() -> (TempDir, LocalStorage) {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn upload_download_round_trip() {
        let (_dir, storage) = storage().await;
        storage
            .upload(
                "uploads/images/jpg/abc.jpg",
                Bytes::from_static(b"jpeg-bytes"),
                "image/jpeg",
            )
            .await
            .unwrap();

        let data = storage.download("uploads/images/jpg/abc.jpg").await.unwrap();
        assert_eq!(data, Bytes::from_static(b"jpeg-bytes"));
    }

    #[tokio::test]
    async fn download_missing_is_not_found() {
        let (_dir, storage) = storage().await;
        let err = storage.download("uploads/nope.jpg").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_dir, storage) = storage().await;
        storage
            .upload("uploads/a.jpg", Bytes::from_static(b"x"), "image/jpeg")
            .await
            .unwrap();
        storage.delete("uploads/a.jpg").await.unwrap();
        storage.delete("uploads/a.jpg").await.unwrap();
        assert!(!storage.exists("uploads/a.jpg").await.unwrap());
    }
}
