#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{MemoryStorage, ObjectStorage, StorageError, StorageResult};
use idempo_core::StorageConfig;
use std::sync::Arc;

/// Create a storage backend based on configuration.
pub async fn create_storage(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStorage>> {
    let backend = config.storage_backend.as_deref().unwrap_or("memory");

    match backend {
        "memory" => Ok(Arc::new(MemoryStorage::new())),

        #[cfg(feature = "storage-s3")]
        "s3" => {
            let bucket = config
                .s3_bucket
                .clone()
                .ok_or_else(|| StorageError::ConfigError("IDEMPO_S3_BUCKET not configured".to_string()))?;
            let region = config
                .s3_region
                .clone()
                .ok_or_else(|| StorageError::ConfigError("IDEMPO_S3_REGION not configured".to_string()))?;
            let endpoint = config.s3_endpoint.clone();

            let storage = S3Storage::new(bucket, region, endpoint).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        "s3" => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        "local" => {
            let base_path = config.local_storage_path.clone().ok_or_else(|| {
                StorageError::ConfigError("IDEMPO_LOCAL_STORAGE_PATH not configured".to_string())
            })?;
            let storage = LocalStorage::new(base_path).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        "local" => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),

        other => Err(StorageError::ConfigError(format!(
            "Unknown storage backend: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_to_memory_backend() {
        let config = StorageConfig::default();
        assert!(create_storage(&config).await.is_ok());
    }

    #[cfg(feature = "storage-local")]
    #[tokio::test]
    async fn local_requires_a_path() {
        let config = StorageConfig {
            storage_backend: Some("local".to_string()),
            ..Default::default()
        };
        let err = create_storage(&config).await.unwrap_err();
        assert!(matches!(err, StorageError::ConfigError(_)));
    }

    #[tokio::test]
    async fn unknown_backend_is_a_config_error() {
        let config = StorageConfig {
            storage_backend: Some("gcs".to_string()),
            ..Default::default()
        };
        let err = create_storage(&config).await.unwrap_err();
        assert!(matches!(err, StorageError::ConfigError(_)));
    }
}
