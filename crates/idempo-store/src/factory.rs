#[cfg(feature = "store-dynamodb")]
use crate::DynamoDbStore;
use crate::{IdempotencyStore, MemoryStore, StoreError, StoreResult};
use idempo_core::IdempotencyConfig;
use std::sync::Arc;

/// Create a store backend based on configuration.
///
/// `IDEMPO_STORE_BACKEND` selects `"memory"` (default) or `"dynamodb"`;
/// the DynamoDB backend additionally requires `IDEMPO_STORE_TABLE`.
pub async fn create_store(config: &IdempotencyConfig) -> StoreResult<Arc<dyn IdempotencyStore>> {
    let backend = config.store_backend.as_deref().unwrap_or("memory");

    match backend {
        "memory" => Ok(Arc::new(MemoryStore::new())),

        #[cfg(feature = "store-dynamodb")]
        "dynamodb" => {
            let table = config
                .store_table
                .clone()
                .ok_or_else(|| StoreError::Config("IDEMPO_STORE_TABLE not configured".to_string()))?;
            let store = DynamoDbStore::new(table).await?;
            Ok(Arc::new(store))
        }

        #[cfg(not(feature = "store-dynamodb"))]
        "dynamodb" => Err(StoreError::Config(
            "DynamoDB store backend not available (store-dynamodb feature not enabled)".to_string(),
        )),

        other => Err(StoreError::Config(format!(
            "Unknown store backend: {}",
            other
        ))),
    }
}
