//! In-memory store backend.
//!
//! Used by tests and single-process deployments. The map is guarded by a
//! mutex, so the conditional-write semantics hold across concurrent tasks
//! within one process.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::traits::{BeginOutcome, IdempotencyStore, StoreError, StoreResult};
use idempo_core::models::{ExecutionLease, IdempotencyRecord, RecordStatus};

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<String, IdempotencyRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, bypassing the conditional-write path. Test
    /// and tooling helper.
    pub async fn put_record(&self, record: IdempotencyRecord) {
        let mut records = self.records.lock().await;
        records.insert(record.fingerprint.clone(), record);
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

fn to_chrono(ttl: Duration) -> ChronoDuration {
    ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::seconds(i64::MAX / 2))
}

#[async_trait]
impl IdempotencyStore for MemoryStore {
    async fn try_begin(
        &self,
        fingerprint: &str,
        in_progress_ttl: Duration,
    ) -> StoreResult<BeginOutcome> {
        let now = Utc::now();
        let mut records = self.records.lock().await;

        if let Some(existing) = records.get(fingerprint) {
            match existing.status_at(now) {
                RecordStatus::Completed => {
                    let result = existing.result.clone().ok_or_else(|| {
                        StoreError::Backend(format!(
                            "completed record without result for fingerprint {}",
                            fingerprint
                        ))
                    })?;
                    return Ok(BeginOutcome::Completed(result));
                }
                RecordStatus::InProgress => {
                    return Ok(BeginOutcome::InProgress(existing.clone()));
                }
                // Expired records are overwritten as if absent.
                RecordStatus::Expired => {}
            }
        }

        let lease = ExecutionLease::new(fingerprint.to_string());
        records.insert(
            fingerprint.to_string(),
            IdempotencyRecord {
                fingerprint: fingerprint.to_string(),
                status: RecordStatus::InProgress,
                result: None,
                expires_at: now + to_chrono(in_progress_ttl),
                lease_token: lease.token,
                created_at: now,
            },
        );

        Ok(BeginOutcome::Started(lease))
    }

    async fn complete(
        &self,
        lease: &ExecutionLease,
        result: serde_json::Value,
        result_ttl: Duration,
    ) -> StoreResult<()> {
        let now = Utc::now();
        let mut records = self.records.lock().await;

        match records.get_mut(&lease.fingerprint) {
            Some(record)
                if record.lease_token == lease.token
                    && record.status == RecordStatus::InProgress =>
            {
                record.status = RecordStatus::Completed;
                record.result = Some(result);
                record.expires_at = now + to_chrono(result_ttl);
                Ok(())
            }
            _ => Err(StoreError::Conflict(lease.fingerprint.clone())),
        }
    }

    async fn abort(&self, lease: &ExecutionLease) -> StoreResult<()> {
        let mut records = self.records.lock().await;

        match records.get(&lease.fingerprint) {
            Some(record) if record.lease_token == lease.token => {
                records.remove(&lease.fingerprint);
            }
            Some(_) => {
                tracing::debug!(
                    fingerprint = %lease.fingerprint,
                    "Abort skipped, record owned by a successor"
                );
            }
            None => {}
        }
        Ok(())
    }

    async fn get(&self, fingerprint: &str) -> StoreResult<Option<IdempotencyRecord>> {
        let records = self.records.lock().await;
        Ok(records.get(fingerprint).cloned())
    }
}
