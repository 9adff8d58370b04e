//! Idempotency store abstraction trait
//!
//! This module defines the store trait that all backends must implement.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use idempo_core::models::{ExecutionLease, IdempotencyRecord};

/// Store operation errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional write lost a race. This is a control signal: the caller
    /// must not execute the side effect and must not retry the write.
    #[error("Conditional write conflict for fingerprint {0}")]
    Conflict(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    /// Transient backend failure; the surrounding delivery mechanism may
    /// retry the whole operation.
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Result of an attempt to begin execution for a fingerprint.
#[derive(Debug)]
pub enum BeginOutcome {
    /// No live record existed; this caller owns the execution.
    Started(ExecutionLease),
    /// Another attempt holds a live in-progress record.
    InProgress(IdempotencyRecord),
    /// A live completed record exists; its cached result is returned.
    Completed(serde_json::Value),
}

/// Durable key/value persistence with conditional-write semantics.
///
/// At most one record per fingerprint is live at any time. Records whose
/// expiry has passed are treated as absent by every operation.
#[async_trait]
pub trait IdempotencyStore: Send + Sync + std::fmt::Debug {
    /// Attempt to claim execution for `fingerprint`.
    ///
    /// Succeeds and returns a lease if no live record exists; returns the
    /// existing record when one is in progress; returns the cached result
    /// when a live completed record exists. The in-progress record expires
    /// after `in_progress_ttl` so a crashed attempt cannot block retries
    /// indefinitely.
    async fn try_begin(
        &self,
        fingerprint: &str,
        in_progress_ttl: Duration,
    ) -> StoreResult<BeginOutcome>;

    /// Atomically transition the leased record to completed, storing the
    /// result and extending the expiry to `result_ttl` from now.
    ///
    /// Fails with [`StoreError::Conflict`] when the lease no longer owns the
    /// record (e.g. it expired and a successor claimed the fingerprint).
    async fn complete(
        &self,
        lease: &ExecutionLease,
        result: serde_json::Value,
        result_ttl: Duration,
    ) -> StoreResult<()>;

    /// Remove the leased record so a future attempt may retry.
    ///
    /// Losing the token race is not an error: if the record already belongs
    /// to a successor, the abort is a no-op.
    async fn abort(&self, lease: &ExecutionLease) -> StoreResult<()>;

    /// Read-only lookup of the record for `fingerprint`, expired or not.
    async fn get(&self, fingerprint: &str) -> StoreResult<Option<IdempotencyRecord>>;
}
