//! Idempotent execution wrapper.
//!
//! Wraps a unit of work `f(input) -> result` with at-most-once semantics
//! under at-least-once delivery:
//!
//! 1. Derive the fingerprint from the event body.
//! 2. `try_begin` against the store. A cached completed result is returned
//!    without invoking `f`; a live in-progress record fails fast so the
//!    delivery mechanism resolves the duplicate later.
//! 3. Invoke `f`. On success the record transitions to completed with the
//!    result; on failure the record is aborted so a retry may re-execute.
//!
//! The store transition happens only after the side effect completes; a
//! crash in between leaves an in-progress record that blocks retries only
//! until its expiry.

use std::future::Future;
use std::time::{Duration, Instant};

use serde_json::Value;
use std::sync::Arc;

use idempo_core::error::ExecutionError;
use idempo_core::fingerprint::{FingerprintError, KeySpec};
use idempo_core::hooks::{HookChain, HookContext};
use idempo_core::IdempotencyConfig;
use idempo_store::{BeginOutcome, IdempotencyStore, StoreError};

/// Outcome of one idempotent run.
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    /// The unit of work ran during this invocation.
    Fresh(Value),
    /// A previous invocation's cached result was returned; the side effect
    /// did not run.
    Cached(Value),
}

impl Execution {
    pub fn into_value(self) -> Value {
        match self {
            Execution::Fresh(v) | Execution::Cached(v) => v,
        }
    }

    pub fn value(&self) -> &Value {
        match self {
            Execution::Fresh(v) | Execution::Cached(v) => v,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Execution::Cached(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Missing idempotency key field under strict enforcement. Fatal; the
    /// input will not succeed on redelivery.
    #[error(transparent)]
    Validation(#[from] FingerprintError),

    /// Another attempt holds the fingerprint. Control signal, not a domain
    /// error: decline execution and let redelivery resolve it later.
    #[error("Execution already in progress for fingerprint {fingerprint}")]
    InProgress { fingerprint: String },

    /// Too little time remains before the invocation deadline to start new
    /// work without risking a stuck in-progress record.
    #[error("Invocation deadline too close, declining to start")]
    DeadlineExceeded,

    #[error("Idempotency store error: {0}")]
    Store(#[from] StoreError),

    /// The side effect failed. The record has been aborted so a retry may
    /// re-execute.
    #[error("Side effect failed: {source}")]
    Execution {
        #[source]
        source: anyhow::Error,
        retryable: bool,
    },
}

impl RunnerError {
    /// Whether the surrounding delivery mechanism should redeliver.
    pub fn is_retryable(&self) -> bool {
        match self {
            RunnerError::Validation(_) => false,
            RunnerError::InProgress { .. } => true,
            RunnerError::DeadlineExceeded => true,
            RunnerError::Store(StoreError::Conflict(_)) => true,
            RunnerError::Store(_) => true,
            RunnerError::Execution { retryable, .. } => *retryable,
        }
    }
}

/// Runner timing knobs, derived from [`IdempotencyConfig`].
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// How long a completed result is honored as a cache.
    pub result_ttl: Duration,
    /// Lifetime of an in-progress record when no deadline is known.
    pub in_progress_ttl: Duration,
    /// Safety margin before the invocation deadline.
    pub deadline_margin: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::from(&IdempotencyConfig::default())
    }
}

impl From<&IdempotencyConfig> for RunnerConfig {
    fn from(config: &IdempotencyConfig) -> Self {
        Self {
            result_ttl: Duration::from_secs(config.result_ttl_secs),
            in_progress_ttl: Duration::from_secs(config.in_progress_ttl_secs),
            deadline_margin: Duration::from_millis(config.deadline_margin_ms),
        }
    }
}

/// The core state machine around one unit of work.
pub struct IdempotentRunner {
    store: Arc<dyn IdempotencyStore>,
    key_spec: KeySpec,
    config: RunnerConfig,
    hooks: HookChain,
}

impl IdempotentRunner {
    pub fn new(store: Arc<dyn IdempotencyStore>, key_spec: KeySpec, config: RunnerConfig) -> Self {
        Self {
            store,
            key_spec,
            config,
            hooks: HookChain::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: HookChain) -> Self {
        self.hooks = hooks;
        self
    }

    /// Run `f` at most once for the fingerprint derived from `event`.
    pub async fn run<F, Fut>(&self, event: &Value, f: F) -> Result<Execution, RunnerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, ExecutionError>>,
    {
        self.run_with_deadline(event, None, f).await
    }

    /// Like [`run`](Self::run), bounded by an invocation deadline.
    ///
    /// When less than the configured margin remains, the runner declines
    /// before any store access; otherwise the in-progress record's lifetime
    /// is capped at the remaining time so a crashed attempt cannot block
    /// retries past the invocation's practical lifetime.
    #[tracing::instrument(skip(self, event, f))]
    pub async fn run_with_deadline<F, Fut>(
        &self,
        event: &Value,
        deadline: Option<Instant>,
        f: F,
    ) -> Result<Execution, RunnerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, ExecutionError>>,
    {
        let in_progress_ttl = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining <= self.config.deadline_margin {
                    tracing::warn!(
                        remaining_ms = remaining.as_millis() as u64,
                        margin_ms = self.config.deadline_margin.as_millis() as u64,
                        "Deadline too close, declining to start"
                    );
                    return Err(RunnerError::DeadlineExceeded);
                }
                self.config.in_progress_ttl.min(remaining)
            }
            None => self.config.in_progress_ttl,
        };

        // Step 1: derive the fingerprint. Happens before any store access so
        // a validation failure never touches infrastructure.
        let fingerprint = self.key_spec.derive(event)?;
        let ctx = HookContext {
            fingerprint: fingerprint.to_string(),
            cached: false,
        };
        self.hooks.run_before(&ctx).await;

        // Step 2: claim the fingerprint.
        let lease = match self.store.try_begin(fingerprint.as_str(), in_progress_ttl).await {
            Ok(BeginOutcome::Started(lease)) => lease,
            Ok(BeginOutcome::Completed(result)) => {
                tracing::info!(fingerprint = %fingerprint, "Returning cached result");
                let ctx = HookContext {
                    cached: true,
                    ..ctx
                };
                self.hooks.run_after(&ctx, &result).await;
                return Ok(Execution::Cached(result));
            }
            Ok(BeginOutcome::InProgress(record)) => {
                tracing::info!(
                    fingerprint = %fingerprint,
                    expires_at = %record.expires_at,
                    "Concurrent execution in progress, declining"
                );
                return Err(RunnerError::InProgress {
                    fingerprint: fingerprint.into_inner(),
                });
            }
            // A conditional-write race is the concurrent-duplicate signal.
            Err(StoreError::Conflict(fingerprint)) => {
                return Err(RunnerError::InProgress { fingerprint });
            }
            Err(e) => return Err(e.into()),
        };

        // Step 3: the side effect.
        match f().await {
            Ok(result) => {
                match self
                    .store
                    .complete(&lease, result.clone(), self.config.result_ttl)
                    .await
                {
                    Ok(()) => {}
                    Err(StoreError::Conflict(_)) => {
                        // The lease expired mid-run and a successor claimed
                        // the fingerprint. The side effect did complete, so
                        // the result is still returned.
                        tracing::warn!(
                            fingerprint = %fingerprint,
                            "Lease lost before completion, result not cached"
                        );
                    }
                    Err(e) => return Err(e.into()),
                }
                self.hooks.run_after(&ctx, &result).await;
                tracing::info!(fingerprint = %fingerprint, "Execution completed");
                Ok(Execution::Fresh(result))
            }
            Err(err) => {
                let retryable = err.is_retryable();
                tracing::error!(
                    fingerprint = %fingerprint,
                    error = %err,
                    retryable,
                    "Side effect failed, aborting idempotency record"
                );
                if let Err(abort_err) = self.store.abort(&lease).await {
                    tracing::warn!(
                        fingerprint = %fingerprint,
                        error = %abort_err,
                        "Failed to abort idempotency record"
                    );
                }
                self.hooks.run_on_error(&ctx, &err.to_string()).await;
                Err(RunnerError::Execution {
                    source: err.into_inner(),
                    retryable,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idempo_store::MemoryStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn runner(store: Arc<MemoryStore>) -> IdempotentRunner {
        IdempotentRunner::new(store, KeySpec::new(["etag", "user_id"]), RunnerConfig::default())
    }

    fn event() -> Value {
        json!({"etag": "e1", "user_id": "user-7"})
    }

    #[tokio::test]
    async fn first_run_is_fresh_second_is_cached() {
        let store = Arc::new(MemoryStore::new());
        let runner = runner(store);
        let calls = AtomicUsize::new(0);

        let first = runner
            .run(&event(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"out": 1}))
            })
            .await
            .unwrap();
        assert_eq!(first, Execution::Fresh(json!({"out": 1})));

        let second = runner
            .run(&event(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"out": 2}))
            })
            .await
            .unwrap();
        assert_eq!(second, Execution::Cached(json!({"out": 1})));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_aborts_and_allows_retry() {
        let store = Arc::new(MemoryStore::new());
        let runner = runner(store.clone());

        let err = runner
            .run(&event(), || async {
                Err(ExecutionError::retryable(anyhow::anyhow!("flaky network")))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Execution { .. }));
        assert!(err.is_retryable());

        // Record was aborted; the retry executes the side effect again.
        let retry = runner
            .run(&event(), || async { Ok(json!("second attempt")) })
            .await
            .unwrap();
        assert_eq!(retry, Execution::Fresh(json!("second attempt")));
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retryable() {
        let store = Arc::new(MemoryStore::new());
        let runner = runner(store);

        let err = runner
            .run(&event(), || async {
                Err(ExecutionError::permanent(anyhow::anyhow!("bad payload")))
            })
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn in_progress_fails_fast_without_side_effect() {
        let store = Arc::new(MemoryStore::new());
        let runner_a = runner(store.clone());
        let runner_b = runner(store);

        // Hold the fingerprint by never completing inside this closure.
        let lease_holder = runner_a
            .run(&event(), || async {
                // While "executing", a second attempt arrives.
                let err = runner_b
                    .run(&event(), || async {
                        unreachable!("duplicate side effect must not run")
                    })
                    .await
                    .unwrap_err();
                assert!(matches!(err, RunnerError::InProgress { .. }));
                assert!(err.is_retryable());
                Ok(json!("done"))
            })
            .await
            .unwrap();
        assert_eq!(lease_holder, Execution::Fresh(json!("done")));
    }

    #[tokio::test]
    async fn missing_key_fails_before_store_access() {
        let store = Arc::new(MemoryStore::new());
        let runner = runner(store.clone());

        let err = runner
            .run(&json!({"user_id": "u"}), || async { Ok(Value::Null) })
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Validation(_)));
        assert!(!err.is_retryable());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn close_deadline_declines_before_store_access() {
        let store = Arc::new(MemoryStore::new());
        let runner = runner(store.clone());

        let err = runner
            .run_with_deadline(&event(), Some(Instant::now()), || async {
                Ok(Value::Null)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::DeadlineExceeded));
        assert!(err.is_retryable());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn generous_deadline_allows_execution() {
        let store = Arc::new(MemoryStore::new());
        let runner = runner(store);

        let outcome = runner
            .run_with_deadline(
                &event(),
                Some(Instant::now() + Duration::from_secs(30)),
                || async { Ok(json!("ok")) },
            )
            .await
            .unwrap();
        assert_eq!(outcome, Execution::Fresh(json!("ok")));
    }
}
