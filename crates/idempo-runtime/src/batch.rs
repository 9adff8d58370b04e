//! Ordered batch processing.
//!
//! Drives a handler over a delivered batch of records, in delivery order,
//! one at a time. Two failure policies are supported: fail the whole batch
//! on the first error so the delivery mechanism redelivers everything
//! (duplicates are absorbed by the idempotency layer), or process every
//! record and report the failures for partial redelivery.

use std::future::Future;

use serde_json::Value;

use idempo_core::models::BatchItemError;

use crate::runner::{Execution, RunnerError};

/// What to do when a record in the batch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failure and fail the batch. Redelivery re-presents
    /// every record; already-completed ones short-circuit on their cached
    /// results.
    #[default]
    AllOrNothing,
    /// Process every record and collect per-record failures, so the caller
    /// can request redelivery of only the failed subset.
    ReportPartial,
}

/// One record as delivered, before domain-level parsing.
#[derive(Debug, Clone)]
pub struct BatchRecord {
    /// Delivery-level identifier (stream sequence number, message id).
    pub id: String,
    pub payload: Value,
}

/// Outcome of a fully processed batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Records whose side effect ran during this batch.
    pub completed: usize,
    /// Records short-circuited on a cached result.
    pub cached: usize,
    /// Per-record failures. Empty under [`FailurePolicy::AllOrNothing`]
    /// (a failure there aborts the batch instead).
    pub failures: Vec<BatchItemError>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Batch aborted under [`FailurePolicy::AllOrNothing`].
#[derive(Debug)]
pub struct BatchError {
    /// The record that failed.
    pub item: BatchItemError,
    /// Records processed successfully before the failure.
    pub completed: usize,
    /// Records after the failure that were never attempted.
    pub skipped: usize,
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "batch aborted: {} ({} completed, {} skipped)",
            self.item, self.completed, self.skipped
        )
    }
}

impl BatchError {
    /// Whether redelivering the batch can succeed. A permanent item failure
    /// (validation, malformed payload) makes the whole batch permanent.
    pub fn is_retryable(&self) -> bool {
        self.item.retryable
    }
}

impl std::error::Error for BatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.item)
    }
}

/// Sequential, in-order driver over a batch of records.
#[derive(Debug, Default)]
pub struct BatchDriver {
    policy: FailurePolicy,
}

impl BatchDriver {
    pub fn new(policy: FailurePolicy) -> Self {
        Self { policy }
    }

    /// Run `handler` over `records` in delivery order.
    ///
    /// The handler is expected to wrap its side effect in an idempotent
    /// runner; this driver only sequences records and applies the failure
    /// policy.
    #[tracing::instrument(skip(self, records, handler), fields(batch_size = records.len()))]
    pub async fn run_batch<F, Fut>(
        &self,
        records: Vec<BatchRecord>,
        mut handler: F,
    ) -> Result<BatchReport, BatchError>
    where
        F: FnMut(BatchRecord) -> Fut,
        Fut: Future<Output = Result<Execution, RunnerError>>,
    {
        let total = records.len();
        let mut report = BatchReport::default();

        for (index, record) in records.into_iter().enumerate() {
            let record_id = record.id.clone();
            let payload = record.payload.clone();

            match handler(record).await {
                Ok(Execution::Fresh(_)) => report.completed += 1,
                Ok(Execution::Cached(_)) => {
                    tracing::debug!(record_id = %record_id, "Record already processed, cached result");
                    report.cached += 1;
                }
                Err(err) => {
                    tracing::error!(
                        record_id = %record_id,
                        index,
                        error = %err,
                        "Batch record failed"
                    );
                    let item = BatchItemError {
                        index,
                        record_id,
                        payload,
                        retryable: err.is_retryable(),
                        source: anyhow::Error::new(err),
                    };
                    match self.policy {
                        FailurePolicy::AllOrNothing => {
                            return Err(BatchError {
                                item,
                                completed: report.completed + report.cached,
                                skipped: total - index - 1,
                            });
                        }
                        FailurePolicy::ReportPartial => report.failures.push(item),
                    }
                }
            }
        }

        tracing::info!(
            completed = report.completed,
            cached = report.cached,
            failed = report.failures.len(),
            "Batch finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn records(n: usize) -> Vec<BatchRecord> {
        (0..n)
            .map(|i| BatchRecord {
                id: format!("evt-{}", i),
                payload: json!({"seq": i}),
            })
            .collect()
    }

    #[tokio::test]
    async fn clean_batch_reports_counts() {
        let driver = BatchDriver::default();
        let report = driver
            .run_batch(records(3), |record| async move {
                if record.payload["seq"] == json!(1) {
                    Ok(Execution::Cached(json!("seen before")))
                } else {
                    Ok(Execution::Fresh(json!("done")))
                }
            })
            .await
            .unwrap();

        assert_eq!(report.completed, 2);
        assert_eq!(report.cached, 1);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn all_or_nothing_stops_at_first_failure() {
        let driver = BatchDriver::new(FailurePolicy::AllOrNothing);
        let attempts = AtomicUsize::new(0);

        let err = driver
            .run_batch(records(4), |record| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if record.payload["seq"] == json!(1) {
                        Err(RunnerError::Execution {
                            source: anyhow::anyhow!("gateway refused"),
                            retryable: true,
                        })
                    } else {
                        Ok(Execution::Fresh(json!("done")))
                    }
                }
            })
            .await
            .unwrap_err();

        assert_eq!(err.item.index, 1);
        assert_eq!(err.item.record_id, "evt-1");
        assert_eq!(err.completed, 1);
        assert_eq!(err.skipped, 2);
        assert!(err.is_retryable());
        // Records after the failure were never attempted.
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_item_failure_makes_the_batch_permanent() {
        let driver = BatchDriver::new(FailurePolicy::AllOrNothing);

        let err = driver
            .run_batch(records(2), |_| async {
                Err(RunnerError::Execution {
                    source: anyhow::anyhow!("malformed payload"),
                    retryable: false,
                })
            })
            .await
            .unwrap_err();

        assert!(!err.is_retryable());
        assert!(!err.item.retryable);
    }

    #[tokio::test]
    async fn report_partial_processes_every_record() {
        let driver = BatchDriver::new(FailurePolicy::ReportPartial);

        let report = driver
            .run_batch(records(4), |record| async move {
                if record.payload["seq"] == json!(2) {
                    Err(RunnerError::Execution {
                        source: anyhow::anyhow!("bad payload"),
                        retryable: false,
                    })
                } else {
                    Ok(Execution::Fresh(json!("done")))
                }
            })
            .await
            .unwrap();

        assert_eq!(report.completed, 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].record_id, "evt-2");
    }

    #[tokio::test]
    async fn empty_batch_is_clean() {
        let driver = BatchDriver::default();
        let report = driver
            .run_batch(vec![], |_| async { Ok(Execution::Fresh(Value::Null)) })
            .await
            .unwrap();
        assert_eq!(report.completed, 0);
        assert!(report.is_clean());
    }
}
