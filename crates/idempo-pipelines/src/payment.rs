//! Payment pipeline.
//!
//! Consumes change-data-capture batches of payment requests. Each INSERT
//! record is executed through the idempotent runner keyed by ride id, so a
//! redelivered batch never charges a ride twice; the cached
//! `PaymentCompletedEvent` is returned instead.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use idempo_core::error::ExecutionError;
use idempo_core::fingerprint::KeySpec;
use idempo_core::models::{PaymentCompletedEvent, PaymentStreamEvent};
use idempo_runtime::batch::{BatchDriver, BatchError, BatchRecord, BatchReport, FailurePolicy};
use idempo_runtime::runner::{IdempotentRunner, RunnerConfig};
use idempo_store::IdempotencyStore;

use crate::events::{parse_stream_batch, EventError, StreamEventName};

/// External payment collaborator.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Execute the payment. Implementations decide retryability: a declined
    /// card is permanent, a gateway timeout is retryable.
    async fn collect(
        &self,
        payment: &PaymentStreamEvent,
    ) -> Result<PaymentCompletedEvent, ExecutionError>;
}

pub struct PaymentProcessor {
    gateway: Arc<dyn PaymentGateway>,
    runner: IdempotentRunner,
    driver: BatchDriver,
}

impl PaymentProcessor {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        store: Arc<dyn IdempotencyStore>,
        runner_config: RunnerConfig,
        policy: FailurePolicy,
    ) -> Self {
        // One charge per ride, however many capture records the stream
        // redelivers.
        let key_spec = KeySpec::new(["ride_id"]);
        Self {
            gateway,
            runner: IdempotentRunner::new(store, key_spec, runner_config),
            driver: BatchDriver::new(policy),
        }
    }

    /// Process one delivered stream batch.
    ///
    /// Only INSERT records carry new payment requests; MODIFY and REMOVE
    /// records are skipped.
    #[tracing::instrument(skip(self, event))]
    pub async fn process_batch(&self, event: &Value) -> Result<BatchReport, PaymentBatchError> {
        let records = parse_stream_batch(event)?;

        let batch: Vec<BatchRecord> = records
            .into_iter()
            .filter(|record| record.event_name == StreamEventName::Insert)
            .filter_map(|record| {
                let Some(payload) = record.new_image else {
                    tracing::warn!(event_id = %record.event_id, "INSERT record without new image, skipping");
                    return None;
                };
                Some(BatchRecord {
                    id: record.event_id,
                    payload,
                })
            })
            .collect();

        let report = self
            .driver
            .run_batch(batch, |record| {
                let gateway = self.gateway.clone();
                let runner = &self.runner;
                async move {
                    let payload = record.payload.clone();
                    runner
                        .run(&record.payload, || async move {
                            let payment: PaymentStreamEvent = serde_json::from_value(payload)
                                .map_err(|e| ExecutionError::permanent(anyhow::Error::new(e)))?;

                            tracing::info!(
                                payment_id = %payment.payment_id,
                                ride_id = %payment.ride_id,
                                amount = payment.amount,
                                "Collecting payment"
                            );
                            let completed = gateway.collect(&payment).await?;

                            serde_json::to_value(&completed)
                                .map_err(|e| ExecutionError::permanent(anyhow::Error::new(e)))
                        })
                        .await
                }
            })
            .await?;

        Ok(report)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentBatchError {
    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Batch(#[from] BatchError),
}

impl PaymentBatchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            // A malformed batch will be malformed on redelivery too.
            PaymentBatchError::Event(_) => false,
            // Redelivery is worthwhile only if the failing record can
            // succeed; completed records short-circuit on their cached
            // results either way.
            PaymentBatchError::Batch(err) => err.is_retryable(),
        }
    }
}
