//! Payment pipeline event models.

use serde::{Deserialize, Serialize};

/// A payment request captured from the change-data-capture stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentStreamEvent {
    pub payment_id: String,
    pub ride_id: String,
    pub amount: f64,
    pub payment_method: String,
}

/// Result of a successfully executed payment; cached as the idempotent
/// result so redeliveries observe the same transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentCompletedEvent {
    pub payment_id: String,
    pub ride_id: String,
    pub amount: f64,
    pub payment_method: String,
    pub transaction_id: String,
    pub correlation_id: String,
}

/// A single failing batch record together with its original payload, so the
/// caller can decide whether to fail the whole batch or isolate the failure.
#[derive(Debug)]
pub struct BatchItemError {
    /// Zero-based position within the delivered batch.
    pub index: usize,
    /// Delivery-level identifier of the record (e.g. stream event id).
    pub record_id: String,
    /// The record payload as delivered.
    pub payload: serde_json::Value,
    /// Whether redelivering this record can succeed. Validation and other
    /// permanent failures carry `false` so the batch is not redelivered
    /// forever.
    pub retryable: bool,
    pub source: anyhow::Error,
}

impl std::fmt::Display for BatchItemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "record {} (index {}) failed: {}",
            self.record_id, self.index, self.source
        )
    }
}

impl std::error::Error for BatchItemError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.source()
    }
}
