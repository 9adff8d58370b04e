//! Payment batch scenarios: all-or-nothing failure and idempotent redelivery.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use idempo_core::error::ExecutionError;
use idempo_core::models::{PaymentCompletedEvent, PaymentStreamEvent};
use idempo_pipelines::{PaymentGateway, PaymentProcessor};
use idempo_runtime::batch::FailurePolicy;
use idempo_runtime::runner::RunnerConfig;
use idempo_store::MemoryStore;

/// Gateway that fails configured rides once, recording every charge.
#[derive(Default)]
struct FlakyGateway {
    fail_rides: Mutex<HashSet<String>>,
    charged: Mutex<Vec<String>>,
}

impl FlakyGateway {
    async fn fail_once(&self, ride_id: &str) {
        self.fail_rides.lock().await.insert(ride_id.to_string());
    }

    async fn charges(&self) -> Vec<String> {
        self.charged.lock().await.clone()
    }
}

#[async_trait]
impl PaymentGateway for FlakyGateway {
    async fn collect(
        &self,
        payment: &PaymentStreamEvent,
    ) -> Result<PaymentCompletedEvent, ExecutionError> {
        if self.fail_rides.lock().await.remove(&payment.ride_id) {
            return Err(ExecutionError::retryable(anyhow::anyhow!(
                "gateway timeout for ride {}",
                payment.ride_id
            )));
        }

        self.charged.lock().await.push(payment.ride_id.clone());
        Ok(PaymentCompletedEvent {
            payment_id: payment.payment_id.clone(),
            ride_id: payment.ride_id.clone(),
            amount: payment.amount,
            payment_method: payment.payment_method.clone(),
            transaction_id: format!("txn-{}", payment.ride_id),
            correlation_id: uuid::Uuid::new_v4().to_string(),
        })
    }
}

fn insert_record(event_id: &str, ride_id: &str) -> Value {
    json!({
        "eventID": event_id,
        "eventName": "INSERT",
        "dynamodb": {
            "NewImage": {
                "payment_id": { "S": format!("pay-{}", ride_id) },
                "ride_id": { "S": ride_id },
                "amount": { "N": "25.0" },
                "payment_method": { "S": "card" }
            }
        }
    })
}

fn three_record_batch() -> Value {
    json!({
        "Records": [
            insert_record("evt-1", "ride-1"),
            insert_record("evt-2", "ride-2"),
            insert_record("evt-3", "ride-3")
        ]
    })
}

#[tokio::test]
async fn failing_record_aborts_the_rest_of_the_batch() {
    let gateway = Arc::new(FlakyGateway::default());
    gateway.fail_once("ride-2").await;

    let processor = PaymentProcessor::new(
        gateway.clone(),
        Arc::new(MemoryStore::new()),
        RunnerConfig::default(),
        FailurePolicy::AllOrNothing,
    );

    let err = processor
        .process_batch(&three_record_batch())
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    // Record 1 charged, record 2 failed, record 3 never attempted.
    assert_eq!(gateway.charges().await, vec!["ride-1".to_string()]);
}

#[tokio::test]
async fn redelivered_batch_skips_completed_records() {
    let gateway = Arc::new(FlakyGateway::default());
    gateway.fail_once("ride-2").await;

    let store = Arc::new(MemoryStore::new());
    let processor = PaymentProcessor::new(
        gateway.clone(),
        store,
        RunnerConfig::default(),
        FailurePolicy::AllOrNothing,
    );

    processor
        .process_batch(&three_record_batch())
        .await
        .unwrap_err();

    // Redelivery of the whole batch: ride-1 comes from the cache, rides 2
    // and 3 execute.
    let report = processor
        .process_batch(&three_record_batch())
        .await
        .unwrap();
    assert_eq!(report.cached, 1);
    assert_eq!(report.completed, 2);
    assert_eq!(
        gateway.charges().await,
        vec![
            "ride-1".to_string(),
            "ride-2".to_string(),
            "ride-3".to_string()
        ]
    );
}

#[tokio::test]
async fn report_partial_isolates_the_failure() {
    let gateway = Arc::new(FlakyGateway::default());
    gateway.fail_once("ride-2").await;

    let processor = PaymentProcessor::new(
        gateway.clone(),
        Arc::new(MemoryStore::new()),
        RunnerConfig::default(),
        FailurePolicy::ReportPartial,
    );

    let report = processor
        .process_batch(&three_record_batch())
        .await
        .unwrap();
    assert_eq!(report.completed, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].record_id, "evt-2");

    assert_eq!(
        gateway.charges().await,
        vec!["ride-1".to_string(), "ride-3".to_string()]
    );
}
