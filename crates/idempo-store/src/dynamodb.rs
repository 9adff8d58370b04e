//! DynamoDB store backend.
//!
//! One item per fingerprint, guarded by condition expressions:
//!
//! - `try_begin` puts an in-progress item conditional on no live item
//!   existing (`attribute_not_exists` or past expiry).
//! - `complete` updates to completed conditional on the lease token still
//!   owning the item.
//! - `abort` deletes conditional on the lease token; losing the race is a
//!   no-op.
//!
//! `expires_at` doubles as the table's TTL attribute so DynamoDB reclaims
//! stale items on its own.

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::traits::{BeginOutcome, IdempotencyStore, StoreError, StoreResult};
use idempo_core::models::{ExecutionLease, IdempotencyRecord, RecordStatus};

const STATUS_IN_PROGRESS: &str = "in_progress";
const STATUS_COMPLETED: &str = "completed";

#[derive(Clone, Debug)]
pub struct DynamoDbStore {
    client: Client,
    table: String,
}

impl DynamoDbStore {
    /// Create a store over an existing table. The table must be keyed by the
    /// string attribute `fingerprint` and should use `expires_at` as its TTL
    /// attribute.
    pub async fn new(table: String) -> StoreResult<Self> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Ok(Self {
            client: Client::new(&config),
            table,
        })
    }

    /// Create a store from a preconfigured client (custom endpoint, tests).
    pub fn with_client(client: Client, table: String) -> Self {
        Self { client, table }
    }

    fn chrono_ttl(ttl: Duration) -> ChronoDuration {
        ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::seconds(i64::MAX / 2))
    }

    async fn fetch(&self, fingerprint: &str) -> StoreResult<Option<IdempotencyRecord>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("fingerprint", AttributeValue::S(fingerprint.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        output.item.map(parse_record).transpose()
    }
}

#[async_trait]
impl IdempotencyStore for DynamoDbStore {
    async fn try_begin(
        &self,
        fingerprint: &str,
        in_progress_ttl: Duration,
    ) -> StoreResult<BeginOutcome> {
        let now = Utc::now();
        let lease = ExecutionLease::new(fingerprint.to_string());
        let expires_at = now + Self::chrono_ttl(in_progress_ttl);

        let put = self
            .client
            .put_item()
            .table_name(&self.table)
            .item("fingerprint", AttributeValue::S(fingerprint.to_string()))
            .item("record_status", AttributeValue::S(STATUS_IN_PROGRESS.to_string()))
            .item(
                "expires_at",
                AttributeValue::N(expires_at.timestamp().to_string()),
            )
            .item("lease_token", AttributeValue::S(lease.token.to_string()))
            .item("created_at", AttributeValue::N(now.timestamp().to_string()))
            .condition_expression("attribute_not_exists(fingerprint) OR expires_at <= :now")
            .expression_attribute_values(":now", AttributeValue::N(now.timestamp().to_string()))
            .send()
            .await;

        match put {
            Ok(_) => Ok(BeginOutcome::Started(lease)),
            Err(err) => {
                let service_err = err.into_service_error();
                if !service_err.is_conditional_check_failed_exception() {
                    tracing::error!(
                        error = %service_err,
                        table = %self.table,
                        fingerprint = %fingerprint,
                        "DynamoDB conditional put failed"
                    );
                    return Err(StoreError::Backend(service_err.to_string()));
                }

                // A live record exists. Fetch it to tell the caller whether
                // it is in progress or already completed.
                let record = self
                    .fetch(fingerprint)
                    .await?
                    .ok_or_else(|| StoreError::Conflict(fingerprint.to_string()))?;

                match record.status_at(Utc::now()) {
                    RecordStatus::Completed => {
                        let result = record.result.ok_or_else(|| {
                            StoreError::Backend(format!(
                                "completed record without result for fingerprint {}",
                                fingerprint
                            ))
                        })?;
                        Ok(BeginOutcome::Completed(result))
                    }
                    RecordStatus::InProgress => Ok(BeginOutcome::InProgress(record)),
                    // The record expired between the put and the read; the
                    // caller's redelivery will claim it cleanly.
                    RecordStatus::Expired => Err(StoreError::Conflict(fingerprint.to_string())),
                }
            }
        }
    }

    async fn complete(
        &self,
        lease: &ExecutionLease,
        result: serde_json::Value,
        result_ttl: Duration,
    ) -> StoreResult<()> {
        let now = Utc::now();
        let expires_at = now + Self::chrono_ttl(result_ttl);
        let serialized = serde_json::to_string(&result)?;

        let update = self
            .client
            .update_item()
            .table_name(&self.table)
            .key(
                "fingerprint",
                AttributeValue::S(lease.fingerprint.clone()),
            )
            .update_expression(
                "SET record_status = :completed, #result = :result, expires_at = :expires",
            )
            .condition_expression("lease_token = :token AND record_status = :in_progress")
            .expression_attribute_names("#result", "result")
            .expression_attribute_values(
                ":completed",
                AttributeValue::S(STATUS_COMPLETED.to_string()),
            )
            .expression_attribute_values(":result", AttributeValue::S(serialized))
            .expression_attribute_values(
                ":expires",
                AttributeValue::N(expires_at.timestamp().to_string()),
            )
            .expression_attribute_values(":token", AttributeValue::S(lease.token.to_string()))
            .expression_attribute_values(
                ":in_progress",
                AttributeValue::S(STATUS_IN_PROGRESS.to_string()),
            )
            .send()
            .await;

        match update {
            Ok(_) => Ok(()),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_conditional_check_failed_exception() {
                    Err(StoreError::Conflict(lease.fingerprint.clone()))
                } else {
                    Err(StoreError::Backend(service_err.to_string()))
                }
            }
        }
    }

    async fn abort(&self, lease: &ExecutionLease) -> StoreResult<()> {
        let delete = self
            .client
            .delete_item()
            .table_name(&self.table)
            .key(
                "fingerprint",
                AttributeValue::S(lease.fingerprint.clone()),
            )
            .condition_expression("lease_token = :token")
            .expression_attribute_values(":token", AttributeValue::S(lease.token.to_string()))
            .send()
            .await;

        match delete {
            Ok(_) => Ok(()),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_conditional_check_failed_exception() {
                    tracing::debug!(
                        fingerprint = %lease.fingerprint,
                        "Abort skipped, record owned by a successor"
                    );
                    Ok(())
                } else {
                    Err(StoreError::Backend(service_err.to_string()))
                }
            }
        }
    }

    async fn get(&self, fingerprint: &str) -> StoreResult<Option<IdempotencyRecord>> {
        self.fetch(fingerprint).await
    }
}

fn parse_record(item: HashMap<String, AttributeValue>) -> StoreResult<IdempotencyRecord> {
    let fingerprint = string_attr(&item, "fingerprint")?;
    let status = match string_attr(&item, "record_status")?.as_str() {
        STATUS_IN_PROGRESS => RecordStatus::InProgress,
        STATUS_COMPLETED => RecordStatus::Completed,
        other => {
            return Err(StoreError::Backend(format!(
                "unknown record_status {:?}",
                other
            )))
        }
    };
    let result = match item.get("result") {
        Some(AttributeValue::S(s)) => Some(serde_json::from_str(s)?),
        _ => None,
    };
    let lease_token = string_attr(&item, "lease_token")?
        .parse::<Uuid>()
        .map_err(|e| StoreError::Backend(format!("invalid lease_token: {}", e)))?;

    Ok(IdempotencyRecord {
        fingerprint,
        status,
        result,
        expires_at: timestamp_attr(&item, "expires_at")?,
        lease_token,
        created_at: timestamp_attr(&item, "created_at")?,
    })
}

fn string_attr(item: &HashMap<String, AttributeValue>, name: &str) -> StoreResult<String> {
    match item.get(name) {
        Some(AttributeValue::S(s)) => Ok(s.clone()),
        _ => Err(StoreError::Backend(format!(
            "missing string attribute {:?}",
            name
        ))),
    }
}

fn timestamp_attr(
    item: &HashMap<String, AttributeValue>,
    name: &str,
) -> StoreResult<DateTime<Utc>> {
    let raw = match item.get(name) {
        Some(AttributeValue::N(n)) => n,
        _ => {
            return Err(StoreError::Backend(format!(
                "missing numeric attribute {:?}",
                name
            )))
        }
    };
    let secs = raw
        .parse::<i64>()
        .map_err(|e| StoreError::Backend(format!("invalid timestamp {:?}: {}", name, e)))?;
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| StoreError::Backend(format!("timestamp {:?} out of range", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_record_round_trips_attributes() {
        let token = Uuid::new_v4();
        let mut item = HashMap::new();
        item.insert(
            "fingerprint".to_string(),
            AttributeValue::S("abc".to_string()),
        );
        item.insert(
            "record_status".to_string(),
            AttributeValue::S("completed".to_string()),
        );
        item.insert(
            "result".to_string(),
            AttributeValue::S("{\"key\":\"out\"}".to_string()),
        );
        item.insert(
            "expires_at".to_string(),
            AttributeValue::N("1700000000".to_string()),
        );
        item.insert(
            "lease_token".to_string(),
            AttributeValue::S(token.to_string()),
        );
        item.insert(
            "created_at".to_string(),
            AttributeValue::N("1699990000".to_string()),
        );

        let record = parse_record(item).unwrap();
        assert_eq!(record.fingerprint, "abc");
        assert_eq!(record.status, RecordStatus::Completed);
        assert_eq!(record.result, Some(serde_json::json!({"key": "out"})));
        assert_eq!(record.lease_token, token);
        assert_eq!(record.expires_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn parse_record_rejects_unknown_status() {
        let mut item = HashMap::new();
        item.insert(
            "fingerprint".to_string(),
            AttributeValue::S("abc".to_string()),
        );
        item.insert(
            "record_status".to_string(),
            AttributeValue::S("draining".to_string()),
        );
        assert!(parse_record(item).is_err());
    }

    #[test]
    fn parse_record_requires_timestamps() {
        let mut item = HashMap::new();
        item.insert(
            "fingerprint".to_string(),
            AttributeValue::S("abc".to_string()),
        );
        item.insert(
            "record_status".to_string(),
            AttributeValue::S("in_progress".to_string()),
        );
        item.insert(
            "lease_token".to_string(),
            AttributeValue::S(Uuid::new_v4().to_string()),
        );
        assert!(parse_record(item).is_err());
    }
}
