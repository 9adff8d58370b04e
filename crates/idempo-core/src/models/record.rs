//! Idempotency record and execution lease models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Persisted state of one logical execution attempt.
///
/// `Expired` is never stored; it is the derived view of a record whose
/// `expires_at` has passed. Stores treat expired records as absent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    InProgress,
    Completed,
    Expired,
}

impl Display for RecordStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            RecordStatus::InProgress => write!(f, "in_progress"),
            RecordStatus::Completed => write!(f, "completed"),
            RecordStatus::Expired => write!(f, "expired"),
        }
    }
}

impl FromStr for RecordStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(RecordStatus::InProgress),
            "completed" => Ok(RecordStatus::Completed),
            "expired" => Ok(RecordStatus::Expired),
            _ => Err(anyhow::anyhow!("Invalid record status: {}", s)),
        }
    }
}

/// One row of the idempotency store, keyed by fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub fingerprint: String,
    pub status: RecordStatus,
    /// Serialized result of a successful execution; present only when
    /// `status` is `Completed`.
    pub result: Option<serde_json::Value>,
    /// Instant after which the record is no longer honored.
    pub expires_at: DateTime<Utc>,
    /// Token of the attempt that created the record. `complete`/`abort` are
    /// conditional on still holding it.
    pub lease_token: Uuid,
    pub created_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// The effective status at `now`, folding expiry into the view.
    pub fn status_at(&self, now: DateTime<Utc>) -> RecordStatus {
        if self.is_expired_at(now) {
            RecordStatus::Expired
        } else {
            self.status
        }
    }
}

/// Handle returned by a successful `try_begin`; proves ownership of the
/// in-progress record for the duration of one attempt.
#[derive(Debug, Clone)]
pub struct ExecutionLease {
    pub fingerprint: String,
    pub token: Uuid,
    pub started_at: DateTime<Utc>,
}

impl ExecutionLease {
    pub fn new(fingerprint: String) -> Self {
        Self {
            fingerprint,
            token: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(status: RecordStatus, expires_in_secs: i64) -> IdempotencyRecord {
        IdempotencyRecord {
            fingerprint: "abc".to_string(),
            status,
            result: None,
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
            lease_token: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn status_display_round_trip() {
        for status in [
            RecordStatus::InProgress,
            RecordStatus::Completed,
            RecordStatus::Expired,
        ] {
            assert_eq!(status.to_string().parse::<RecordStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<RecordStatus>().is_err());
    }

    #[test]
    fn live_record_keeps_its_status() {
        let rec = record(RecordStatus::InProgress, 60);
        assert_eq!(rec.status_at(Utc::now()), RecordStatus::InProgress);
        assert!(!rec.is_expired_at(Utc::now()));
    }

    #[test]
    fn past_expiry_reads_as_expired() {
        let rec = record(RecordStatus::Completed, -1);
        assert_eq!(rec.status_at(Utc::now()), RecordStatus::Expired);
        assert!(rec.is_expired_at(Utc::now()));
    }

    #[test]
    fn lease_tokens_are_unique() {
        let a = ExecutionLease::new("f".to_string());
        let b = ExecutionLease::new("f".to_string());
        assert_ne!(a.token, b.token);
    }
}
