//! Idempo Core Library
//!
//! This crate provides the domain models, error types, configuration, and
//! fingerprint derivation shared across all idempo components.

pub mod config;
pub mod constants;
pub mod error;
pub mod fingerprint;
pub mod hooks;
pub mod models;
pub mod telemetry;

// Re-export commonly used types
pub use config::{IdempotencyConfig, NotifierConfig, StorageConfig, ThumbnailConfig};
pub use error::{AppError, ExecutionError, ExecutionResultExt};
pub use fingerprint::{Fingerprint, FingerprintError, KeySpec};
pub use hooks::{ExecutionHook, HookChain, HookContext, NoOpHook};
pub use models::{
    BatchItemError, ExecutionLease, FileMetadata, FileStatus, IdempotencyRecord,
    PaymentCompletedEvent, PaymentStreamEvent, RecordStatus,
};
