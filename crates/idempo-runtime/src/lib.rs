//! Idempo Runtime Library
//!
//! The execution side of the idempotency pattern: a runner that wraps one
//! unit of work with at-most-once semantics, a batch driver for ordered
//! record batches, and a best-effort status notifier.

pub mod batch;
pub mod notifier;
pub mod runner;

// Re-export commonly used types
pub use batch::{BatchDriver, BatchError, BatchRecord, BatchReport, FailurePolicy};
pub use notifier::{
    create_notifier, notify_best_effort, GraphQlNotifier, NoOpNotifier, NotifyError, StatusNotifier,
};
pub use runner::{Execution, IdempotentRunner, RunnerConfig, RunnerError};
