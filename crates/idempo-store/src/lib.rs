//! Idempo Store Library
//!
//! This crate provides the idempotency store abstraction and its backends:
//! an in-memory store for tests and single-process deployments, and a
//! DynamoDB store for durable multi-invocation coordination.
//!
//! # Conditional-write contract
//!
//! All coordination between concurrent invocations happens through the
//! store's conditional writes. `try_begin` succeeds for exactly one caller
//! per live fingerprint; every other caller observes the existing record.
//! A conditional-write conflict is a control signal, never retried by the
//! store itself.

#[cfg(feature = "store-dynamodb")]
pub mod dynamodb;
pub mod factory;
pub mod memory;
pub mod traits;

// Re-export commonly used types
#[cfg(feature = "store-dynamodb")]
pub use dynamodb::DynamoDbStore;
pub use factory::create_store;
pub use memory::MemoryStore;
pub use traits::{BeginOutcome, IdempotencyStore, StoreError, StoreResult};
