//! Idempo Storage Library
//!
//! Object-storage abstraction for the pipelines: originals are read from
//! under `uploads/`, transformed outputs are written under `transformed/`.
//! Backends: in-memory (tests, local runs), local filesystem, and S3.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use keys::transformed_key;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::MemoryStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{ObjectStorage, StorageError, StorageResult};
