//! Idempo Pipelines Library
//!
//! The two concrete pipelines built on the idempotency runtime: thumbnail
//! generation for uploaded images and payment collection from a
//! change-data-capture stream, plus the event parsing and file-metadata
//! persistence they share.

pub mod events;
pub mod metadata;
pub mod payment;
pub mod thumbnail;

// Re-export commonly used types
pub use events::{
    parse_object_created, parse_stream_batch, unmarshal_attribute_map, EventError,
    ObjectCreatedEvent, StreamEventName, StreamRecord,
};
pub use metadata::{
    FileMetadataRepository, MemoryFileMetadataRepository, MetadataError, MetadataResult,
};
pub use payment::{PaymentBatchError, PaymentGateway, PaymentProcessor};
pub use thumbnail::{PipelineError, ThumbnailPipeline};
