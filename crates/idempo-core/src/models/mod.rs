pub mod file;
pub mod payment;
pub mod record;

pub use file::{FileMetadata, FileStatus};
pub use payment::{BatchItemError, PaymentCompletedEvent, PaymentStreamEvent};
pub use record::{ExecutionLease, IdempotencyRecord, RecordStatus};
