//! Shared constants.

/// Default time a completed record is honored as a cache, in seconds (2 hours).
pub const DEFAULT_RESULT_TTL_SECS: u64 = 7200;

/// Default lifetime of an in-progress record when no invocation deadline is
/// known, in seconds. Bounds how long a crashed attempt blocks retries.
pub const DEFAULT_IN_PROGRESS_TTL_SECS: u64 = 60;

/// Default safety margin before the invocation deadline, in milliseconds.
/// When less time than this remains, the runner declines to start new work.
pub const DEFAULT_DEADLINE_MARGIN_MS: u64 = 500;

/// Key prefix for freshly uploaded objects awaiting processing.
pub const UPLOAD_KEY_PREFIX: &str = "uploads/";

/// Key prefix for transformed output objects.
pub const TRANSFORMED_KEY_PREFIX: &str = "transformed/";
