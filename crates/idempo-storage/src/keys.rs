//! Shared key mapping for storage backends.
//!
//! Originals land under `uploads/...`; transformed outputs go under
//! `transformed/...` with the same trailing path. All backends and pipelines
//! must use this mapping for consistency.

use crate::traits::{StorageError, StorageResult};
use idempo_core::constants::{TRANSFORMED_KEY_PREFIX, UPLOAD_KEY_PREFIX};

/// Map an original object key to its transformed-output key.
///
/// `uploads/images/jpg/abc.jpg` becomes `transformed/images/jpg/abc.jpg`.
/// Keys outside the upload prefix are rejected so a transformed object can
/// never trigger a second transformation of itself.
pub fn transformed_key(original_key: &str) -> StorageResult<String> {
    let rest = original_key
        .strip_prefix(UPLOAD_KEY_PREFIX)
        .ok_or_else(|| StorageError::InvalidKey(original_key.to_string()))?;
    if rest.is_empty() {
        return Err(StorageError::InvalidKey(original_key.to_string()));
    }
    Ok(format!("{}{}", TRANSFORMED_KEY_PREFIX, rest))
}
