//! Fingerprint derivation.
//!
//! A fingerprint is a deterministic key derived from selected fields of an
//! inbound event, used to detect duplicate logical operations. Derivation is
//! a pure function of the event body: same input, same fingerprint.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::Display;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("Missing idempotency key field: {path}")]
    MissingKey { path: String },
}

/// Deterministic key derived from selected event fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which event fields feed the fingerprint, and whether their absence is fatal.
#[derive(Debug, Clone)]
pub struct KeySpec {
    /// Dot-separated path expressions over the event body,
    /// e.g. `["detail.object.etag", "user_id"]`.
    pub paths: Vec<String>,
    /// With strict enforcement, a missing or null field fails derivation.
    /// Otherwise derivation proceeds with the present subset (a degraded,
    /// potentially non-unique key) and logs a warning.
    pub strict: bool,
}

impl KeySpec {
    pub fn new(paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            strict: true,
        }
    }

    pub fn lenient(mut self) -> Self {
        self.strict = false;
        self
    }

    /// Derive the fingerprint for `event`.
    pub fn derive(&self, event: &Value) -> Result<Fingerprint, FingerprintError> {
        let mut parts: Vec<String> = Vec::with_capacity(self.paths.len());

        for path in &self.paths {
            match lookup(event, path) {
                Some(value) => parts.push(render_scalar(value)),
                None if self.strict => {
                    return Err(FingerprintError::MissingKey { path: path.clone() });
                }
                None => {
                    tracing::warn!(path = %path, "Idempotency key field absent, deriving degraded key");
                }
            }
        }

        // Unit-separator join keeps "ab"+"c" distinct from "a"+"bc".
        let canonical = parts.join("\u{1f}");
        let digest = Sha256::digest(canonical.as_bytes());
        Ok(Fingerprint(hex::encode(digest)))
    }
}

/// Resolve a dot-separated path against a JSON value. Null counts as absent.
fn lookup<'a>(event: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = event;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Canonical text for a scalar field. Objects and arrays are serialized so
/// structured fields still derive deterministically.
fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event() -> Value {
        json!({
            "detail": {
                "object": { "key": "uploads/images/jpg/abc.jpg", "etag": "e1" }
            },
            "user_id": "user-7"
        })
    }

    #[test]
    fn same_input_same_fingerprint() {
        let spec = KeySpec::new(["detail.object.etag", "user_id"]);
        let a = spec.derive(&event()).unwrap();
        let b = spec.derive(&event()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_fields_different_fingerprint() {
        let spec = KeySpec::new(["detail.object.etag", "user_id"]);
        let base = spec.derive(&event()).unwrap();

        let mut other = event();
        other["detail"]["object"]["etag"] = json!("e2");
        assert_ne!(spec.derive(&other).unwrap(), base);
    }

    #[test]
    fn concatenation_is_unambiguous() {
        let spec = KeySpec::new(["a", "b"]);
        let left = spec.derive(&json!({"a": "ab", "b": "c"})).unwrap();
        let right = spec.derive(&json!({"a": "a", "b": "bc"})).unwrap();
        assert_ne!(left, right);
    }

    #[test]
    fn strict_missing_field_fails() {
        let spec = KeySpec::new(["detail.object.etag", "missing_field"]);
        let err = spec.derive(&event()).unwrap_err();
        assert!(matches!(err, FingerprintError::MissingKey { ref path } if path == "missing_field"));
    }

    #[test]
    fn null_counts_as_missing() {
        let spec = KeySpec::new(["user_id"]);
        let err = spec.derive(&json!({"user_id": null})).unwrap_err();
        assert!(matches!(err, FingerprintError::MissingKey { .. }));
    }

    #[test]
    fn lenient_mode_derives_degraded_key() {
        let spec = KeySpec::new(["detail.object.etag", "missing_field"]).lenient();
        let degraded = spec.derive(&event()).unwrap();
        let full = KeySpec::new(["detail.object.etag"]).derive(&event()).unwrap();
        // Degraded key equals the key over the present subset.
        assert_eq!(degraded, full);
    }

    #[test]
    fn numeric_fields_participate() {
        let spec = KeySpec::new(["amount"]);
        let a = spec.derive(&json!({"amount": 12.5})).unwrap();
        let b = spec.derive(&json!({"amount": 13.0})).unwrap();
        assert_ne!(a, b);
    }
}
