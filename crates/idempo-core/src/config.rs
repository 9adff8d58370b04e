//! Configuration module
//!
//! Environment-driven configuration for the idempotency runtime and the
//! pipelines. Every struct deserializes from `IDEMPO_`-prefixed environment
//! variables via `envy` and carries sensible defaults for local runs.

use serde::Deserialize;

use crate::constants::{
    DEFAULT_DEADLINE_MARGIN_MS, DEFAULT_IN_PROGRESS_TTL_SECS, DEFAULT_RESULT_TTL_SECS,
};

fn default_result_ttl_secs() -> u64 {
    DEFAULT_RESULT_TTL_SECS
}

fn default_in_progress_ttl_secs() -> u64 {
    DEFAULT_IN_PROGRESS_TTL_SECS
}

fn default_deadline_margin_ms() -> u64 {
    DEFAULT_DEADLINE_MARGIN_MS
}

fn default_true() -> bool {
    true
}

fn default_thumbnail_dim() -> u32 {
    320
}

/// Idempotency runtime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IdempotencyConfig {
    /// How long a completed result is honored as a cache, in seconds.
    #[serde(default = "default_result_ttl_secs")]
    pub result_ttl_secs: u64,
    /// Lifetime of an in-progress record when no invocation deadline is
    /// known, in seconds.
    #[serde(default = "default_in_progress_ttl_secs")]
    pub in_progress_ttl_secs: u64,
    /// Safety margin before the invocation deadline, in milliseconds.
    #[serde(default = "default_deadline_margin_ms")]
    pub deadline_margin_ms: u64,
    /// Strict enforcement of idempotency key fields (missing field is fatal).
    #[serde(default = "default_true")]
    pub strict_keys: bool,
    /// Store backend selector: "memory" or "dynamodb".
    #[serde(default)]
    pub store_backend: Option<String>,
    /// DynamoDB table name for the idempotency store.
    #[serde(default)]
    pub store_table: Option<String>,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            result_ttl_secs: DEFAULT_RESULT_TTL_SECS,
            in_progress_ttl_secs: DEFAULT_IN_PROGRESS_TTL_SECS,
            deadline_margin_ms: DEFAULT_DEADLINE_MARGIN_MS,
            strict_keys: true,
            store_backend: None,
            store_table: None,
        }
    }
}

impl IdempotencyConfig {
    /// Load from `IDEMPO_`-prefixed environment variables, reading `.env`
    /// first if present.
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::prefixed("IDEMPO_").from_env()
    }
}

/// Thumbnail pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ThumbnailConfig {
    /// Maximum width of generated thumbnails, in pixels.
    #[serde(default = "default_thumbnail_dim")]
    pub max_width: u32,
    /// Maximum height of generated thumbnails, in pixels.
    #[serde(default = "default_thumbnail_dim")]
    pub max_height: u32,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_width: default_thumbnail_dim(),
            max_height: default_thumbnail_dim(),
        }
    }
}

impl ThumbnailConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::prefixed("IDEMPO_THUMBNAIL_").from_env()
    }
}

/// Object-storage configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Backend selector: "memory" (default), "local", or "s3".
    #[serde(default)]
    pub storage_backend: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    /// Custom endpoint for S3-compatible providers (MinIO etc.).
    pub s3_endpoint: Option<String>,
    pub local_storage_path: Option<String>,
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::prefixed("IDEMPO_").from_env()
    }
}

/// Status notifier configuration (managed GraphQL endpoint).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifierConfig {
    /// GraphQL endpoint URL; when unset the no-op notifier is used.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// API key sent in the `x-api-key` header.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl NotifierConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::prefixed("IDEMPO_NOTIFIER_").from_env()
    }
}
