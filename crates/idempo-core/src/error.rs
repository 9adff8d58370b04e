//! Error types module
//!
//! This module provides the core error types used throughout idempo. The
//! taxonomy follows the processing model: validation errors are fatal and
//! never retried, transient infrastructure errors are retryable by the
//! surrounding delivery mechanism, and duplicate-in-progress is a control
//! signal rather than a domain error.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    /// Whether the surrounding delivery mechanism should retry after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::InvalidInput(_) | AppError::NotFound(_) => false,
            AppError::ImageProcessing(_) => false,
            AppError::Storage(_)
            | AppError::Internal(_)
            | AppError::InternalWithSource { .. } => true,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("UUID parsing error: {}", err))
    }
}

/// Side-effect execution error that can be either retryable or permanent.
///
/// Units of work passed to the idempotent runner use this to tell the
/// redelivery mechanism whether another attempt can succeed. Permanent
/// failures (bad payload, unsupported format) should not be redelivered;
/// transient failures (network, throttling) should.
#[derive(Debug)]
pub struct ExecutionError {
    inner: anyhow::Error,
    retryable: bool,
}

impl ExecutionError {
    /// Create a permanent execution error. The delivery mechanism should not
    /// attempt redelivery; the input will not succeed on retry.
    pub fn permanent(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            retryable: false,
        }
    }

    /// Create a retryable execution error (transient network failure,
    /// throttling, temporary resource exhaustion).
    pub fn retryable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            retryable: true,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }
}

impl std::fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for ExecutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for ExecutionError {
    /// Default conversion treats the error as retryable.
    fn from(err: anyhow::Error) -> Self {
        Self::retryable(err)
    }
}

/// Extension trait for Result to mark failures as permanent.
pub trait ExecutionResultExt<T> {
    fn permanent(self) -> Result<T, ExecutionError>;
}

impl<T, E: Into<anyhow::Error>> ExecutionResultExt<T> for Result<T, E> {
    fn permanent(self) -> Result<T, ExecutionError> {
        self.map_err(|e| ExecutionError::permanent(e.into()))
    }
}
