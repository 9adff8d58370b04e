//! Thumbnail pipeline.
//!
//! Reacts to object-created notifications: looks up the owning file
//! metadata, transitions it through Working to Completed/Failed, and runs
//! the thumbnail generation as an idempotent unit of work keyed by object
//! etag and user id. A redelivered notification for an already-processed
//! upload short-circuits on the cached result and writes nothing.

use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::{json, Value};

use idempo_core::error::ExecutionError;
use idempo_core::fingerprint::KeySpec;
use idempo_core::models::FileStatus;
use idempo_core::ThumbnailConfig;
use idempo_runtime::notifier::{notify_best_effort, StatusNotifier};
use idempo_runtime::runner::{IdempotentRunner, RunnerConfig, RunnerError};
use idempo_storage::{transformed_key, ObjectStorage};
use idempo_store::IdempotencyStore;

use crate::events::{parse_object_created, EventError};
use crate::metadata::{FileMetadataRepository, MetadataError};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    /// No metadata row owns the uploaded key. Permanent; redelivery cannot
    /// make the row appear.
    #[error("No file metadata for key {0}")]
    UnknownKey(String),
}

impl PipelineError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Event(_) | PipelineError::UnknownKey(_) => false,
            PipelineError::Metadata(MetadataError::NotFound(_)) => false,
            PipelineError::Metadata(MetadataError::Backend(_)) => true,
            PipelineError::Runner(e) => e.is_retryable(),
        }
    }
}

pub struct ThumbnailPipeline {
    storage: Arc<dyn ObjectStorage>,
    metadata: Arc<dyn FileMetadataRepository>,
    notifier: Arc<dyn StatusNotifier>,
    runner: IdempotentRunner,
    config: ThumbnailConfig,
}

impl ThumbnailPipeline {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        metadata: Arc<dyn FileMetadataRepository>,
        notifier: Arc<dyn StatusNotifier>,
        store: Arc<dyn IdempotencyStore>,
        runner_config: RunnerConfig,
        config: ThumbnailConfig,
    ) -> Self {
        // A re-uploaded object gets a new etag, so the pair (etag, user id)
        // identifies one logical transformation.
        let key_spec = KeySpec::new(["etag", "user_id"]);
        Self {
            storage,
            metadata,
            notifier,
            runner: IdempotentRunner::new(store, key_spec, runner_config),
            config,
        }
    }

    /// Handle one object-created notification end to end.
    #[tracing::instrument(skip(self, event))]
    pub async fn handle_event(&self, event: &Value) -> Result<(), PipelineError> {
        let notification = parse_object_created(event)?;
        tracing::info!(
            bucket = %notification.bucket,
            key = %notification.key,
            etag = %notification.etag,
            "Processing upload notification"
        );

        let meta = self
            .metadata
            .find_by_key(&notification.key)
            .await?
            .ok_or_else(|| PipelineError::UnknownKey(notification.key.clone()))?;

        if meta.status == FileStatus::Completed {
            tracing::info!(file_id = %meta.id, "File already completed, nothing to do");
            return Ok(());
        }

        self.metadata.set_status(meta.id, FileStatus::Working).await?;
        notify_best_effort(self.notifier.as_ref(), &meta.id.to_string(), FileStatus::Working).await;

        let fingerprint_input = json!({
            "etag": notification.etag,
            "user_id": meta.user_id,
        });

        let storage = self.storage.clone();
        let key = notification.key.clone();
        let content_type = meta.content_type.clone();
        let max_width = self.config.max_width;
        let max_height = self.config.max_height;

        let outcome = self
            .runner
            .run(&fingerprint_input, || async move {
                let original = storage
                    .download(&key)
                    .await
                    .map_err(|e| ExecutionError::retryable(anyhow::Error::new(e)))?;

                let thumbnail = generate_thumbnail(&original, &content_type, max_width, max_height)?;

                let output_key = transformed_key(&key)
                    .map_err(|e| ExecutionError::permanent(anyhow::Error::new(e)))?;
                storage
                    .upload(&output_key, thumbnail, &content_type)
                    .await
                    .map_err(|e| ExecutionError::retryable(anyhow::Error::new(e)))?;

                Ok(json!({ "transformed_key": output_key }))
            })
            .await;

        match outcome {
            Ok(execution) => {
                if execution.is_cached() {
                    tracing::info!(file_id = %meta.id, "Thumbnail already generated, cached result");
                }
                self.metadata.set_status(meta.id, FileStatus::Completed).await?;
                notify_best_effort(
                    self.notifier.as_ref(),
                    &meta.id.to_string(),
                    FileStatus::Completed,
                )
                .await;
                Ok(())
            }
            Err(
                err @ (RunnerError::InProgress { .. }
                | RunnerError::DeadlineExceeded
                | RunnerError::Store(_)),
            ) => {
                // Control signal, not a side-effect failure: another attempt
                // owns the fingerprint or redelivery must resolve it. The
                // file keeps its current status; FAILED is reserved for the
                // side effect actually failing.
                tracing::info!(
                    file_id = %meta.id,
                    error = %err,
                    "Declining execution, leaving file status untouched"
                );
                Err(err.into())
            }
            Err(err) => {
                if let Err(meta_err) = self.metadata.set_status(meta.id, FileStatus::Failed).await {
                    tracing::error!(
                        file_id = %meta.id,
                        error = %meta_err,
                        "Failed to record failed status"
                    );
                }
                notify_best_effort(
                    self.notifier.as_ref(),
                    &meta.id.to_string(),
                    FileStatus::Failed,
                )
                .await;
                Err(err.into())
            }
        }
    }
}

/// Decode, bound to `max_width` x `max_height` preserving aspect ratio, and
/// re-encode in the declared format.
fn generate_thumbnail(
    data: &[u8],
    content_type: &str,
    max_width: u32,
    max_height: u32,
) -> Result<Bytes, ExecutionError> {
    let format = format_for(content_type);

    // Undecodable bytes will not decode on redelivery either.
    let img = image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| ExecutionError::permanent(anyhow::Error::new(e)))?
        .decode()
        .map_err(|e| ExecutionError::permanent(anyhow::Error::new(e)))?;

    let resized = img.thumbnail(max_width, max_height);

    let mut buffer = Vec::new();
    resized
        .write_to(&mut Cursor::new(&mut buffer), format)
        .map_err(|e| ExecutionError::permanent(anyhow::Error::new(e)))?;

    Ok(Bytes::from(buffer))
}

fn format_for(content_type: &str) -> image::ImageFormat {
    match content_type {
        "image/png" => image::ImageFormat::Png,
        "image/gif" => image::ImageFormat::Gif,
        "image/webp" => image::ImageFormat::WebP,
        _ => image::ImageFormat::Jpeg,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumbnail_respects_bounds() {
        let mut raw = Vec::new();
        image::DynamicImage::new_rgb8(64, 32)
            .write_to(&mut Cursor::new(&mut raw), image::ImageFormat::Png)
            .unwrap();

        let out = generate_thumbnail(&raw, "image/png", 16, 16).unwrap();
        let img = image::load_from_memory(&out).unwrap();
        assert!(img.width() <= 16);
        assert!(img.height() <= 16);
        // Aspect ratio preserved (2:1).
        assert_eq!(img.width(), 16);
        assert_eq!(img.height(), 8);
    }

    #[test]
    fn undecodable_bytes_are_a_permanent_failure() {
        let err = generate_thumbnail(b"not an image", "image/jpeg", 16, 16).unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn content_type_selects_format() {
        assert_eq!(format_for("image/png"), image::ImageFormat::Png);
        assert_eq!(format_for("image/jpeg"), image::ImageFormat::Jpeg);
        assert_eq!(format_for("application/octet-stream"), image::ImageFormat::Jpeg);
    }
}
