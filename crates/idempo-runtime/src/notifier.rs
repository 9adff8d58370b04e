//! Status notifier.
//!
//! Publishes per-file status transitions to interested subscribers through a
//! managed GraphQL endpoint. Notification is always best effort: a failed
//! publish is logged and never fails the pipeline, since the authoritative
//! state lives in the metadata repository, not the notification channel.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use idempo_core::models::FileStatus;
use idempo_core::NotifierConfig;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Failed to publish status update: {0}")]
    Publish(String),

    #[error("Notifier configuration error: {0}")]
    Config(String),
}

/// Outbound channel for file status transitions.
#[async_trait]
pub trait StatusNotifier: Send + Sync {
    async fn publish(&self, file_id: &str, status: FileStatus) -> Result<(), NotifyError>;
}

/// Used when no endpoint is configured (tests, local runs).
pub struct NoOpNotifier;

#[async_trait]
impl StatusNotifier for NoOpNotifier {
    async fn publish(&self, file_id: &str, status: FileStatus) -> Result<(), NotifyError> {
        tracing::debug!(file_id = %file_id, status = %status, "Status update (no-op notifier)");
        Ok(())
    }
}

const UPDATE_STATUS_MUTATION: &str = r#"
mutation UpdateFileStatus($input: FileStatusUpdateInput!) {
    updateFileStatus(input: $input) {
        id
        status
    }
}
"#;

/// Publishes status transitions as a GraphQL mutation, which the endpoint
/// fans out to subscribed clients.
pub struct GraphQlNotifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl GraphQlNotifier {
    pub fn new(endpoint: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl StatusNotifier for GraphQlNotifier {
    async fn publish(&self, file_id: &str, status: FileStatus) -> Result<(), NotifyError> {
        let body = json!({
            "query": UPDATE_STATUS_MUTATION,
            "variables": {
                "input": {
                    "id": file_id,
                    "status": status.to_string(),
                }
            }
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifyError::Publish(e.to_string()))?;

        let status_code = response.status();
        if !status_code.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(NotifyError::Publish(format!(
                "endpoint returned {}: {}",
                status_code, text
            )));
        }

        tracing::debug!(file_id = %file_id, status = %status, "Status update published");
        Ok(())
    }
}

/// Build a notifier from configuration. No endpoint means no-op.
pub fn create_notifier(config: &NotifierConfig) -> Arc<dyn StatusNotifier> {
    match config.endpoint {
        Some(ref endpoint) => Arc::new(GraphQlNotifier::new(
            endpoint.clone(),
            config.api_key.clone(),
        )),
        None => Arc::new(NoOpNotifier),
    }
}

/// Publish a status transition, logging failures instead of propagating them.
pub async fn notify_best_effort(notifier: &dyn StatusNotifier, file_id: &str, status: FileStatus) {
    if let Err(e) = notifier.publish(file_id, status).await {
        tracing::warn!(
            file_id = %file_id,
            status = %status,
            error = %e,
            "Status notification failed, continuing"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_notifier_always_succeeds() {
        let notifier = NoOpNotifier;
        assert!(notifier.publish("file-1", FileStatus::Working).await.is_ok());
    }

    #[tokio::test]
    async fn unconfigured_endpoint_yields_noop() {
        let notifier = create_notifier(&NotifierConfig::default());
        // No endpoint configured, so publishing must not hit the network.
        assert!(notifier
            .publish("file-1", FileStatus::Completed)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn best_effort_swallows_failures() {
        struct FailingNotifier;

        #[async_trait]
        impl StatusNotifier for FailingNotifier {
            async fn publish(&self, _: &str, _: FileStatus) -> Result<(), NotifyError> {
                Err(NotifyError::Publish("endpoint down".to_string()))
            }
        }

        // Must not panic or propagate.
        notify_best_effort(&FailingNotifier, "file-1", FileStatus::Failed).await;
    }
}
