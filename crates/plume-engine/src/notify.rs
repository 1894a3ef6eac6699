//! Outbound progress/failure reporting. Strictly best-effort: callers log
//! delivery failures and move on.

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Transport(String),

    #[error("webhook answered {0}")]
    Status(u16),
}

#[async_trait]
pub trait Notify: Send + Sync {
    async fn send(&self, message: &str) -> Result<(), NotifyError>;
}

/// Slack-compatible incoming webhook.
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

pub(crate) fn payload(message: &str) -> serde_json::Value {
    json!({ "text": message })
}

#[async_trait]
impl Notify for WebhookSink {
    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&payload(message))
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Sink used when no webhook is configured.
pub struct NullSink;

#[async_trait]
impl Notify for NullSink {
    async fn send(&self, _message: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_a_text_object() {
        assert_eq!(
            payload("posted").to_string(),
            r#"{"text":"posted"}"#
        );
    }
}
