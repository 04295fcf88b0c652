//! Alert and speech delivery collaborators
//!
//! Both interfaces are fire-and-forget from the orchestrator's view:
//! delivery failures are logged and degrade functionality, they are never
//! raised back into the tick loop.

use std::sync::Arc;

use async_trait::async_trait;

/// Broadcasts alert text to the guild channel
#[async_trait]
pub trait AlertTransport: Send + Sync {
    async fn broadcast(&self, text: &str);
}

/// Speaks a reply back to one speaker
#[async_trait]
pub trait SpeechSynth: Send + Sync {
    async fn say(&self, speaker: &str, text: &str);
}

/// Webhook-backed alert transport; posts `{"text": ...}` to a fixed URL
pub struct WebhookTransport {
    client: reqwest::Client,
    url: String,
}

impl WebhookTransport {
    #[must_use]
    pub fn new(url: String) -> Arc<Self> {
        Arc::new(Self {
            client: reqwest::Client::new(),
            url,
        })
    }
}

#[async_trait]
impl AlertTransport for WebhookTransport {
    async fn broadcast(&self, text: &str) {
        let body = serde_json::json!({ "text": text });
        match self.client.post(&self.url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(text, "alert broadcast");
            }
            Ok(response) => {
                tracing::warn!(status = %response.status(), "alert broadcast rejected");
            }
            Err(e) => {
                tracing::warn!(error = %e, "alert broadcast failed");
            }
        }
    }
}

/// Log-only transport for running without a configured webhook
pub struct LogTransport;

#[async_trait]
impl AlertTransport for LogTransport {
    async fn broadcast(&self, text: &str) {
        tracing::info!(text, "alert (log-only transport)");
    }
}
