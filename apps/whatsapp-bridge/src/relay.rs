use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use wab_client::IncomingMessage;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("webhook transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("webhook returned {0}")]
    Status(StatusCode),
}

/// Receives every inbound message after it has been logged.
#[async_trait]
pub trait MessageRelay: Send + Sync {
    async fn relay(&self, message: &IncomingMessage) -> Result<(), RelayError>;
}

pub type SharedRelay = Arc<dyn MessageRelay>;

/// Request timeout for webhook deliveries unless configured otherwise.
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct WebhookPayload<'a> {
    event: &'static str,
    message: &'a IncomingMessage,
}

/// Forwards inbound messages as JSON to a configured URL.
#[derive(Clone)]
pub struct WebhookRelay {
    http: Client,
    url: String,
}

impl WebhookRelay {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RelayError> {
        let http = Client::builder()
            .user_agent(concat!("whatsapp-bridge/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self::with_client(http, url))
    }

    pub fn with_client(http: Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl MessageRelay for WebhookRelay {
    async fn relay(&self, message: &IncomingMessage) -> Result<(), RelayError> {
        let response = self
            .http
            .post(&self.url)
            .json(&WebhookPayload {
                event: "message",
                message,
            })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Status(status));
        }
        debug!(url = %self.url, id = %message.id, "relayed inbound message");
        Ok(())
    }
}
