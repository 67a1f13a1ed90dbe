//! HTTP client for an out-of-process WhatsApp Web driver.
//!
//! The driver owns the browser session and the session folder; the bridge
//! talks to it over a small JSON API and long-polls `/events` for lifecycle
//! events, which the pump forwards onto the bridge's event channel.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    Chat, ClientError, ClientEvent, Contact, EventSender, MessageContent, MessagingClient,
    SendOptions, SentMessage, backoff,
};

pub const DEFAULT_DRIVER_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_DRIVER_TIMEOUT: Duration = Duration::from_secs(60);

const IDLE_POLL_DELAY: Duration = Duration::from_millis(250);
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_DRIVER_URL.to_string(),
            timeout: DEFAULT_DRIVER_TIMEOUT,
        }
    }
}

/// One page of driver events; `cursor` is passed back on the next poll.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBatch {
    pub events: Vec<ClientEvent>,
    pub cursor: Option<u64>,
}

#[derive(Deserialize)]
struct RawEventBatch {
    #[serde(default)]
    events: Vec<Value>,
    #[serde(default)]
    cursor: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    chat_id: &'a str,
    content: &'a MessageContent,
    options: &'a SendOptions,
}

pub struct DriverClient {
    http: Client,
    base_url: Url,
}

impl DriverClient {
    pub fn new(config: &DriverConfig) -> Result<Self, ClientError> {
        let http = Client::builder()
            .user_agent(concat!("whatsapp-bridge/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;
        Self::with_client(http, &config.base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> Result<Self, ClientError> {
        // endpoints are joined relative to the base, which needs a trailing slash
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let url = Url::parse(&normalized)
            .map_err(|err| ClientError::Config(format!("{base_url}: {err}")))?;
        if url.cannot_be_a_base() {
            return Err(ClientError::Config(format!("{base_url}: not a base url")));
        }
        Ok(Self {
            http,
            base_url: url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|err| ClientError::Config(err.to_string()))
    }

    /// Fetches the events queued after `cursor`. Events of unknown type are skipped.
    pub async fn poll_events(&self, cursor: Option<u64>) -> Result<EventBatch, ClientError> {
        let url = self.endpoint("events")?;
        let mut request = self.http.get(url);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }
        let response = request.send().await?;
        let raw: RawEventBatch = map_response("events", response).await?;

        let events = raw
            .events
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<ClientEvent>(value) {
                Ok(event) => Some(event),
                Err(err) => {
                    warn!(error = %err, "skipping unrecognised driver event");
                    None
                }
            })
            .collect();
        Ok(EventBatch {
            events,
            cursor: raw.cursor.or(cursor),
        })
    }

    /// Forwards driver events onto `events` until the receiving side goes away.
    pub fn spawn_event_pump(self: Arc<Self>, events: EventSender) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut cursor = None;
            let mut failures = 0u32;
            loop {
                if events.is_closed() {
                    debug!("event receiver dropped; stopping driver event pump");
                    return;
                }
                match self.poll_events(cursor).await {
                    Ok(batch) => {
                        failures = 0;
                        cursor = batch.cursor;
                        if batch.events.is_empty() {
                            tokio::time::sleep(IDLE_POLL_DELAY).await;
                            continue;
                        }
                        for event in batch.events {
                            if events.send(event).await.is_err() {
                                debug!("event receiver dropped; stopping driver event pump");
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, failures, "failed to poll driver events");
                        backoff::sleep(failures).await;
                        failures = failures.saturating_add(1);
                    }
                }
            }
        })
    }

    async fn post_empty(&self, endpoint: &'static str) -> Result<(), ClientError> {
        let url = self.endpoint(endpoint)?;
        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        expect_success(endpoint, response).await
    }
}

#[async_trait]
impl MessagingClient for DriverClient {
    async fn initialize(&self) -> Result<(), ClientError> {
        self.post_empty("session/initialize").await
    }

    async fn destroy(&self) -> Result<(), ClientError> {
        self.post_empty("session/destroy").await
    }

    async fn send_message(
        &self,
        chat_id: &str,
        content: MessageContent,
        options: SendOptions,
    ) -> Result<SentMessage, ClientError> {
        debug!(chat_id, kind = content.kind(), "sending message through driver");
        let url = self.endpoint("messages")?;
        let response = self
            .http
            .post(url)
            .json(&SendRequest {
                chat_id,
                content: &content,
                options: &options,
            })
            .send()
            .await?;
        map_response("messages", response).await
    }

    async fn get_chats(&self) -> Result<Vec<Chat>, ClientError> {
        let response = self.http.get(self.endpoint("chats")?).send().await?;
        map_response("chats", response).await
    }

    async fn get_contacts(&self) -> Result<Vec<Contact>, ClientError> {
        let response = self.http.get(self.endpoint("contacts")?).send().await?;
        map_response("contacts", response).await
    }

    async fn get_contact_by_id(&self, contact_id: &str) -> Result<Contact, ClientError> {
        let mut url = self.endpoint("contacts")?;
        url.path_segments_mut()
            .map_err(|_| ClientError::Config("driver url cannot carry a path".into()))?
            .push(contact_id);
        let response = self.http.get(url).send().await?;
        map_response("contacts.get", response).await
    }
}

async fn map_response<T>(endpoint: &'static str, response: Response) -> Result<T, ClientError>
where
    T: DeserializeOwned,
{
    let response = check_status(endpoint, response).await?;
    response
        .json::<T>()
        .await
        .map_err(|err| ClientError::Decode(format!("{endpoint}: {err}")))
}

async fn expect_success(endpoint: &'static str, response: Response) -> Result<(), ClientError> {
    check_status(endpoint, response).await.map(|_| ())
}

async fn check_status(endpoint: &'static str, response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable>".into());
    debug!(endpoint, %status, "driver request failed");
    Err(ClientError::Remote {
        status,
        message: remote_message(&body),
    })
}

/// Prefers the driver's `{"error": ...}` text, falling back to the raw body.
fn remote_message(body: &str) -> String {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .or_else(|| value.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string());
    message.chars().take(MAX_ERROR_BODY).collect()
}
