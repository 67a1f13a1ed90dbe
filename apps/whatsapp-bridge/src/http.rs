use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use metrics::counter;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{Instrument, error};
use wab_client::{
    Chat, ClientError, Contact, MessageContent, SendOptions, SharedClient, chat_id,
};

use crate::lifecycle::LifecycleState;

#[derive(Clone)]
pub struct BridgeState {
    pub client: SharedClient,
    pub lifecycle: watch::Receiver<LifecycleState>,
}

impl BridgeState {
    pub fn new(client: SharedClient, lifecycle: watch::Receiver<LifecycleState>) -> Self {
        Self { client, lifecycle }
    }

    async fn deliver(
        &self,
        phone_number: &str,
        content: MessageContent,
        options: SendOptions,
        sent: &'static str,
        failed: &'static str,
    ) -> Result<Json<Ack>, BridgeError> {
        let chat_id = chat_id(phone_number);
        let kind = content.kind();
        self.client
            .send_message(&chat_id, content, options)
            .instrument(tracing::info_span!("send", chat_id = %chat_id, kind))
            .await
            .map(|_| Json(Ack { message: sent }))
            .map_err(|source| BridgeError::client(failed, source))
    }
}

#[derive(Debug, Serialize)]
pub struct Ack {
    pub message: &'static str,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{context}: {source}")]
    Client {
        context: &'static str,
        #[source]
        source: ClientError,
    },
}

impl BridgeError {
    fn client(context: &'static str, source: ClientError) -> Self {
        error!(error = %source, "{context}");
        BridgeError::Client { context, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            BridgeError::BadRequest(_) => StatusCode::BAD_REQUEST,
            BridgeError::Client { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for BridgeError {
    fn from(rejection: JsonRejection) -> Self {
        BridgeError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            BridgeError::BadRequest(message) => json!({ "message": message }),
            BridgeError::Client { context, source } => json!({
                "message": context,
                "error": source.to_string(),
            }),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMediaRequest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendDocumentRequest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendContactRequest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub contact_name: Option<String>,
}

/// Accepts phone numbers sent as JSON numbers as well as strings.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(Value::Number(value)) => Ok(Some(value.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {other}"
        ))),
    }
}

/// A required field counts as present only when it is non-empty.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn record<T>(endpoint: &'static str, result: &Result<T, BridgeError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(BridgeError::BadRequest(_)) => "bad_request",
        Err(BridgeError::Client { .. }) => "client_error",
    };
    counter!("bridge_requests_total", "endpoint" => endpoint, "outcome" => outcome).increment(1);
}

pub fn build_router(state: Arc<BridgeState>) -> Router {
    Router::new()
        .route("/send-message", post(send_message))
        .route("/send-media", post(send_media))
        .route("/send-document", post(send_document))
        .route("/send-contact", post(send_contact))
        .route("/get-chats", get(get_chats))
        .route("/get-contact-info/{phone_number}", get(get_contact_info))
        .route("/get-contacts", get(get_contacts))
        .route("/healthz", get(healthz))
        .layer(Extension(state))
}

async fn send_message(
    Extension(state): Extension<Arc<BridgeState>>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<Ack>, BridgeError> {
    let result: Result<Json<Ack>, BridgeError> = async {
        let Json(req) = payload?;
        let (Some(phone), Some(message)) = (present(req.phone_number), present(req.message))
        else {
            return Err(BridgeError::BadRequest(
                "Phone number and message are required".into(),
            ));
        };
        state
            .deliver(
                &phone,
                MessageContent::text(message),
                SendOptions::default(),
                "Message sent successfully!",
                "Failed to send message",
            )
            .await
    }
    .await;
    record("send-message", &result);
    result
}

async fn send_media(
    Extension(state): Extension<Arc<BridgeState>>,
    payload: Result<Json<SendMediaRequest>, JsonRejection>,
) -> Result<Json<Ack>, BridgeError> {
    let result: Result<Json<Ack>, BridgeError> = async {
        let Json(req) = payload?;
        let (Some(phone), Some(media_url)) = (present(req.phone_number), present(req.media_url))
        else {
            return Err(BridgeError::BadRequest(
                "Phone number and media URL are required".into(),
            ));
        };
        state
            .deliver(
                &phone,
                MessageContent::media(media_url),
                SendOptions::with_caption(req.caption),
                "Media sent successfully!",
                "Failed to send media",
            )
            .await
    }
    .await;
    record("send-media", &result);
    result
}

async fn send_document(
    Extension(state): Extension<Arc<BridgeState>>,
    payload: Result<Json<SendDocumentRequest>, JsonRejection>,
) -> Result<Json<Ack>, BridgeError> {
    let result: Result<Json<Ack>, BridgeError> = async {
        let Json(req) = payload?;
        let (Some(phone), Some(file_url)) = (present(req.phone_number), present(req.file_url))
        else {
            return Err(BridgeError::BadRequest(
                "Phone number and file URL are required".into(),
            ));
        };
        state
            .deliver(
                &phone,
                MessageContent::document(file_url, req.file_name.clone()),
                SendOptions::with_caption(req.file_name),
                "Document sent successfully!",
                "Failed to send document",
            )
            .await
    }
    .await;
    record("send-document", &result);
    result
}

async fn send_contact(
    Extension(state): Extension<Arc<BridgeState>>,
    payload: Result<Json<SendContactRequest>, JsonRejection>,
) -> Result<Json<Ack>, BridgeError> {
    let result: Result<Json<Ack>, BridgeError> = async {
        let Json(req) = payload?;
        let (Some(phone), Some(contact_phone), Some(contact_name)) = (
            present(req.phone_number),
            present(req.contact_phone),
            present(req.contact_name),
        ) else {
            return Err(BridgeError::BadRequest(
                "Phone number, contact phone, and contact name are required".into(),
            ));
        };
        state
            .deliver(
                &phone,
                MessageContent::contact_card(contact_phone, contact_name),
                SendOptions::default(),
                "Contact sent successfully!",
                "Failed to send contact",
            )
            .await
    }
    .await;
    record("send-contact", &result);
    result
}

async fn get_chats(
    Extension(state): Extension<Arc<BridgeState>>,
) -> Result<Json<Vec<Chat>>, BridgeError> {
    let result = state
        .client
        .get_chats()
        .await
        .map(Json)
        .map_err(|source| BridgeError::client("Failed to get chats", source));
    record("get-chats", &result);
    result
}

async fn get_contact_info(
    Extension(state): Extension<Arc<BridgeState>>,
    Path(phone_number): Path<String>,
) -> Result<Json<Contact>, BridgeError> {
    let result: Result<Json<Contact>, BridgeError> = async {
        if phone_number.is_empty() {
            return Err(BridgeError::BadRequest("Phone number is required".into()));
        }
        state
            .client
            .get_contact_by_id(&chat_id(&phone_number))
            .await
            .map(Json)
            .map_err(|source| BridgeError::client("Failed to get contact info", source))
    }
    .await;
    record("get-contact-info", &result);
    result
}

async fn get_contacts(
    Extension(state): Extension<Arc<BridgeState>>,
) -> Result<Json<Vec<Contact>>, BridgeError> {
    let result = state
        .client
        .get_contacts()
        .await
        .map(Json)
        .map_err(|source| BridgeError::client("Failed to get contacts", source));
    record("get-contacts", &result);
    result
}

async fn healthz(Extension(state): Extension<Arc<BridgeState>>) -> Json<Value> {
    let status = *state.lifecycle.borrow();
    Json(json!({ "status": status.as_str() }))
}
