//! In-memory client used by tests and the `memory` driver mode.
//!
//! Records every call, serves canned chats and contacts, and can be told to
//! reject operations. `initialize` reports `Ready` (or a QR code, when one is
//! configured) on the event channel like a real client would.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    Chat, ClientError, ClientEvent, Contact, EventSender, MessageContent, MessagingClient,
    SendOptions, SentMessage,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ClientCall {
    Initialize,
    Destroy,
    SendMessage {
        chat_id: String,
        content: MessageContent,
        options: SendOptions,
    },
    GetChats,
    GetContacts,
    GetContactById(String),
}

#[derive(Default)]
struct MemoryState {
    calls: Vec<ClientCall>,
    chats: Vec<Chat>,
    contacts: Vec<Contact>,
    pairing_code: Option<String>,
    request_failure: Option<String>,
    destroy_failure: Option<String>,
    sent: u64,
}

#[derive(Clone)]
pub struct InMemoryClient {
    events: EventSender,
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryClient {
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    pub async fn with_chats(self, chats: Vec<Chat>) -> Self {
        self.state.lock().await.chats = chats;
        self
    }

    pub async fn with_contacts(self, contacts: Vec<Contact>) -> Self {
        self.state.lock().await.contacts = contacts;
        self
    }

    /// Makes `initialize` report a QR code instead of `Ready`.
    pub async fn with_pairing_code(self, code: impl Into<String>) -> Self {
        self.state.lock().await.pairing_code = Some(code.into());
        self
    }

    /// Rejects every send and lookup with `message` until cleared.
    pub async fn fail_requests(&self, message: Option<String>) {
        self.state.lock().await.request_failure = message;
    }

    /// Rejects `destroy` with `message` until cleared.
    pub async fn fail_destroy(&self, message: Option<String>) {
        self.state.lock().await.destroy_failure = message;
    }

    pub async fn calls(&self) -> Vec<ClientCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn take_calls(&self) -> Vec<ClientCall> {
        std::mem::take(&mut self.state.lock().await.calls)
    }

    /// Pushes an event as if the remote side had produced it.
    pub async fn emit(&self, event: ClientEvent) {
        if self.events.send(event).await.is_err() {
            warn!("client event receiver dropped");
        }
    }

    async fn record(&self, call: ClientCall) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        state.calls.push(call);
        match &state.request_failure {
            Some(message) => Err(ClientError::rejected(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MessagingClient for InMemoryClient {
    async fn initialize(&self) -> Result<(), ClientError> {
        let event = {
            let mut state = self.state.lock().await;
            state.calls.push(ClientCall::Initialize);
            match &state.pairing_code {
                Some(code) => ClientEvent::Qr { code: code.clone() },
                None => ClientEvent::Ready,
            }
        };
        // never block the caller, which may be the task draining this channel
        if let Err(err) = self.events.try_send(event) {
            warn!(error = %err, "dropping in-memory client event");
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        state.calls.push(ClientCall::Destroy);
        match &state.destroy_failure {
            Some(message) => Err(ClientError::rejected(message.clone())),
            None => Ok(()),
        }
    }

    async fn send_message(
        &self,
        chat_id: &str,
        content: MessageContent,
        options: SendOptions,
    ) -> Result<SentMessage, ClientError> {
        info!(chat_id, kind = content.kind(), "in-memory client accepted message");
        self.record(ClientCall::SendMessage {
            chat_id: chat_id.to_string(),
            content,
            options,
        })
        .await?;
        let mut state = self.state.lock().await;
        state.sent += 1;
        Ok(SentMessage {
            id: Some(format!("mem-{}", state.sent)),
            timestamp: None,
        })
    }

    async fn get_chats(&self) -> Result<Vec<Chat>, ClientError> {
        self.record(ClientCall::GetChats).await?;
        Ok(self.state.lock().await.chats.clone())
    }

    async fn get_contacts(&self) -> Result<Vec<Contact>, ClientError> {
        self.record(ClientCall::GetContacts).await?;
        Ok(self.state.lock().await.contacts.clone())
    }

    async fn get_contact_by_id(&self, contact_id: &str) -> Result<Contact, ClientError> {
        self.record(ClientCall::GetContactById(contact_id.to_string()))
            .await?;
        self.state
            .lock()
            .await
            .contacts
            .iter()
            .find(|contact| contact.id == contact_id)
            .cloned()
            .ok_or_else(|| ClientError::rejected(format!("contact {contact_id} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_channel;

    #[tokio::test]
    async fn initialize_reports_ready_without_pairing_code() {
        let (tx, mut rx) = event_channel();
        let client = InMemoryClient::new(tx);

        client.initialize().await.unwrap();

        assert_eq!(rx.recv().await, Some(ClientEvent::Ready));
        assert_eq!(client.calls().await, vec![ClientCall::Initialize]);
    }

    #[tokio::test]
    async fn initialize_reports_qr_when_pairing_required() {
        let (tx, mut rx) = event_channel();
        let client = InMemoryClient::new(tx).with_pairing_code("2@pair").await;

        client.initialize().await.unwrap();

        assert_eq!(
            rx.recv().await,
            Some(ClientEvent::Qr {
                code: "2@pair".into()
            })
        );
    }

    #[tokio::test]
    async fn injected_failure_rejects_but_still_records() {
        let (tx, _rx) = event_channel();
        let client = InMemoryClient::new(tx);
        client.fail_requests(Some("socket closed".into())).await;

        let err = client.get_chats().await.unwrap_err();

        assert_eq!(err.to_string(), "socket closed");
        assert_eq!(client.take_calls().await, vec![ClientCall::GetChats]);
        assert!(client.calls().await.is_empty());
    }
}
