//! The messaging-client seam of the bridge.
//!
//! Everything protocol-shaped (pairing, encryption, session encoding,
//! reconnecting a live socket) lives behind [`MessagingClient`]. The bridge
//! only calls its operations and consumes the [`ClientEvent`]s it emits on an
//! [`EventSender`].
//!
//! ```text
//! HTTP handler ──► MessagingClient ──► driver / in-memory
//!                        │
//!                        └── ClientEvent ──► lifecycle task
//! ```

mod backoff;
pub mod driver;
mod error;
pub mod memory;
mod types;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use driver::{DriverClient, DriverConfig};
pub use error::ClientError;
pub use memory::{ClientCall, InMemoryClient};
pub use types::{
    Chat, ClientEvent, Contact, DisconnectReason, IncomingMessage, MessageContent, SendOptions,
    SentMessage,
};

/// Suffix WhatsApp uses for one-to-one chat addresses.
pub const CHAT_ID_SUFFIX: &str = "@c.us";

/// Default capacity of the client event channel.
pub const EVENT_BUFFER: usize = 64;

pub type EventSender = mpsc::Sender<ClientEvent>;
pub type EventReceiver = mpsc::Receiver<ClientEvent>;

/// Shared handle to the single client instance of the process.
pub type SharedClient = Arc<dyn MessagingClient>;

/// Creates the channel a client publishes its lifecycle events on.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_BUFFER)
}

/// Builds the chat address for a phone number.
pub fn chat_id(phone_number: &str) -> String {
    format!("{phone_number}{CHAT_ID_SUFFIX}")
}

#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Starts (or restarts) the session. Pairing progress is reported through events.
    async fn initialize(&self) -> Result<(), ClientError>;
    /// Tears the session down and releases any locks on the session folder.
    async fn destroy(&self) -> Result<(), ClientError>;
    async fn send_message(
        &self,
        chat_id: &str,
        content: MessageContent,
        options: SendOptions,
    ) -> Result<SentMessage, ClientError>;
    async fn get_chats(&self) -> Result<Vec<Chat>, ClientError>;
    async fn get_contacts(&self) -> Result<Vec<Contact>, ClientError>;
    async fn get_contact_by_id(&self, contact_id: &str) -> Result<Contact, ClientError>;
}
