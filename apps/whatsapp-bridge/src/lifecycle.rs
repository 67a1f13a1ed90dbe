//! Client lifecycle: one task consumes client events and drives pairing,
//! logout cleanup and reconnection.
//!
//! ```text
//! Initializing ──qr──► AwaitingAuth ──ready──► Ready
//!       ▲                                        │
//!       └──────── re-initialize ◄── Disconnected ◄┘
//! ```
//!
//! A `LOGOUT` disconnect tears the client down, wipes the session folder and
//! only then re-initializes, so a fresh QR pairing never contends with the
//! cleanup for the folder. Any other reason re-initializes on the existing
//! session. Nothing in here returns an error: failures are logged and the
//! manager keeps going.

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};
use wab_client::{ClientEvent, DisconnectReason, EventReceiver, IncomingMessage, SharedClient};
use wab_session::SessionCleaner;

use crate::qr::SharedQrRenderer;
use crate::relay::SharedRelay;

/// Upper bound on one relay delivery; later events wait behind it.
pub const DEFAULT_RELAY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Initializing,
    AwaitingAuth,
    Ready,
    Disconnected,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Initializing => "initializing",
            LifecycleState::AwaitingAuth => "awaiting_auth",
            LifecycleState::Ready => "ready",
            LifecycleState::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct LifecycleManager {
    client: SharedClient,
    cleaner: SessionCleaner,
    qr: SharedQrRenderer,
    relay: Option<SharedRelay>,
    relay_timeout: Duration,
    state: watch::Sender<LifecycleState>,
}

impl LifecycleManager {
    pub fn new(client: SharedClient, cleaner: SessionCleaner, qr: SharedQrRenderer) -> Self {
        let (state, _) = watch::channel(LifecycleState::Initializing);
        Self {
            client,
            cleaner,
            qr,
            relay: None,
            relay_timeout: DEFAULT_RELAY_TIMEOUT,
            state,
        }
    }

    pub fn with_relay(mut self, relay: SharedRelay) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn with_relay_timeout(mut self, timeout: Duration) -> Self {
        self.relay_timeout = timeout;
        self
    }

    /// Observes state transitions; the HTTP layer reports it on `/healthz`.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Initializes the client, then handles events until the channel closes.
    pub async fn run(self, mut events: EventReceiver) {
        self.initialize().await;
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        info!("client event stream closed; lifecycle manager stopping");
    }

    pub async fn handle(&self, event: ClientEvent) {
        match event {
            ClientEvent::Qr { code } => {
                self.qr.render(&code);
                self.transition(LifecycleState::AwaitingAuth);
            }
            ClientEvent::Ready => {
                info!("WhatsApp client is ready");
                self.transition(LifecycleState::Ready);
            }
            ClientEvent::Disconnected { reason } => self.on_disconnected(reason).await,
            ClientEvent::Message(message) => self.on_message(message).await,
        }
    }

    pub async fn initialize(&self) {
        self.transition(LifecycleState::Initializing);
        if let Err(err) = self.client.initialize().await {
            error!(error = %err, "failed to initialize WhatsApp client");
            self.transition(LifecycleState::Disconnected);
        }
    }

    async fn on_disconnected(&self, reason: DisconnectReason) {
        info!(%reason, "client disconnected");
        self.transition(LifecycleState::Disconnected);

        if reason.is_logout() {
            info!("client logged out; a new QR pairing will be required");
            match self.client.destroy().await {
                Ok(()) => {
                    info!("client terminated");
                    // the cleaner logs its own outcome
                    let _ = self.cleaner.clear().await;
                }
                Err(err) => {
                    error!(error = %err, "failed to terminate client; keeping session folder");
                }
            }
        }

        self.initialize().await;
    }

    async fn on_message(&self, message: IncomingMessage) {
        info!(from = %message.from, id = %message.id, body = %message.body, "received message");
        let Some(relay) = &self.relay else {
            return;
        };
        match tokio::time::timeout(self.relay_timeout, relay.relay(&message)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(error = %err, id = %message.id, "failed to relay inbound message");
            }
            Err(_) => {
                warn!(
                    id = %message.id,
                    timeout_ms = self.relay_timeout.as_millis() as u64,
                    "relaying inbound message timed out"
                );
            }
        }
    }

    fn transition(&self, next: LifecycleState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!(from = %previous, to = %next, "client lifecycle transition");
        }
    }
}
