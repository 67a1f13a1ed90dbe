use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{Router, http::StatusCode, routing::post};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tracing_test::traced_test;
use wab_bridge::lifecycle::{LifecycleManager, LifecycleState};
use wab_bridge::qr::QrRenderer;
use wab_bridge::relay::{MessageRelay, RelayError, WebhookRelay};
use wab_client::{
    Chat, ClientCall, ClientError, ClientEvent, Contact, DisconnectReason, EventReceiver,
    InMemoryClient, IncomingMessage, MessageContent, MessagingClient, SendOptions, SentMessage,
    event_channel,
};
use wab_session::SessionCleaner;

#[derive(Default)]
struct RecordingQr {
    codes: Mutex<Vec<String>>,
}

impl QrRenderer for RecordingQr {
    fn render(&self, code: &str) {
        self.codes.lock().unwrap().push(code.to_string());
    }
}

#[derive(Default)]
struct RecordingRelay {
    relayed: Mutex<Vec<IncomingMessage>>,
}

#[async_trait]
impl MessageRelay for RecordingRelay {
    async fn relay(&self, message: &IncomingMessage) -> Result<(), RelayError> {
        self.relayed.lock().unwrap().push(message.clone());
        Ok(())
    }
}

struct Fixture {
    _dir: TempDir,
    session: std::path::PathBuf,
    client: Arc<InMemoryClient>,
    qr: Arc<RecordingQr>,
    manager: LifecycleManager,
    events: EventReceiver,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let session = dir.path().join("session");
    std::fs::create_dir_all(session.join("Default")).unwrap();
    std::fs::write(session.join("Default").join("Cookies"), b"opaque").unwrap();

    let (tx, events) = event_channel();
    let client = Arc::new(InMemoryClient::new(tx));
    let qr = Arc::new(RecordingQr::default());
    let cleaner = SessionCleaner::new(&session).with_backoff(Duration::from_millis(1));
    let manager = LifecycleManager::new(client.clone(), cleaner, qr.clone());
    Fixture {
        _dir: dir,
        session,
        client,
        qr,
        manager,
        events,
    }
}

fn disconnected(reason: &str) -> ClientEvent {
    ClientEvent::Disconnected {
        reason: DisconnectReason::from(reason.to_string()),
    }
}

#[tokio::test]
async fn logout_destroys_client_wipes_session_then_reinitializes() {
    let f = fixture();

    f.manager.handle(disconnected("LOGOUT")).await;

    assert!(!f.session.exists());
    assert_eq!(
        f.client.calls().await,
        vec![ClientCall::Destroy, ClientCall::Initialize]
    );
    assert_eq!(f.manager.current(), LifecycleState::Initializing);
}

#[tokio::test]
async fn other_disconnects_keep_the_session() {
    let f = fixture();

    f.manager.handle(disconnected("NAVIGATION")).await;

    assert!(f.session.join("Default").join("Cookies").exists());
    assert_eq!(f.client.calls().await, vec![ClientCall::Initialize]);
}

#[tokio::test]
async fn logout_match_is_exact() {
    let f = fixture();

    f.manager.handle(disconnected("logout")).await;

    assert!(f.session.exists());
    assert_eq!(f.client.calls().await, vec![ClientCall::Initialize]);
}

#[tokio::test]
#[traced_test]
async fn failed_destroy_keeps_session_but_still_reinitializes() {
    let f = fixture();
    f.client.fail_destroy(Some("browser crashed".into())).await;

    f.manager.handle(disconnected("LOGOUT")).await;

    assert!(f.session.exists());
    assert_eq!(
        f.client.calls().await,
        vec![ClientCall::Destroy, ClientCall::Initialize]
    );
    assert!(logs_contain("failed to terminate client"));
}

#[tokio::test]
async fn logout_with_missing_session_folder_still_reinitializes() {
    let f = fixture();
    std::fs::remove_dir_all(&f.session).unwrap();

    f.manager.handle(disconnected("LOGOUT")).await;

    assert_eq!(
        f.client.calls().await,
        vec![ClientCall::Destroy, ClientCall::Initialize]
    );
}

#[tokio::test]
async fn qr_is_rendered_and_awaits_auth() {
    let f = fixture();

    f.manager
        .handle(ClientEvent::Qr {
            code: "2@pairing-code".into(),
        })
        .await;

    assert_eq!(*f.qr.codes.lock().unwrap(), vec!["2@pairing-code"]);
    assert_eq!(f.manager.current(), LifecycleState::AwaitingAuth);

    f.manager.handle(ClientEvent::Ready).await;
    assert_eq!(f.manager.current(), LifecycleState::Ready);
}

#[tokio::test]
async fn inbound_messages_are_relayed() {
    let f = fixture();
    let relay = Arc::new(RecordingRelay::default());
    let manager = f.manager.with_relay(relay.clone());
    let message = IncomingMessage {
        id: "ABCD".into(),
        from: "15551234567@c.us".into(),
        body: "hello".into(),
        timestamp: Some(1_700_000_000),
        has_media: false,
    };

    manager.handle(ClientEvent::Message(message.clone())).await;

    assert_eq!(*relay.relayed.lock().unwrap(), vec![message]);
    assert!(f.client.calls().await.is_empty());
}

#[tokio::test]
async fn run_initializes_then_follows_events() {
    let f = fixture();
    let mut state = f.manager.subscribe();

    let task = tokio::spawn(f.manager.run(f.events));

    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == LifecycleState::Ready),
    )
    .await
    .expect("client should become ready")
    .unwrap();
    assert_eq!(f.client.calls().await, vec![ClientCall::Initialize]);

    f.client.emit(disconnected("LOGOUT")).await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while f.session.exists() || f.client.calls().await.len() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("logout should be handled");
    assert_eq!(
        f.client.calls().await,
        vec![
            ClientCall::Initialize,
            ClientCall::Destroy,
            ClientCall::Initialize
        ]
    );

    task.abort();
}

/// Notes whether the session folder is still on disk each time `initialize` runs.
struct FolderCheckingClient {
    inner: InMemoryClient,
    session: std::path::PathBuf,
    folder_at_initialize: Mutex<Vec<bool>>,
}

#[async_trait]
impl MessagingClient for FolderCheckingClient {
    async fn initialize(&self) -> Result<(), ClientError> {
        self.folder_at_initialize
            .lock()
            .unwrap()
            .push(self.session.exists());
        self.inner.initialize().await
    }

    async fn destroy(&self) -> Result<(), ClientError> {
        self.inner.destroy().await
    }

    async fn send_message(
        &self,
        chat_id: &str,
        content: MessageContent,
        options: SendOptions,
    ) -> Result<SentMessage, ClientError> {
        self.inner.send_message(chat_id, content, options).await
    }

    async fn get_chats(&self) -> Result<Vec<Chat>, ClientError> {
        self.inner.get_chats().await
    }

    async fn get_contacts(&self) -> Result<Vec<Contact>, ClientError> {
        self.inner.get_contacts().await
    }

    async fn get_contact_by_id(&self, contact_id: &str) -> Result<Contact, ClientError> {
        self.inner.get_contact_by_id(contact_id).await
    }
}

#[tokio::test]
async fn session_is_gone_before_reinitialize_runs() {
    let f = fixture();
    let (tx, _events) = event_channel();
    let client = Arc::new(FolderCheckingClient {
        inner: InMemoryClient::new(tx),
        session: f.session.clone(),
        folder_at_initialize: Mutex::default(),
    });
    let cleaner = SessionCleaner::new(&f.session).with_backoff(Duration::from_millis(1));
    let manager = LifecycleManager::new(client.clone(), cleaner, f.qr.clone());

    manager.handle(disconnected("LOGOUT")).await;

    assert_eq!(*client.folder_at_initialize.lock().unwrap(), vec![false]);
    assert_eq!(
        client.inner.calls().await,
        vec![ClientCall::Destroy, ClientCall::Initialize]
    );
}

struct StalledRelay;

#[async_trait]
impl MessageRelay for StalledRelay {
    async fn relay(&self, _message: &IncomingMessage) -> Result<(), RelayError> {
        std::future::pending().await
    }
}

fn inbound() -> IncomingMessage {
    IncomingMessage {
        id: "ABCD".into(),
        from: "15551234567@c.us".into(),
        body: "hello".into(),
        timestamp: None,
        has_media: false,
    }
}

#[tokio::test]
async fn stalled_relay_does_not_block_reconnect() {
    let f = fixture();
    let manager = f
        .manager
        .with_relay(Arc::new(StalledRelay))
        .with_relay_timeout(Duration::from_millis(100));

    tokio::time::timeout(Duration::from_secs(5), async {
        manager.handle(ClientEvent::Message(inbound())).await;
        manager.handle(disconnected("NAVIGATION")).await;
    })
    .await
    .expect("events after a stalled relay should still be handled");

    assert_eq!(f.client.calls().await, vec![ClientCall::Initialize]);
}

#[tokio::test]
async fn unresponsive_webhook_does_not_block_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = Router::new().route(
        "/hook",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            StatusCode::OK
        }),
    );
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let f = fixture();
    let relay = WebhookRelay::new(format!("http://{addr}/hook"), Duration::from_millis(200)).unwrap();
    let manager = f.manager.with_relay(Arc::new(relay));
    let task = tokio::spawn(manager.run(f.events));

    f.client.emit(ClientEvent::Message(inbound())).await;
    f.client.emit(disconnected("NAVIGATION")).await;

    tokio::time::timeout(Duration::from_secs(5), async {
        while f.client.calls().await.len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("reconnect should follow the stalled webhook");
    assert_eq!(
        f.client.calls().await,
        vec![ClientCall::Initialize, ClientCall::Initialize]
    );

    task.abort();
}
