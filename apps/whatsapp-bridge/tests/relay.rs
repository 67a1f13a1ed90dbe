use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{Json, Router, http::StatusCode, routing::post};
use serde_json::{Value, json};
use tokio::{net::TcpListener, sync::Mutex};
use wab_bridge::relay::{MessageRelay, RelayError, WebhookRelay};
use wab_client::IncomingMessage;

async fn spawn_webhook(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/hook")
}

fn message() -> IncomingMessage {
    IncomingMessage {
        id: "false_15551234567@c.us_3EB0".into(),
        from: "15551234567@c.us".into(),
        body: "hello bridge".into(),
        timestamp: Some(1_700_000_000),
        has_media: false,
    }
}

#[tokio::test]
async fn posts_message_event_envelope() {
    let captured: Arc<Mutex<Vec<Value>>> = Arc::default();
    let sink = captured.clone();
    let router = Router::new().route(
        "/hook",
        post(move |Json(body): Json<Value>| {
            let sink = sink.clone();
            async move {
                sink.lock().await.push(body);
                StatusCode::NO_CONTENT
            }
        }),
    );
    let relay = WebhookRelay::new(spawn_webhook(router).await, Duration::from_secs(5)).unwrap();

    relay.relay(&message()).await.expect("relay succeeds");

    let bodies = captured.lock().await;
    assert_eq!(
        bodies[..],
        [json!({
            "event": "message",
            "message": {
                "id": "false_15551234567@c.us_3EB0",
                "from": "15551234567@c.us",
                "body": "hello bridge",
                "timestamp": 1_700_000_000,
                "hasMedia": false
            }
        })]
    );
}

#[tokio::test]
async fn non_success_status_is_reported() {
    let router = Router::new().route("/hook", post(|| async { StatusCode::BAD_GATEWAY }));
    let relay = WebhookRelay::new(spawn_webhook(router).await, Duration::from_secs(5)).unwrap();

    let err = relay.relay(&message()).await.unwrap_err();

    assert!(matches!(err, RelayError::Status(StatusCode::BAD_GATEWAY)));
}

#[tokio::test]
async fn unresponsive_webhook_times_out() {
    let router = Router::new().route(
        "/hook",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            StatusCode::OK
        }),
    );
    let relay =
        WebhookRelay::new(spawn_webhook(router).await, Duration::from_millis(200)).unwrap();

    let started = Instant::now();
    let err = relay.relay(&message()).await.unwrap_err();

    assert!(matches!(&err, RelayError::Transport(inner) if inner.is_timeout()));
    assert!(started.elapsed() < Duration::from_secs(5));
}
