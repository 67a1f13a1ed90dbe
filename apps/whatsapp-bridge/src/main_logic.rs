use std::sync::Arc;

use anyhow::Result;
use axum::serve;
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::info;
use wab_client::{DriverClient, EventSender, InMemoryClient, SharedClient, event_channel};
use wab_session::SessionCleaner;

use crate::config::{BridgeConfig, DriverKind};
use crate::http::{BridgeState, build_router};
use crate::lifecycle::LifecycleManager;
use crate::qr::TerminalQr;
use crate::relay::WebhookRelay;

/// Starts the client lifecycle and serves the HTTP API until ctrl-c.
pub async fn run(config: BridgeConfig) -> Result<()> {
    let (events_tx, events_rx) = event_channel();
    let (client, pump) = connect_client(&config, events_tx)?;

    let cleaner = SessionCleaner::new(config.session_dir.clone()).with_retries(config.cleanup_retries);
    let mut manager = LifecycleManager::new(client.clone(), cleaner, Arc::new(TerminalQr));
    if let Some(url) = &config.message_webhook {
        info!(url = %url, "relaying inbound messages to webhook");
        let relay = WebhookRelay::new(url.clone(), config.message_webhook_timeout)?;
        manager = manager
            .with_relay(Arc::new(relay))
            .with_relay_timeout(config.message_webhook_timeout * 2);
    }

    let state = Arc::new(BridgeState::new(client, manager.subscribe()));
    let router = build_router(state);

    let listener = TcpListener::bind(config.addr).await?;
    info!("whatsapp-bridge listening on http://{}", config.addr);
    let lifecycle = tokio::spawn(manager.run(events_rx));

    let served = serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await;

    info!("shutting down");
    lifecycle.abort();
    if let Some(pump) = pump {
        pump.abort();
    }
    served?;
    Ok(())
}

fn connect_client(
    config: &BridgeConfig,
    events: EventSender,
) -> Result<(SharedClient, Option<JoinHandle<()>>)> {
    match config.driver {
        DriverKind::Http => {
            let driver = Arc::new(DriverClient::new(&config.driver_config)?);
            info!(url = %driver.base_url(), "using WhatsApp Web driver");
            let pump = driver.clone().spawn_event_pump(events);
            let client: SharedClient = driver;
            Ok((client, Some(pump)))
        }
        DriverKind::Memory => {
            info!("using in-memory client; nothing is sent to WhatsApp");
            let client: SharedClient = Arc::new(InMemoryClient::new(events));
            Ok((client, None))
        }
    }
}
