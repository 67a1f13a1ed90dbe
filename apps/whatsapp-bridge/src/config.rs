use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use wab_client::DriverConfig;
use wab_client::driver::{DEFAULT_DRIVER_TIMEOUT, DEFAULT_DRIVER_URL};

use crate::relay::DEFAULT_WEBHOOK_TIMEOUT;

pub const DEFAULT_PORT: u16 = 5023;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_SESSION_DIR: &str = "./wwebjs_auth/session";

/// Which client implementation backs the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    /// Out-of-process WhatsApp Web driver reached over HTTP.
    Http,
    /// In-process fake, for local development without a phone.
    Memory,
}

impl FromStr for DriverKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" | "driver" => Ok(DriverKind::Http),
            "memory" | "mem" => Ok(DriverKind::Memory),
            other => bail!("unknown BRIDGE_DRIVER `{other}` (expected `http` or `memory`)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub addr: SocketAddr,
    pub session_dir: PathBuf,
    pub cleanup_retries: u32,
    pub driver: DriverKind,
    pub driver_config: DriverConfig,
    pub message_webhook: Option<String>,
    pub message_webhook_timeout: Duration,
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind = var("BRIDGE_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let ip = IpAddr::from_str(&bind).with_context(|| format!("invalid BRIDGE_BIND `{bind}`"))?;
        let port = match var("BRIDGE_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("invalid BRIDGE_PORT `{raw}`"))?,
            None => DEFAULT_PORT,
        };
        let session_dir =
            PathBuf::from(var("BRIDGE_SESSION_DIR").unwrap_or_else(|| DEFAULT_SESSION_DIR.into()));
        let cleanup_retries = match var("BRIDGE_CLEANUP_RETRIES") {
            Some(raw) => raw
                .parse::<u32>()
                .with_context(|| format!("invalid BRIDGE_CLEANUP_RETRIES `{raw}`"))?,
            None => wab_session::DEFAULT_RETRIES,
        };
        let driver = match var("BRIDGE_DRIVER") {
            Some(raw) => raw.parse()?,
            None => DriverKind::Http,
        };
        let timeout = match var("WA_DRIVER_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(
                raw.parse::<u64>()
                    .with_context(|| format!("invalid WA_DRIVER_TIMEOUT_SECS `{raw}`"))?,
            ),
            None => DEFAULT_DRIVER_TIMEOUT,
        };
        let message_webhook_timeout = match var("MESSAGE_WEBHOOK_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(
                raw.parse::<u64>()
                    .with_context(|| format!("invalid MESSAGE_WEBHOOK_TIMEOUT_SECS `{raw}`"))?,
            ),
            None => DEFAULT_WEBHOOK_TIMEOUT,
        };
        let driver_config = DriverConfig {
            base_url: var("WA_DRIVER_URL").unwrap_or_else(|| DEFAULT_DRIVER_URL.to_string()),
            timeout,
        };

        Ok(Self {
            addr: SocketAddr::new(ip, port),
            session_dir,
            cleanup_retries,
            driver,
            driver_config,
            message_webhook: var("MESSAGE_WEBHOOK_URL"),
            message_webhook_timeout,
        })
    }
}
