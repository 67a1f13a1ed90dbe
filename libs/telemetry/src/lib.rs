//! Tracing setup shared by the bridge binaries.
//!
//! Logs go to stdout through `tracing-subscriber` (text by default, JSON with
//! `LOG_FORMAT=json`), filtered by `RUST_LOG`. Spans are additionally exported
//! over OTLP when `ENABLE_OTEL` is set and an endpoint is configured.

use anyhow::Result;

mod config;
mod tracing_init;

pub use config::{TelemetryConfig, TelemetryProtocol};
pub use tracing_init::{init_telemetry, shutdown};

/// Installs the subscriber for `service_name`, configured from the environment.
pub fn install(service_name: &str) -> Result<()> {
    init_telemetry(TelemetryConfig::from_env(
        service_name,
        env!("CARGO_PKG_VERSION"),
    ))
}
