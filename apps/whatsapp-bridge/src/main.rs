use anyhow::Result;
use wab_bridge::{config::BridgeConfig, run};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    wab_telemetry::install("whatsapp-bridge")?;

    let config = BridgeConfig::from_env()?;
    let result = run(config).await;
    wab_telemetry::shutdown();
    result
}
