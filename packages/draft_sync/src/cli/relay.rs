use anyhow::{Context, Result};
use tracing::info;

use draft_sync::bus::SyncRelay;
use draft_sync::config::{FileConfig, RelayConfig};

/// Run the relay until Ctrl-C.
pub async fn relay_command(
    file: &FileConfig,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let mut relay_file = file.relay.clone();
    if let Some(host) = host {
        relay_file.host = host;
    }
    if let Some(port) = port {
        relay_file.port = port;
    }
    let config = RelayConfig::from_file(&relay_file)?;

    let relay = SyncRelay::start(config.bind_addr).await?;
    info!("Relay ready at {} (Ctrl-C to stop)", relay.url());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!(clients = relay.connected_clients(), "Received shutdown signal");
    relay.shutdown().await;
    Ok(())
}
