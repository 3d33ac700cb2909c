use anyhow::Result;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use draft_sync::catalog::UnitCatalog;
use draft_sync::config::{DraftSyncConfig, FileConfig};
use draft_sync::engine::{DraftEngine, EngineOptions};
use draft_sync::persistence::SnapshotStore;

use super::{engine_options, log_event};

async fn overlay_options(config: &DraftSyncConfig, file: &FileConfig) -> Result<EngineOptions> {
    let mut options = engine_options(config, file, UnitCatalog::default()).await?;
    options.snapshot = Some(SnapshotStore::new(
        config.resolve(&file.data.overlay_snapshot),
    ));
    // An overlay only answers while it holds state.
    options.authoritative = false;
    Ok(options)
}

/// Join the bus as an overlay window. There is no poller: state comes from
/// the overlay's own snapshot file, then REQUEST_SYNC and live updates.
pub async fn watch_command(config: &DraftSyncConfig, file: &FileConfig) -> Result<()> {
    let options = overlay_options(config, file).await?;
    let engine = DraftEngine::create(options).await;
    let mut events = engine.subscribe();
    let mut status = engine.watch_bus_status();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                if current.is_in_sync() {
                    info!("In sync");
                } else {
                    warn!(status = ?current, "Out of sync");
                }
            }
            event = events.recv() => match event {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(n)) => warn!("Missed {} state events", n),
                Err(RecvError::Closed) => break,
            },
        }
    }

    engine.dispose().await;
    Ok(())
}
