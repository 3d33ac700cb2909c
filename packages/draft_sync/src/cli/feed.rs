use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use draft_sync::catalog::UnitCatalog;
use draft_sync::config::{DraftSyncConfig, FileConfig};
use draft_sync::engine::DraftEngine;
use draft_sync::model::{AnalysisMode, Lane, RosterSnapshot, Side};
use draft_sync::persistence::SnapshotStore;

use super::{engine_options, log_event};

/// One line of stdin.
///
/// ```text
/// {"cmd":"snapshot","side":"ally","picks":[{"slotIndex":0,"unitId":86}],"localSlot":0}
/// {"cmd":"set_lane","side":"enemy","lane":"TOP","unit":"Garen"}
/// {"cmd":"analyze","mode":"draft","force":true}
/// {"cmd":"clear"}
/// ```
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum FeedCommand {
    Snapshot(RosterSnapshot),
    SetLane {
        side: Side,
        lane: Lane,
        #[serde(default)]
        unit: Option<String>,
    },
    Analyze {
        mode: AnalysisMode,
        #[serde(default)]
        force: bool,
    },
    Cancel {
        mode: AnalysisMode,
    },
    ClearAnalysis {
        mode: AnalysisMode,
    },
    Clear,
}

/// Act as the primary window until stdin closes or Ctrl-C.
pub async fn feed_command(
    config: &DraftSyncConfig,
    file: &FileConfig,
    analyze: Option<AnalysisMode>,
    authoritative: bool,
) -> Result<()> {
    let catalog_path = config.resolve(&file.data.catalog);
    let catalog = UnitCatalog::load(&catalog_path)
        .await
        .with_context(|| format!("Failed to load unit catalog {:?}", catalog_path))?;
    info!(units = catalog.len(), "Loaded unit catalog");

    let mut options = engine_options(config, file, catalog).await?;
    options.snapshot = Some(SnapshotStore::new(config.resolve(&file.data.snapshot)));
    options.authoritative |= authoritative;

    let engine = DraftEngine::create(options).await;
    let mut events = engine.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Received shutdown signal");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(n)) => warn!("Missed {} state events", n),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    info!("stdin closed");
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<FeedCommand>(line) {
                    Ok(command) => run_command(&engine, command, analyze).await,
                    Err(e) => warn!("Ignoring malformed command: {}", e),
                }
            }
        }
    }

    engine.dispose().await;
    Ok(())
}

async fn run_command(engine: &DraftEngine, command: FeedCommand, analyze: Option<AnalysisMode>) {
    match command {
        FeedCommand::Snapshot(snapshot) => {
            let side = snapshot.side;
            let before = engine.view().await;
            if !engine.apply_poller_snapshot(snapshot).await {
                return;
            }
            let after = engine.view().await;
            let membership_changed = !before
                .rosters
                .get(side)
                .same_members(after.rosters.get(side));
            if let Some(mode) = analyze.filter(|_| membership_changed) {
                engine.start_analysis(mode, true).await;
            }
        }
        FeedCommand::SetLane { side, lane, unit } => {
            if !engine.set_lane_assignment(side, lane, unit.as_deref()).await {
                warn!(%side, %lane, ?unit, "Lane assignment rejected");
            }
        }
        FeedCommand::Analyze { mode, force } => {
            if !engine.start_analysis(mode, force).await {
                warn!(%mode, "Analysis already running (use force)");
            }
        }
        FeedCommand::Cancel { mode } => {
            engine.cancel_analysis(mode).await;
        }
        FeedCommand::ClearAnalysis { mode } => {
            engine.clear_analysis(mode).await;
        }
        FeedCommand::Clear => engine.clear_session().await,
    }
}
