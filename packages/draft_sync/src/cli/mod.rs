pub mod feed;
pub mod relay;
pub mod watch;

pub use feed::feed_command;
pub use relay::relay_command;
pub use watch::watch_command;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

use draft_sync::catalog::{UnitCatalog, load_role_database};
use draft_sync::config::{AnalysisConfig, BusConfig, DraftSyncConfig, FileConfig};
use draft_sync::engine::EngineOptions;
use draft_sync::model::{AnalysisResult, DraftEvent};
use lane_inference::LaneClassifier;

/// Engine options shared by every window command: bus, analysis service and
/// the optional role database, all from config.
async fn engine_options(
    config: &DraftSyncConfig,
    file: &FileConfig,
    catalog: UnitCatalog,
) -> Result<EngineOptions> {
    let mut classifier = LaneClassifier::default();
    if let Some(path) = &file.data.role_db {
        let path = config.resolve(path);
        let db = load_role_database(&path)
            .await
            .with_context(|| format!("Failed to load role database {:?}", path))?;
        info!(entries = db.len(), "Loaded role database");
        classifier = classifier.with_role_database(Arc::new(db));
    }

    let mut options = EngineOptions::new(catalog);
    options.classifier = classifier;
    options.bus = Some(BusConfig::from_file(&file.bus, &file.relay));
    options.analysis = AnalysisConfig::from_file(&file.analysis);
    options.authoritative = file.bus.authoritative;
    Ok(options)
}

fn log_event(event: &DraftEvent) {
    match event {
        DraftEvent::RosterChanged { side, roster } => {
            info!(%side, units = ?roster.members(), "Roster changed");
        }
        DraftEvent::LanesChanged { side, lanes } => {
            let lanes: Vec<String> = lanes
                .iter()
                .map(|(lane, name)| format!("{lane}={name}"))
                .collect();
            info!(%side, lanes = %lanes.join(" "), "Lanes changed");
        }
        DraftEvent::AnalysisChanged { mode, result } => match result {
            None => info!(%mode, "Analysis cleared"),
            Some(AnalysisResult::Streaming { text }) => {
                debug!(%mode, received = text.len(), "Analysis streaming");
            }
            Some(AnalysisResult::Complete { text, structured }) => {
                info!(%mode, structured = structured.is_some(), "Analysis complete:\n{}", text);
            }
            Some(AnalysisResult::Failed { message, partial }) => {
                info!(%mode, partial = partial.len(), "Analysis failed: {}", message);
            }
        },
        DraftEvent::LocalSlotChanged { slot } => debug!(?slot, "Local slot changed"),
        DraftEvent::SessionCleared => info!("Session cleared"),
    }
}
