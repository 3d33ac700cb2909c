//! Per-window runtime.
//!
//! A [`DraftEngine`] owns one window's store and wires it to the snapshot
//! file, the sync bus and the analysis sessions. Construction and teardown
//! are explicit: [`DraftEngine::create`] restores state and spawns the
//! background tasks, [`DraftEngine::dispose`] cancels them and waits for the
//! final snapshot flush.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lane_inference::LaneClassifier;

use crate::analysis::{AnalysisSource, HttpAnalysisSource, SessionManager, SessionState};
use crate::bus::{BusClient, BusStatus, SyncMessage};
use crate::catalog::UnitCatalog;
use crate::config::{AnalysisConfig, BusConfig};
use crate::model::{
    AnalysisMode, DraftEvent, DraftView, Lane, ROSTER_SIZE, Roster, RosterSnapshot, Side, Unit,
};
use crate::persistence::SnapshotStore;
use crate::store::{DraftStore, LaneHints, SharedStore};
use crate::timer::{Timer, TokioTimer};

pub struct EngineOptions {
    pub catalog: UnitCatalog,
    pub classifier: LaneClassifier,
    /// Where to persist the draft. `None` keeps state in memory only.
    pub snapshot: Option<SnapshotStore>,
    /// Relay to join. `None` runs the window standalone.
    pub bus: Option<BusConfig>,
    pub analysis: AnalysisConfig,
    /// Overrides the HTTP source built from `analysis.endpoint`.
    pub source: Option<Arc<dyn AnalysisSource>>,
    pub timer: Arc<dyn Timer>,
    /// Answer REQUEST_SYNC even while holding no state.
    pub authoritative: bool,
}

impl EngineOptions {
    pub fn new(catalog: UnitCatalog) -> Self {
        Self {
            catalog,
            classifier: LaneClassifier::default(),
            snapshot: None,
            bus: None,
            analysis: AnalysisConfig::default(),
            source: None,
            timer: Arc::new(TokioTimer),
            authoritative: false,
        }
    }
}

pub struct DraftEngine {
    catalog: UnitCatalog,
    store: SharedStore,
    sessions: SessionManager,
    bus_status: watch::Receiver<BusStatus>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl DraftEngine {
    pub async fn create(options: EngineOptions) -> Self {
        let EngineOptions {
            catalog,
            classifier,
            snapshot,
            bus,
            analysis,
            source,
            timer,
            authoritative,
        } = options;

        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        let store = match &snapshot {
            Some(snapshot) => match snapshot.load().await {
                Ok(Some(saved)) => {
                    info!(path = ?snapshot.path(), "Restored draft snapshot");
                    DraftStore::restore(classifier, saved)
                }
                Ok(None) => DraftStore::new(classifier),
                Err(e) => {
                    warn!("Ignoring unreadable draft snapshot: {}", e);
                    DraftStore::new(classifier)
                }
            },
            None => DraftStore::new(classifier),
        };

        let persist = snapshot.map(|snapshot| {
            let (tx, rx) = watch::channel(store.persisted());
            tasks.push(snapshot.spawn_writer(rx, cancel.clone()));
            tx
        });

        let (outbound, inbound, bus_status) = match bus {
            Some(config) => {
                info!(url = %config.url, "Joining sync bus");
                let handle = BusClient::spawn(config, timer.clone(), cancel.clone());
                tasks.push(handle.task);
                (Some(handle.outbound), Some(handle.inbound), handle.status)
            }
            None => {
                let (_tx, rx) = watch::channel(BusStatus::Disconnected);
                (None, None, rx)
            }
        };

        let store = SharedStore::new(store, outbound, persist);

        if let Some(inbound) = inbound {
            tasks.push(tokio::spawn(run_inbound(
                store.clone(),
                inbound,
                bus_status.clone(),
                authoritative,
                cancel.clone(),
            )));
        }

        let source = source.or_else(|| {
            let endpoint = analysis.endpoint.as_deref()?;
            match HttpAnalysisSource::new(endpoint, analysis.request_timeout) {
                Ok(source) => Some(Arc::new(source) as Arc<dyn AnalysisSource>),
                Err(e) => {
                    warn!("Analysis disabled: {}", e);
                    None
                }
            }
        });
        if source.is_none() {
            debug!("No analysis service configured");
        }
        let sessions = SessionManager::new(store.clone(), source, timer, analysis.publish_interval);

        Self {
            catalog,
            store,
            sessions,
            bus_status,
            cancel,
            tasks,
        }
    }

    /// Stop every session and background task, flushing the snapshot.
    pub async fn dispose(self) {
        self.sessions.shutdown().await;
        self.cancel.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
        debug!("Draft engine disposed");
    }

    /// Apply a snapshot from the game-client poller.
    ///
    /// Unit ids are resolved through the catalog; unknown or unset ids become
    /// empty slots and out-of-range slot indices are ignored. Returns true if
    /// the roster changed.
    pub async fn apply_poller_snapshot(&self, snapshot: RosterSnapshot) -> bool {
        let mut slots: [Option<Unit>; ROSTER_SIZE] = Default::default();
        let mut hints: LaneHints = [None; ROSTER_SIZE];

        for pick in &snapshot.picks {
            let Some(slot) = slots.get_mut(pick.slot_index) else {
                debug!(slot = pick.slot_index, "Ignoring out-of-range slot");
                continue;
            };
            *slot = self.catalog.resolve(pick.unit_id).cloned();
            if slot.is_none() && pick.unit_id > 0 {
                debug!(unit_id = pick.unit_id, "Unknown unit id, treating slot as empty");
            }
            hints[pick.slot_index] = pick
                .lane_hint
                .as_deref()
                .and_then(|hint| hint.parse::<Lane>().ok());
        }

        let side = snapshot.side;
        let roster = Roster { slots };
        self.store
            .update(|s| {
                let changed = s.apply_roster_snapshot(side, roster, &hints);
                if side == Side::Ally {
                    s.set_local_slot(snapshot.local_slot);
                }
                changed
            })
            .await
    }

    pub async fn apply_roster_snapshot(&self, side: Side, roster: Roster, hints: LaneHints) -> bool {
        self.store
            .update(|s| s.apply_roster_snapshot(side, roster, &hints))
            .await
    }

    pub async fn set_local_slot(&self, slot: Option<usize>) -> bool {
        self.store.update(|s| s.set_local_slot(slot)).await
    }

    pub async fn set_lane_assignment(&self, side: Side, lane: Lane, unit: Option<&str>) -> bool {
        self.store
            .update(|s| s.set_lane_assignment(side, lane, unit))
            .await
    }

    /// Cancel every analysis and reset all state, including the snapshot file.
    pub async fn clear_session(&self) {
        self.sessions.reset().await;
        self.store.update(|s| s.clear_session()).await;
        info!("Draft session cleared");
    }

    pub async fn start_analysis(&self, mode: AnalysisMode, force: bool) -> bool {
        self.sessions.start(mode, force).await
    }

    pub async fn cancel_analysis(&self, mode: AnalysisMode) -> bool {
        self.sessions.cancel(mode).await
    }

    /// Cancel any session for `mode` and drop its result everywhere.
    pub async fn clear_analysis(&self, mode: AnalysisMode) -> bool {
        self.sessions.cancel(mode).await;
        self.store.update(|s| s.clear_analysis(mode)).await
    }

    pub async fn analysis_status(&self, mode: AnalysisMode) -> SessionState {
        self.sessions.status(mode).await
    }

    pub async fn view(&self) -> DraftView {
        self.store.read(DraftStore::view).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DraftEvent> {
        self.store.subscribe()
    }

    pub fn bus_status(&self) -> BusStatus {
        *self.bus_status.borrow()
    }

    /// Watch the bus connection ("out of sync" indicator).
    pub fn watch_bus_status(&self) -> watch::Receiver<BusStatus> {
        self.bus_status.clone()
    }
}

/// Publish the full state if this window is allowed to speak for the draft.
async fn publish_state(store: &SharedStore, authoritative: bool) -> usize {
    store
        .publish_with(|s| {
            if authoritative || !s.is_empty() {
                s.sync_response()
            } else {
                Vec::new()
            }
        })
        .await
}

async fn run_inbound(
    store: SharedStore,
    mut inbound: mpsc::Receiver<SyncMessage>,
    mut status: watch::Receiver<BusStatus>,
    authoritative: bool,
    cancel: CancellationToken,
) {
    let mut status_open = true;
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            changed = status.changed(), if status_open => {
                if changed.is_err() {
                    status_open = false;
                    continue;
                }
                // Peers that asked before we joined never got an answer.
                if *status.borrow_and_update() == BusStatus::Connected {
                    let sent = publish_state(&store, authoritative).await;
                    if sent > 0 {
                        debug!(sent, "Pushed state after connecting");
                    }
                }
                continue;
            }
            msg = inbound.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        match msg {
            SyncMessage::RequestSync => {
                let sent = publish_state(&store, authoritative).await;
                if sent > 0 {
                    debug!(sent, "Answered sync request");
                }
            }
            msg => {
                debug!(kind = msg.kind(), "Applying remote update");
                store.update(|s| s.apply_remote_sync(msg)).await;
            }
        }
    }
    debug!("Inbound sync loop stopped");
}
