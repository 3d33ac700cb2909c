//! Live draft synchronization for a multi-window game companion.
//!
//! Every window (the primary control window and any number of overlays)
//! runs a [`DraftEngine`]. Engines never share memory; they agree on one
//! draft state by exchanging [`SyncMessage`]s through a loopback
//! [`SyncRelay`]. The primary window feeds poller snapshots in, lanes are
//! inferred with [`lane_inference`], and analysis text streams from an
//! external service into every window at once.

pub mod analysis;
pub mod bus;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod persistence;
pub mod store;
pub mod timer;

pub use analysis::{AnalysisSource, HttpAnalysisSource, SessionManager, SessionState};
pub use bus::{BusClient, BusStatus, SyncMessage, SyncRelay};
pub use catalog::UnitCatalog;
pub use engine::{DraftEngine, EngineOptions};
pub use model::{
    AnalysisMode, AnalysisResult, DraftEvent, DraftView, Lane, LaneAssignment, Roster,
    RosterSnapshot, Side, SlotPick, Unit,
};
pub use persistence::{DraftSnapshot, SnapshotStore};
pub use store::{DraftStore, SharedStore};
pub use timer::{ManualTimer, Timer, TokioTimer};
