//! State Sync Bus
//!
//! Windows run in separate processes and share no memory. Each one connects
//! to a loopback relay that rebroadcasts every frame to the other windows.
//!
//! - [`SyncRelay`] - the relay server (one per machine)
//! - [`BusClient`] - a window's reconnecting connection to the relay
//! - [`SyncMessage`] - the closed set of frames on the wire

mod client;
mod protocol;
mod relay;

pub use client::{BusClient, BusHandle, BusStatus};
pub use protocol::{AnalysisPayload, LanesPayload, RosterPayload, SyncMessage};
pub use relay::{SYNC_PATH, SyncRelay};
