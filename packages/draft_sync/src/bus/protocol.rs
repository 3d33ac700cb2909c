//! Sync Bus wire protocol
//!
//! Every frame is a JSON envelope `{"type": ..., "data": ...}`. Each message
//! type replaces its whole state slice on the receiving side, so frames can
//! be dropped or reordered across types without corrupting state.

use serde::{Deserialize, Serialize};

use crate::error::BusError;
use crate::model::{AnalysisMode, AnalysisResult, LaneAssignment, Roster, Side};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RosterPayload {
    pub side: Side,
    pub roster: Roster,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LanesPayload {
    pub side: Side,
    pub lanes: LaneAssignment,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPayload {
    pub mode: AnalysisMode,
    /// `None` clears the mode's result.
    #[serde(default)]
    pub result: Option<AnalysisResult>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMessage {
    Roster(RosterPayload),
    Lanes(LanesPayload),
    Analysis(AnalysisPayload),
    /// Ask every peer holding state to publish it.
    RequestSync,
}

impl SyncMessage {
    pub fn roster(side: Side, roster: Roster) -> Self {
        SyncMessage::Roster(RosterPayload { side, roster })
    }

    pub fn lanes(side: Side, lanes: LaneAssignment) -> Self {
        SyncMessage::Lanes(LanesPayload { side, lanes })
    }

    pub fn analysis(mode: AnalysisMode, result: Option<AnalysisResult>) -> Self {
        SyncMessage::Analysis(AnalysisPayload { mode, result })
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::Roster(_) => "ROSTER",
            SyncMessage::Lanes(_) => "LANES",
            SyncMessage::Analysis(_) => "ANALYSIS",
            SyncMessage::RequestSync => "REQUEST_SYNC",
        }
    }

    pub fn encode(&self) -> Result<String, BusError> {
        serde_json::to_string(self).map_err(BusError::Encode)
    }

    pub fn decode(text: &str) -> Result<Self, BusError> {
        serde_json::from_str(text).map_err(BusError::Decode)
    }
}
