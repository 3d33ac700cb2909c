//! Draft state types
//!
//! Rosters and lane assignments come from `lane_inference`; this module adds
//! the per-side containers, analysis results and the poller's input shape.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use lane_inference::{Lane, LaneAssignment, ROSTER_SIZE, Roster, Unit};

/// One side of the match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Ally,
    Enemy,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Ally, Side::Enemy];
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Ally => f.write_str("ally"),
            Side::Enemy => f.write_str("enemy"),
        }
    }
}

/// A value held once per side.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de> + Default"))]
pub struct PerSide<T> {
    #[serde(default)]
    pub ally: T,
    #[serde(default)]
    pub enemy: T,
}

impl<T> PerSide<T> {
    pub fn get(&self, side: Side) -> &T {
        match side {
            Side::Ally => &self.ally,
            Side::Enemy => &self.enemy,
        }
    }

    pub fn get_mut(&mut self, side: Side) -> &mut T {
        match side {
            Side::Ally => &mut self.ally,
            Side::Enemy => &mut self.enemy,
        }
    }
}

/// Which kind of tactical analysis is requested.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    Draft,
    Personal,
    Team,
}

impl AnalysisMode {
    pub const ALL: [AnalysisMode; 3] = [
        AnalysisMode::Draft,
        AnalysisMode::Personal,
        AnalysisMode::Team,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::Draft => "draft",
            AnalysisMode::Personal => "personal",
            AnalysisMode::Team => "team",
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AnalysisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(AnalysisMode::Draft),
            "personal" => Ok(AnalysisMode::Personal),
            "team" => Ok(AnalysisMode::Team),
            other => Err(format!("unknown analysis mode: {other}")),
        }
    }
}

/// Result of one analysis mode. Absence (`None` at the use site) means no
/// result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisResult {
    /// Still streaming; `text` is everything accumulated so far.
    Streaming { text: String },
    /// Finished. `structured` holds the parsed document when the final text
    /// was JSON.
    Complete {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        structured: Option<serde_json::Value>,
    },
    /// The session failed; `partial` is what had arrived before the failure.
    Failed {
        message: String,
        #[serde(default)]
        partial: String,
    },
}

impl AnalysisResult {
    pub fn complete(text: String) -> Self {
        let structured = serde_json::from_str::<serde_json::Value>(text.trim())
            .ok()
            .filter(|v| v.is_object() || v.is_array());
        AnalysisResult::Complete { text, structured }
    }

    pub fn failed(message: impl Into<String>, partial: String) -> Self {
        AnalysisResult::Failed {
            message: message.into(),
            partial,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AnalysisResult::Streaming { .. })
    }

    /// Text to show in place of the result.
    pub fn text(&self) -> &str {
        match self {
            AnalysisResult::Streaming { text } | AnalysisResult::Complete { text, .. } => text,
            AnalysisResult::Failed { message, .. } => message,
        }
    }
}

/// Full read-only copy of one window's draft state.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DraftView {
    pub rosters: PerSide<Roster>,
    pub lanes: PerSide<LaneAssignment>,
    pub analysis: BTreeMap<AnalysisMode, AnalysisResult>,
    pub local_slot: Option<usize>,
}

/// Local notification of a state change, emitted on every committed change
/// (including each streamed analysis chunk).
#[derive(Clone, Debug, PartialEq)]
pub enum DraftEvent {
    RosterChanged { side: Side, roster: Roster },
    LanesChanged { side: Side, lanes: LaneAssignment },
    AnalysisChanged {
        mode: AnalysisMode,
        result: Option<AnalysisResult>,
    },
    LocalSlotChanged { slot: Option<usize> },
    SessionCleared,
}

/// One slot as reported by the game-client poller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotPick {
    pub slot_index: usize,
    /// Zero or negative means nothing selected.
    #[serde(default)]
    pub unit_id: i64,
    #[serde(default)]
    pub lane_hint: Option<String>,
}

/// One side's roster as reported by the game-client poller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterSnapshot {
    pub side: Side,
    #[serde(default)]
    pub picks: Vec<SlotPick>,
    /// Slot the local viewer occupies, if known.
    #[serde(default)]
    pub local_slot: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_result_parses_json_documents() {
        let result = AnalysisResult::complete(r#" {"pick": "Ashe"} "#.to_string());
        match result {
            AnalysisResult::Complete { structured, .. } => {
                assert_eq!(structured, Some(serde_json::json!({"pick": "Ashe"})));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let plain = AnalysisResult::complete("ban Yasuo".to_string());
        assert_eq!(
            plain,
            AnalysisResult::Complete {
                text: "ban Yasuo".to_string(),
                structured: None
            }
        );
    }

    #[test]
    fn analysis_result_wire_shape() {
        let json = serde_json::to_value(AnalysisResult::Streaming {
            text: "AB".to_string(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"status": "streaming", "text": "AB"}));
    }

    #[test]
    fn roster_snapshot_tolerates_missing_fields() {
        let snap: RosterSnapshot = serde_json::from_str(
            r#"{"side":"ally","picks":[{"slotIndex":0,"unitId":266},{"slotIndex":1}]}"#,
        )
        .unwrap();
        assert_eq!(snap.picks[0].lane_hint, None);
        assert_eq!(snap.picks[1].unit_id, 0);
        assert_eq!(snap.local_slot, None);
    }

    #[test]
    fn per_side_defaults_missing_side() {
        let lanes: PerSide<LaneAssignment> =
            serde_json::from_str(r#"{"ally":{"TOP":"Garen"}}"#).unwrap();
        assert_eq!(lanes.ally.get(Lane::Top), Some("Garen"));
        assert!(lanes.enemy.is_empty());
    }
}
