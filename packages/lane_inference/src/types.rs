//! Roster and lane types shared by the classifier and its callers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Number of slots on one side of a draft.
pub const ROSTER_SIZE: usize = 5;

/// One of the five positional roles a unit can occupy within a team.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Lane {
    Top,
    Jungle,
    Mid,
    Carry,
    Support,
}

impl Lane {
    pub const ALL: [Lane; 5] = [Lane::Top, Lane::Jungle, Lane::Mid, Lane::Carry, Lane::Support];

    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::Top => "TOP",
            Lane::Jungle => "JUNGLE",
            Lane::Mid => "MID",
            Lane::Carry => "CARRY",
            Lane::Support => "SUPPORT",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown lane: {0:?}")]
pub struct ParseLaneError(pub String);

/// Accepts both our own lane names and the game client's position
/// vocabulary (`middle`, `bottom`, `utility`).
impl FromStr for Lane {
    type Err = ParseLaneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top" => Ok(Lane::Top),
            "jungle" | "jng" => Ok(Lane::Jungle),
            "mid" | "middle" => Ok(Lane::Mid),
            "carry" | "bottom" | "bot" | "adc" => Ok(Lane::Carry),
            "support" | "utility" | "sup" => Ok(Lane::Support),
            _ => Err(ParseLaneError(s.to_string())),
        }
    }
}

/// A selectable unit. `icon` is presentation metadata the engine never reads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Numeric id as reported by the game client.
    pub key: i64,
    /// Stable string identifier (used by the allow-lists).
    pub id: String,
    /// Display name (used as the value of lane assignments).
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl Unit {
    pub fn new(key: i64, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key,
            id: id.into(),
            name: name.into(),
            tags: Vec::new(),
            icon: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// The five ordered slots of one side.
///
/// Serialized as a plain JSON array. Deserialization is lenient about the
/// length: short arrays are padded with empty slots, long ones truncated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Roster {
    pub slots: [Option<Unit>; ROSTER_SIZE],
}

impl Roster {
    pub fn from_slots(slots: impl IntoIterator<Item = Option<Unit>>) -> Self {
        let mut roster = Roster::default();
        for (slot, unit) in roster.slots.iter_mut().zip(slots) {
            *slot = unit;
        }
        roster
    }

    /// Populated slots with their index, in slot order.
    pub fn units(&self) -> impl Iterator<Item = (usize, &Unit)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|u| (i, u)))
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.units().any(|(_, u)| u.name == name)
    }

    /// Set of unit names, ignoring slot order.
    pub fn members(&self) -> BTreeSet<&str> {
        self.units().map(|(_, u)| u.name.as_str()).collect()
    }

    /// True if both rosters hold the same units, in any order.
    pub fn same_members(&self, other: &Roster) -> bool {
        self.members() == other.members()
    }
}

impl Serialize for Roster {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.slots.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Roster {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let slots = Vec::<Option<Unit>>::deserialize(deserializer)?;
        Ok(Roster::from_slots(slots))
    }
}

/// Lane → unit name for one side. Absent lanes are empty.
///
/// Values are names rather than slot indices so an assignment survives the
/// game client reordering slots.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<Lane, Option<String>>")]
pub struct LaneAssignment(BTreeMap<Lane, String>);

impl From<BTreeMap<Lane, Option<String>>> for LaneAssignment {
    fn from(map: BTreeMap<Lane, Option<String>>) -> Self {
        LaneAssignment(
            map.into_iter()
                .filter_map(|(lane, name)| name.filter(|n| !n.is_empty()).map(|n| (lane, n)))
                .collect(),
        )
    }
}

impl LaneAssignment {
    pub fn get(&self, lane: Lane) -> Option<&str> {
        self.0.get(&lane).map(String::as_str)
    }

    pub fn set(&mut self, lane: Lane, name: impl Into<String>) {
        self.0.insert(lane, name.into());
    }

    pub fn clear(&mut self, lane: Lane) -> Option<String> {
        self.0.remove(&lane)
    }

    /// The lane currently holding `name`, if any.
    pub fn lane_of(&self, name: &str) -> Option<Lane> {
        self.0
            .iter()
            .find_map(|(lane, n)| (n == name).then_some(*lane))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Lane, &str)> {
        self.0.iter().map(|(lane, name)| (*lane, name.as_str()))
    }

    /// Blank every lane whose unit is no longer in `roster`.
    /// Returns the lanes that were blanked.
    pub fn retain_present(&mut self, roster: &Roster) -> Vec<Lane> {
        let dangling: Vec<Lane> = self
            .0
            .iter()
            .filter(|(_, name)| !roster.contains_name(name))
            .map(|(lane, _)| *lane)
            .collect();
        for lane in &dangling {
            self.0.remove(lane);
        }
        dangling
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lane_parses_client_positions() {
        assert_eq!("middle".parse::<Lane>(), Ok(Lane::Mid));
        assert_eq!("BOTTOM".parse::<Lane>(), Ok(Lane::Carry));
        assert_eq!("utility".parse::<Lane>(), Ok(Lane::Support));
        assert_eq!("JUNGLE".parse::<Lane>(), Ok(Lane::Jungle));
        assert!("".parse::<Lane>().is_err());
        assert!("fill".parse::<Lane>().is_err());
    }

    #[test]
    fn roster_deserializes_short_arrays() {
        let roster: Roster =
            serde_json::from_str(r#"[{"key":1,"id":"Ashe","name":"Ashe"}, null]"#).unwrap();
        assert_eq!(roster.slots[0].as_ref().map(|u| u.name.as_str()), Some("Ashe"));
        assert!(roster.slots[1..].iter().all(Option::is_none));

        let json = serde_json::to_value(&roster).unwrap();
        assert_eq!(json.as_array().map(Vec::len), Some(ROSTER_SIZE));
    }

    #[test]
    fn lane_assignment_ignores_null_and_empty_values() {
        let lanes: LaneAssignment =
            serde_json::from_str(r#"{"TOP":"Garen","MID":null,"CARRY":""}"#).unwrap();
        assert_eq!(lanes.get(Lane::Top), Some("Garen"));
        assert_eq!(lanes.get(Lane::Mid), None);
        assert_eq!(lanes.get(Lane::Carry), None);
        assert_eq!(lanes.len(), 1);

        let json = serde_json::to_string(&lanes).unwrap();
        assert_eq!(json, r#"{"TOP":"Garen"}"#);
    }

    #[test]
    fn retain_present_blanks_dangling_lanes() {
        let roster = Roster::from_slots([Some(Unit::new(1, "Garen", "Garen"))]);
        let mut lanes = LaneAssignment::default();
        lanes.set(Lane::Top, "Garen");
        lanes.set(Lane::Mid, "Ahri");

        assert_eq!(lanes.retain_present(&roster), vec![Lane::Mid]);
        assert_eq!(lanes.get(Lane::Top), Some("Garen"));
        assert_eq!(lanes.get(Lane::Mid), None);
    }

    #[test]
    fn same_members_ignores_slot_order() {
        let a = Roster::from_slots([
            Some(Unit::new(1, "A", "A")),
            Some(Unit::new(2, "B", "B")),
        ]);
        let b = Roster::from_slots([None, Some(Unit::new(2, "B", "B")), Some(Unit::new(1, "A", "A"))]);
        assert!(a.same_members(&b));
        assert_ne!(a, b);
    }
}
