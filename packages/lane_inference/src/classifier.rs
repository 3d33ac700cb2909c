//! The lane classifier.
//!
//! Resolution runs in phases, strongest evidence first. Every phase only
//! looks at lanes and slots no earlier phase has claimed:
//!
//! 0. the game client's own position hint for the slot
//! 1. hard-coded allow-list on the unit id
//! 2. the crowd-sourced role database, keyed by unit name
//! 3. role tags (`Marksman` → CARRY, ...)
//! 4. greedy fill: remaining lanes take remaining units in slot order
//!
//! Within a phase, lanes are visited in the classifier's priority order and
//! the first matching slot (lowest index) wins. Phase 4's slot-order
//! tie-break is deterministic but carries no meaning.

use std::collections::HashMap;
use std::sync::Arc;

use crate::tables::{DEFAULT_LANE_PRIORITY, default_allow_list, lane_tag};
use crate::types::{Lane, LaneAssignment, ROSTER_SIZE, Roster, Unit};

/// External name → lanes lookup. Treated as a black box.
pub trait RoleLookup: Send + Sync {
    /// Lanes the unit is known to be played in. Empty if unknown.
    fn lanes_for(&self, name: &str) -> &[Lane];
}

/// Role database that knows nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRoleDatabase;

impl RoleLookup for NoRoleDatabase {
    fn lanes_for(&self, _name: &str) -> &[Lane] {
        &[]
    }
}

/// Role database backed by an in-memory map.
#[derive(Debug, Default, Clone)]
pub struct HashMapRoleDatabase {
    entries: HashMap<String, Vec<Lane>>,
}

impl HashMapRoleDatabase {
    pub fn new(entries: HashMap<String, Vec<Lane>>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RoleLookup for HashMapRoleDatabase {
    fn lanes_for(&self, name: &str) -> &[Lane] {
        self.entries.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Clone)]
pub struct LaneClassifier {
    priority: [Lane; 5],
    allow_list: HashMap<Lane, Vec<String>>,
    role_db: Arc<dyn RoleLookup>,
}

impl Default for LaneClassifier {
    fn default() -> Self {
        Self {
            priority: DEFAULT_LANE_PRIORITY,
            allow_list: default_allow_list(),
            role_db: Arc::new(NoRoleDatabase),
        }
    }
}

impl std::fmt::Debug for LaneClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaneClassifier")
            .field("priority", &self.priority)
            .field("allow_list_lanes", &self.allow_list.len())
            .finish_non_exhaustive()
    }
}

/// Claim bookkeeping for one classification run.
struct Claims<'a> {
    roster: &'a Roster,
    slots: [bool; ROSTER_SIZE],
    result: LaneAssignment,
}

impl<'a> Claims<'a> {
    fn lane_open(&self, lane: Lane) -> bool {
        self.result.get(lane).is_none()
    }

    /// Unclaimed units, in slot order. A unit whose name already sits on a
    /// lane is never offered again.
    fn open_units(&self) -> impl Iterator<Item = (usize, &'a Unit)> + '_ {
        self.roster
            .units()
            .filter(|(i, u)| !self.slots[*i] && self.result.lane_of(&u.name).is_none())
    }

    fn claim(&mut self, lane: Lane, slot: usize, unit: &Unit) {
        self.slots[slot] = true;
        self.result.set(lane, unit.name.clone());
    }

    /// One resolution phase: for each open lane in `priority` order, the
    /// first open unit accepted by `matches` claims it.
    fn phase(&mut self, priority: &[Lane; 5], matches: impl Fn(Lane, usize, &Unit) -> bool) {
        for &lane in priority {
            if !self.lane_open(lane) {
                continue;
            }
            let hit = self
                .open_units()
                .find(|(slot, unit)| matches(lane, *slot, unit));
            if let Some((slot, unit)) = hit {
                self.claim(lane, slot, unit);
            }
        }
    }
}

impl LaneClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the lane priority order.
    pub fn with_priority(mut self, priority: [Lane; 5]) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_allow_list(mut self, allow_list: HashMap<Lane, Vec<String>>) -> Self {
        self.allow_list = allow_list;
        self
    }

    pub fn with_role_database(mut self, role_db: Arc<dyn RoleLookup>) -> Self {
        self.role_db = role_db;
        self
    }

    pub fn priority(&self) -> &[Lane; 5] {
        &self.priority
    }

    /// Classify a roster from scratch, with no hints and nothing pinned.
    pub fn infer_lanes(&self, roster: &Roster) -> LaneAssignment {
        self.infer_with(roster, &[None; ROSTER_SIZE], &LaneAssignment::default())
    }

    /// Classify a roster, keeping `pinned` assignments whose unit is still
    /// present and using per-slot position `hints` as the strongest signal.
    pub fn infer_with(
        &self,
        roster: &Roster,
        hints: &[Option<Lane>; ROSTER_SIZE],
        pinned: &LaneAssignment,
    ) -> LaneAssignment {
        let mut claims = Claims {
            roster,
            slots: [false; ROSTER_SIZE],
            result: LaneAssignment::default(),
        };

        for (lane, name) in pinned.iter() {
            let slot = roster
                .units()
                .find(|(i, u)| !claims.slots[*i] && u.name == name)
                .map(|(i, _)| i);
            if let Some(slot) = slot {
                claims.slots[slot] = true;
                claims.result.set(lane, name);
            }
        }

        claims.phase(&self.priority, |lane, slot, _| hints[slot] == Some(lane));

        claims.phase(&self.priority, |lane, _, unit| {
            self.allow_list
                .get(&lane)
                .is_some_and(|ids| ids.iter().any(|id| *id == unit.id))
        });

        claims.phase(&self.priority, |lane, _, unit| {
            self.role_db.lanes_for(&unit.name).contains(&lane)
        });

        claims.phase(&self.priority, |lane, _, unit| unit.has_tag(lane_tag(lane)));

        claims.phase(&self.priority, |_, _, _| true);

        claims.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str, tags: &[&str]) -> Unit {
        Unit::new(0, name, name).with_tags(tags.iter().copied())
    }

    fn roster(units: Vec<Option<Unit>>) -> Roster {
        Roster::from_slots(units)
    }

    fn assert_well_formed(roster: &Roster, lanes: &LaneAssignment) {
        let mut seen = std::collections::HashSet::new();
        for (lane, name) in lanes.iter() {
            assert!(roster.contains_name(name), "{lane} points at missing {name}");
            assert!(seen.insert(name.to_string()), "{name} assigned twice");
        }
    }

    #[test]
    fn test_empty_roster_yields_empty_assignment() {
        let lanes = LaneClassifier::default().infer_lanes(&Roster::default());
        assert!(lanes.is_empty());
    }

    #[test]
    fn test_tag_fallback_then_greedy_fill_in_roster_order() {
        let r = roster(vec![
            Some(unit("JunglerA", &[])),
            Some(unit("CarryB", &["Marksman"])),
            Some(unit("SupportC", &["Support"])),
            Some(unit("MidD", &[])),
            Some(unit("TopE", &[])),
        ]);
        let lanes = LaneClassifier::default().infer_lanes(&r);

        assert_eq!(lanes.get(Lane::Carry), Some("CarryB"));
        assert_eq!(lanes.get(Lane::Support), Some("SupportC"));
        // Greedy fill: lanes in priority order (JUNGLE, MID, TOP) take the
        // leftover units in slot order. The pairing is a tie-break only.
        assert_eq!(lanes.get(Lane::Jungle), Some("JunglerA"));
        assert_eq!(lanes.get(Lane::Mid), Some("MidD"));
        assert_eq!(lanes.get(Lane::Top), Some("TopE"));
        assert_well_formed(&r, &lanes);
    }

    #[test]
    fn test_allow_list_beats_tags() {
        // Graves carries the Marksman tag but is on the jungle allow-list.
        let r = roster(vec![
            Some(Unit::new(104, "Graves", "Graves").with_tags(["Marksman"])),
            Some(Unit::new(22, "Ashe", "Ashe").with_tags(["Marksman", "Support"])),
        ]);
        let lanes = LaneClassifier::default().infer_lanes(&r);
        assert_eq!(lanes.get(Lane::Jungle), Some("Graves"));
        assert_eq!(lanes.get(Lane::Carry), Some("Ashe"));
    }

    #[test]
    fn test_allow_list_respects_lane_priority() {
        // Unit on both jungle and top allow-lists goes to jungle first.
        let mut allow = HashMap::new();
        allow.insert(Lane::Top, vec!["Flex".to_string()]);
        allow.insert(Lane::Jungle, vec!["Flex".to_string()]);
        let classifier = LaneClassifier::default().with_allow_list(allow);

        let r = roster(vec![Some(unit("Flex", &[]))]);
        let lanes = classifier.infer_lanes(&r);
        assert_eq!(lanes.get(Lane::Jungle), Some("Flex"));
        assert_eq!(lanes.get(Lane::Top), None);

        let top_first = classifier.with_priority([
            Lane::Top,
            Lane::Jungle,
            Lane::Mid,
            Lane::Carry,
            Lane::Support,
        ]);
        assert_eq!(top_first.infer_lanes(&r).get(Lane::Top), Some("Flex"));
    }

    #[test]
    fn test_role_database_beats_tags() {
        let mut db = HashMap::new();
        db.insert("Pyke".to_string(), vec![Lane::Support]);
        let classifier =
            LaneClassifier::default().with_role_database(Arc::new(HashMapRoleDatabase::new(db)));

        let r = roster(vec![
            Some(unit("Nameless", &["Support"])),
            Some(unit("Pyke", &["Assassin"])),
        ]);
        let lanes = classifier.infer_lanes(&r);
        assert_eq!(lanes.get(Lane::Support), Some("Pyke"));
        assert_eq!(lanes.get(Lane::Jungle), Some("Nameless"));
    }

    #[test]
    fn test_position_hint_beats_everything() {
        let r = roster(vec![Some(Unit::new(22, "Ashe", "Ashe").with_tags(["Marksman"]))]);
        let mut hints = [None; ROSTER_SIZE];
        hints[0] = Some(Lane::Support);
        let lanes =
            LaneClassifier::default().infer_with(&r, &hints, &LaneAssignment::default());
        assert_eq!(lanes.get(Lane::Support), Some("Ashe"));
        assert_eq!(lanes.get(Lane::Carry), None);
    }

    #[test]
    fn test_pinned_assignment_is_kept() {
        let r = roster(vec![
            Some(unit("A", &["Marksman"])),
            Some(unit("B", &[])),
        ]);
        let mut pinned = LaneAssignment::default();
        pinned.set(Lane::Top, "A");
        pinned.set(Lane::Mid, "Gone");

        let lanes = LaneClassifier::default().infer_with(&r, &[None; ROSTER_SIZE], &pinned);
        assert_eq!(lanes.get(Lane::Top), Some("A"));
        assert_eq!(lanes.get(Lane::Mid), None);
        assert_eq!(lanes.get(Lane::Jungle), Some("B"));
        assert_well_formed(&r, &lanes);
    }

    #[test]
    fn test_partial_roster_fills_only_as_many_lanes_as_units() {
        let r = roster(vec![None, Some(unit("X", &[])), None, Some(unit("Y", &[])), None]);
        let lanes = LaneClassifier::default().infer_lanes(&r);
        assert_eq!(lanes.len(), 2);
        assert_eq!(lanes.get(Lane::Jungle), Some("X"));
        assert_eq!(lanes.get(Lane::Carry), Some("Y"));
    }

    #[test]
    fn test_duplicate_names_never_share_lanes() {
        let r = roster(vec![Some(unit("Twin", &[])), Some(unit("Twin", &[]))]);
        let lanes = LaneClassifier::default().infer_lanes(&r);
        assert_eq!(lanes.len(), 1);
        assert_well_formed(&r, &lanes);
    }

    #[test]
    fn test_inference_is_idempotent_and_well_formed() {
        let pool = [
            unit("Ashe", &["Marksman"]),
            unit("Braum", &["Support", "Tank"]),
            unit("Ahri", &["Mage"]),
            unit("Garen", &["Fighter"]),
            unit("LeeSin", &["Fighter"]),
            unit("Lux", &["Mage", "Support"]),
        ];
        let classifier = LaneClassifier::default();
        // Every 5-slot window over the pool with one hole rotated through.
        for start in 0..pool.len() {
            for hole in 0..ROSTER_SIZE {
                let slots = (0..ROSTER_SIZE).map(|i| {
                    (i != hole).then(|| pool[(start + i) % pool.len()].clone())
                });
                let r = Roster::from_slots(slots);
                let first = classifier.infer_lanes(&r);
                let second = classifier.infer_lanes(&r);
                assert_eq!(first, second);
                assert_well_formed(&r, &first);
                assert_eq!(first.len(), r.units().count());
            }
        }
    }
}
