//! Draft State Store
//!
//! The single source of truth inside one window. Three sources can change
//! it, and each can win independently:
//!
//! 1. **Poller** (`apply_roster_snapshot`): the game client's view of the
//!    rosters. Triggers lane reconciliation when roster membership changes.
//! 2. **Bus** (`apply_remote_sync`): another window's state. Applied as-is,
//!    never reclassified, and never echoed back.
//! 3. **User** (`set_lane_assignment`, `clear_session`).
//!
//! Every operation records events and outbound messages; [`DraftStore::commit`]
//! closes the cycle and hands them to the caller. The store itself does no
//! I/O; [`SharedStore`] wraps it with publishing and persistence.
//!
//! ## Lane stickiness
//!
//! A lane keeps its unit for as long as that unit stays on the roster, no
//! matter whether the classifier or the user put it there and no matter how
//! slots are reordered. Lanes are only re-derived when their unit leaves.
//! The local viewer's slot is informational and never triggers inference.

mod shared;

pub use shared::SharedStore;

use std::collections::BTreeMap;
use tracing::debug;

use lane_inference::LaneClassifier;

use crate::bus::SyncMessage;
use crate::model::{
    AnalysisMode, AnalysisResult, DraftEvent, DraftView, Lane, LaneAssignment, PerSide,
    ROSTER_SIZE, Roster, Side,
};
use crate::persistence::DraftSnapshot;

/// Per-slot position hints from the poller.
pub type LaneHints = [Option<Lane>; ROSTER_SIZE];

/// Output of one state-transition cycle.
#[derive(Debug, Default)]
pub struct Commit {
    /// Local change notifications, in order.
    pub events: Vec<DraftEvent>,
    /// Messages to publish on the bus, in order.
    pub outbound: Vec<SyncMessage>,
    /// True if persisted state changed.
    pub dirty: bool,
}

#[derive(Debug, Default)]
struct Pending {
    events: Vec<DraftEvent>,
    outbound: Vec<SyncMessage>,
    dirty: bool,
}

#[derive(Debug)]
pub struct DraftStore {
    classifier: LaneClassifier,
    rosters: PerSide<Roster>,
    lanes: PerSide<LaneAssignment>,
    analysis: BTreeMap<AnalysisMode, AnalysisResult>,
    /// Bumped whenever a mode's session is started, cancelled or cleared.
    /// Writes carrying an older generation are dropped.
    generations: BTreeMap<AnalysisMode, u64>,
    local_slot: Option<usize>,
    /// Set by `apply_remote_sync`; consumed by the next `commit`.
    remote_update: bool,
    pending: Pending,
}

impl DraftStore {
    pub fn new(classifier: LaneClassifier) -> Self {
        Self {
            classifier,
            rosters: PerSide::default(),
            lanes: PerSide::default(),
            analysis: BTreeMap::new(),
            generations: BTreeMap::new(),
            local_slot: None,
            remote_update: false,
            pending: Pending::default(),
        }
    }

    /// Rehydrate from a persisted snapshot.
    ///
    /// A result that was still streaming when the snapshot was written can
    /// never finish, so it comes back as a failure carrying its partial text.
    pub fn restore(classifier: LaneClassifier, snapshot: DraftSnapshot) -> Self {
        let mut store = Self::new(classifier);
        store.rosters = snapshot.rosters;
        store.lanes = snapshot.lanes;
        for side in Side::BOTH {
            let roster = store.rosters.get(side).clone();
            store.lanes.get_mut(side).retain_present(&roster);
        }
        store.analysis = snapshot
            .analysis
            .into_iter()
            .map(|(mode, result)| match result {
                AnalysisResult::Streaming { text } => {
                    (mode, AnalysisResult::failed("analysis interrupted", text))
                }
                other => (mode, other),
            })
            .collect();
        store
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn roster(&self, side: Side) -> &Roster {
        self.rosters.get(side)
    }

    pub fn lanes(&self, side: Side) -> &LaneAssignment {
        self.lanes.get(side)
    }

    pub fn analysis(&self, mode: AnalysisMode) -> Option<&AnalysisResult> {
        self.analysis.get(&mode)
    }

    pub fn local_slot(&self) -> Option<usize> {
        self.local_slot
    }

    pub fn is_empty(&self) -> bool {
        Side::BOTH
            .iter()
            .all(|s| self.rosters.get(*s).is_empty() && self.lanes.get(*s).is_empty())
            && self.analysis.is_empty()
    }

    pub fn view(&self) -> DraftView {
        DraftView {
            rosters: self.rosters.clone(),
            lanes: self.lanes.clone(),
            analysis: self.analysis.clone(),
            local_slot: self.local_slot,
        }
    }

    pub fn snapshot(&self) -> DraftSnapshot {
        DraftSnapshot {
            rosters: self.rosters.clone(),
            lanes: self.lanes.clone(),
            analysis: self.analysis.clone(),
            saved_at: None,
        }
    }

    /// What to persist: nothing at all once the session is empty.
    pub fn persisted(&self) -> Option<DraftSnapshot> {
        (!self.is_empty()).then(|| self.snapshot())
    }

    /// Messages answering a peer's `REQUEST_SYNC`.
    pub fn sync_response(&self) -> Vec<SyncMessage> {
        let mut messages = Vec::with_capacity(4 + self.analysis.len());
        for side in Side::BOTH {
            messages.push(SyncMessage::roster(side, self.rosters.get(side).clone()));
            messages.push(SyncMessage::lanes(side, self.lanes.get(side).clone()));
        }
        for (mode, result) in &self.analysis {
            messages.push(SyncMessage::analysis(*mode, Some(result.clone())));
        }
        messages
    }

    // ------------------------------------------------------------------
    // Roster / lane operations
    // ------------------------------------------------------------------

    /// New truth from the poller. Returns true if the roster changed.
    pub fn apply_roster_snapshot(&mut self, side: Side, roster: Roster, hints: &LaneHints) -> bool {
        let current = self.rosters.get(side);
        if *current == roster {
            return false;
        }
        let membership_changed = !current.same_members(&roster);
        self.set_roster(side, roster);

        if membership_changed {
            // Pinned lanes whose unit left are dropped by the classifier and
            // re-derived along with any empty lanes.
            let lanes =
                self.classifier
                    .infer_with(self.rosters.get(side), hints, self.lanes.get(side));
            debug!(%side, ?lanes, "Reconciled lanes after roster change");
            self.set_lanes(side, lanes);
        }
        true
    }

    /// Record which slot the local viewer occupies. Never reclassifies.
    pub fn set_local_slot(&mut self, slot: Option<usize>) -> bool {
        let slot = slot.filter(|s| *s < ROSTER_SIZE);
        if self.local_slot == slot {
            return false;
        }
        self.local_slot = slot;
        self.pending.events.push(DraftEvent::LocalSlotChanged { slot });
        true
    }

    /// Manual lane override. `None` blanks the lane.
    ///
    /// The unit must be on the side's roster. If it already holds another
    /// lane, the two lanes swap occupants.
    pub fn set_lane_assignment(&mut self, side: Side, lane: Lane, unit: Option<&str>) -> bool {
        let mut lanes = self.lanes.get(side).clone();
        match unit {
            None => {
                if lanes.clear(lane).is_none() {
                    return false;
                }
            }
            Some(name) => {
                if !self.rosters.get(side).contains_name(name) {
                    debug!(%side, %lane, name, "Ignoring lane override for unit not on roster");
                    return false;
                }
                if lanes.get(lane) == Some(name) {
                    return false;
                }
                let displaced = lanes.clear(lane);
                if let Some(other) = lanes.lane_of(name) {
                    lanes.clear(other);
                    if let Some(displaced) = displaced {
                        lanes.set(other, displaced);
                    }
                }
                lanes.set(lane, name);
            }
        }
        self.set_lanes(side, lanes)
    }

    /// Apply a peer's message. Lanes naming units absent from the local
    /// roster are dropped. The next commit publishes nothing.
    pub fn apply_remote_sync(&mut self, message: SyncMessage) {
        self.remote_update = true;
        match message {
            SyncMessage::Roster(payload) => {
                if self.set_roster(payload.side, payload.roster) {
                    let roster = self.rosters.get(payload.side).clone();
                    let mut lanes = self.lanes.get(payload.side).clone();
                    if !lanes.retain_present(&roster).is_empty() {
                        self.set_lanes(payload.side, lanes);
                    }
                }
            }
            SyncMessage::Lanes(payload) => {
                let mut lanes = payload.lanes;
                let dropped = lanes.retain_present(self.rosters.get(payload.side));
                if !dropped.is_empty() {
                    debug!(side = %payload.side, ?dropped, "Dropped remote lanes for units not on roster");
                }
                self.set_lanes(payload.side, lanes);
            }
            SyncMessage::Analysis(payload) => {
                self.set_analysis(payload.mode, payload.result, false);
            }
            SyncMessage::RequestSync => {}
        }
    }

    /// Reset rosters, lanes and every analysis result.
    pub fn clear_session(&mut self) {
        for side in Side::BOTH {
            self.set_roster(side, Roster::default());
            self.set_lanes(side, LaneAssignment::default());
        }
        for mode in AnalysisMode::ALL {
            self.retire_analysis(mode);
            self.set_analysis(mode, None, true);
        }
        self.set_local_slot(None);
        self.pending.events.push(DraftEvent::SessionCleared);
        self.pending.dirty = true;
    }

    // ------------------------------------------------------------------
    // Analysis slice
    // ------------------------------------------------------------------

    /// Start a new generation for `mode`, clearing its result and publishing
    /// the clear immediately. Returns the new generation.
    pub fn begin_analysis(&mut self, mode: AnalysisMode) -> u64 {
        let generation = self.retire_analysis(mode);
        if self.analysis.contains_key(&mode) {
            self.set_analysis(mode, None, true);
        } else {
            // Already empty locally; peers may still show an old result.
            self.pending.outbound.push(SyncMessage::analysis(mode, None));
        }
        generation
    }

    /// Invalidate any in-flight writer for `mode` without touching its result.
    pub fn retire_analysis(&mut self, mode: AnalysisMode) -> u64 {
        let generation = self.generations.entry(mode).or_insert(0);
        *generation += 1;
        *generation
    }

    pub fn is_current(&self, mode: AnalysisMode, generation: u64) -> bool {
        self.generations.get(&mode).copied().unwrap_or(0) == generation
    }

    /// Store the text accumulated so far. Published only if `publish`.
    /// Returns false if `generation` is stale.
    pub fn stream_analysis(
        &mut self,
        mode: AnalysisMode,
        generation: u64,
        text: &str,
        publish: bool,
    ) -> bool {
        if !self.is_current(mode, generation) {
            return false;
        }
        let result = AnalysisResult::Streaming {
            text: text.to_string(),
        };
        self.set_analysis(mode, Some(result), publish);
        true
    }

    /// Publish the mode's current value (used for throttled flushes).
    pub fn publish_analysis(&mut self, mode: AnalysisMode, generation: u64) -> bool {
        if !self.is_current(mode, generation) {
            return false;
        }
        let result = self.analysis.get(&mode).cloned();
        self.pending.outbound.push(SyncMessage::analysis(mode, result));
        true
    }

    /// Store and publish a terminal result. Returns false if stale.
    pub fn finish_analysis(
        &mut self,
        mode: AnalysisMode,
        generation: u64,
        result: AnalysisResult,
    ) -> bool {
        if !self.is_current(mode, generation) {
            return false;
        }
        // Terminal values are always published, even if unchanged locally.
        self.set_analysis(mode, Some(result.clone()), false);
        self.pending
            .outbound
            .push(SyncMessage::analysis(mode, Some(result)));
        true
    }

    /// User-driven clear of one mode's result.
    pub fn clear_analysis(&mut self, mode: AnalysisMode) -> bool {
        self.retire_analysis(mode);
        self.set_analysis(mode, None, true)
    }

    // ------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------

    /// Close the current state-transition cycle.
    ///
    /// The remote-update flag is consumed first, unconditionally, so a
    /// remote apply can silence at most one cycle.
    pub fn commit(&mut self) -> Commit {
        let remote = std::mem::take(&mut self.remote_update);
        let pending = std::mem::take(&mut self.pending);
        let outbound = if remote {
            if !pending.outbound.is_empty() {
                debug!(
                    suppressed = pending.outbound.len(),
                    "Not echoing remote update"
                );
            }
            Vec::new()
        } else {
            pending.outbound
        };
        Commit {
            events: pending.events,
            outbound,
            dirty: pending.dirty,
        }
    }

    // ------------------------------------------------------------------
    // Slice setters: record event + outbound + dirty when the value changes
    // ------------------------------------------------------------------

    fn set_roster(&mut self, side: Side, roster: Roster) -> bool {
        if *self.rosters.get(side) == roster {
            return false;
        }
        *self.rosters.get_mut(side) = roster.clone();
        self.pending.events.push(DraftEvent::RosterChanged {
            side,
            roster: roster.clone(),
        });
        self.pending.outbound.push(SyncMessage::roster(side, roster));
        self.pending.dirty = true;
        true
    }

    fn set_lanes(&mut self, side: Side, lanes: LaneAssignment) -> bool {
        if *self.lanes.get(side) == lanes {
            return false;
        }
        *self.lanes.get_mut(side) = lanes.clone();
        self.pending.events.push(DraftEvent::LanesChanged {
            side,
            lanes: lanes.clone(),
        });
        self.pending.outbound.push(SyncMessage::lanes(side, lanes));
        self.pending.dirty = true;
        true
    }

    fn set_analysis(
        &mut self,
        mode: AnalysisMode,
        result: Option<AnalysisResult>,
        publish: bool,
    ) -> bool {
        if self.analysis.get(&mode) == result.as_ref() {
            return false;
        }
        match &result {
            Some(r) => self.analysis.insert(mode, r.clone()),
            None => self.analysis.remove(&mode),
        };
        self.pending.events.push(DraftEvent::AnalysisChanged {
            mode,
            result: result.clone(),
        });
        if publish {
            self.pending
                .outbound
                .push(SyncMessage::analysis(mode, result));
        }
        self.pending.dirty = true;
        true
    }
}
