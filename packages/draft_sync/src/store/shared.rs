use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tracing::debug;

use super::DraftStore;
use crate::bus::SyncMessage;
use crate::model::DraftEvent;
use crate::persistence::DraftSnapshot;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A [`DraftStore`] shared between the tasks of one window.
///
/// Every `update` is one critical section: the operation, its commit, the
/// snapshot hand-off, local events and bus publication all happen under the
/// store lock, so outbound messages leave in the same order the state changed.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Inner>,
}

struct Inner {
    store: Mutex<DraftStore>,
    outbound: Option<mpsc::Sender<SyncMessage>>,
    events: broadcast::Sender<DraftEvent>,
    persist: Option<watch::Sender<Option<DraftSnapshot>>>,
}

impl SharedStore {
    pub fn new(
        store: DraftStore,
        outbound: Option<mpsc::Sender<SyncMessage>>,
        persist: Option<watch::Sender<Option<DraftSnapshot>>>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                store: Mutex::new(store),
                outbound,
                events,
                persist,
            }),
        }
    }

    /// Subscribe to local change events.
    pub fn subscribe(&self) -> broadcast::Receiver<DraftEvent> {
        self.inner.events.subscribe()
    }

    /// Run one operation and commit it.
    ///
    /// The commit runs even if `op` panics, so a remote cycle never leaves its
    /// no-echo flag behind to swallow the next local change. Whatever `op`
    /// changed before panicking is published, then the panic resumes.
    pub async fn update<R>(&self, op: impl FnOnce(&mut DraftStore) -> R) -> R {
        let mut store = self.inner.store.lock().await;
        let result = catch_unwind(AssertUnwindSafe(|| op(&mut store)));
        let commit = store.commit();

        if commit.dirty {
            if let Some(persist) = &self.inner.persist {
                persist.send_replace(store.persisted());
            }
        }
        for event in commit.events {
            // No subscribers is fine.
            let _ = self.inner.events.send(event);
        }
        self.send_outbound(commit.outbound);
        match result {
            Ok(result) => result,
            Err(panic) => {
                drop(store);
                resume_unwind(panic)
            }
        }
    }

    pub async fn read<R>(&self, op: impl FnOnce(&DraftStore) -> R) -> R {
        let store = self.inner.store.lock().await;
        op(&store)
    }

    /// Publish messages derived from the current state without changing it
    /// (e.g. answering REQUEST_SYNC). Returns how many were queued.
    pub async fn publish_with(&self, op: impl FnOnce(&DraftStore) -> Vec<SyncMessage>) -> usize {
        let store = self.inner.store.lock().await;
        let messages = op(&store);
        let count = messages.len();
        self.send_outbound(messages);
        count
    }

    /// Never blocks: the bus client drains its queue even while
    /// disconnected, so a full queue means a burst and the message is dropped.
    fn send_outbound(&self, messages: Vec<SyncMessage>) {
        let Some(outbound) = &self.inner.outbound else {
            return;
        };
        for msg in messages {
            if let Err(e) = outbound.try_send(msg) {
                let msg = match &e {
                    mpsc::error::TrySendError::Full(m) | mpsc::error::TrySendError::Closed(m) => m,
                };
                debug!(kind = msg.kind(), "Dropping outbound sync message: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnalysisMode, Lane, Roster, Side, Unit};
    use crate::store::LaneHints;
    use lane_inference::LaneClassifier;

    fn roster() -> Roster {
        Roster::from_slots([Some(Unit::new(1, "A", "A")), Some(Unit::new(2, "B", "B"))])
    }

    #[tokio::test]
    async fn test_update_publishes_in_order_and_persists() {
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let (persist_tx, persist_rx) = watch::channel(None);
        let shared = SharedStore::new(
            DraftStore::new(LaneClassifier::default()),
            Some(out_tx),
            Some(persist_tx),
        );
        let mut events = shared.subscribe();

        let changed = shared
            .update(|s| s.apply_roster_snapshot(Side::Ally, roster(), &LaneHints::default()))
            .await;
        assert!(changed);

        assert_eq!(out_rx.recv().await.unwrap().kind(), "ROSTER");
        assert_eq!(out_rx.recv().await.unwrap().kind(), "LANES");
        assert!(matches!(
            events.recv().await.unwrap(),
            DraftEvent::RosterChanged { side: Side::Ally, .. }
        ));
        assert!(persist_rx.borrow().is_some());

        let top = shared.read(|s| s.lanes(Side::Ally).get(Lane::Top).map(str::to_string)).await;
        assert_eq!(top, None);
    }

    #[tokio::test]
    async fn test_failed_remote_cycle_still_clears_no_echo_flag() {
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let shared = SharedStore::new(DraftStore::new(LaneClassifier::default()), Some(out_tx), None);

        let failing = shared.clone();
        let outcome = tokio::spawn(async move {
            failing
                .update(|s| {
                    s.apply_remote_sync(SyncMessage::roster(Side::Ally, roster()));
                    panic!("remote cycle failed");
                })
                .await
        })
        .await;
        assert!(outcome.unwrap_err().is_panic());

        // The remote roster landed and the store is still usable.
        let members = shared.read(|s| s.roster(Side::Ally).members().len()).await;
        assert_eq!(members, 2);

        // The next local change is published, not mistaken for an echo.
        assert!(shared.update(|s| s.set_lane_assignment(Side::Ally, Lane::Top, Some("A"))).await);
        let msg = out_rx.try_recv().expect("local change was swallowed");
        assert_eq!(msg.kind(), "LANES");
        assert!(out_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_clear_requests_snapshot_removal() {
        let (persist_tx, persist_rx) = watch::channel(None);
        let shared = SharedStore::new(
            DraftStore::new(LaneClassifier::default()),
            None,
            Some(persist_tx),
        );
        shared
            .update(|s| s.apply_roster_snapshot(Side::Enemy, roster(), &LaneHints::default()))
            .await;
        assert!(persist_rx.borrow().is_some());

        shared.update(|s| s.clear_session()).await;
        assert!(persist_rx.borrow().is_none());
    }

    #[tokio::test]
    async fn test_full_outbound_queue_never_blocks() {
        let (out_tx, _out_rx) = mpsc::channel(1);
        let shared = SharedStore::new(DraftStore::new(LaneClassifier::default()), Some(out_tx), None);
        for mode in AnalysisMode::ALL {
            shared.update(|s| s.begin_analysis(mode)).await;
        }
    }
}
