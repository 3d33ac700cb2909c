//! Two windows talking through a real relay on loopback.

use std::future::Future;
use std::time::Duration;

use axum::{Router, routing::post};
use draft_sync::config::{AnalysisConfig, BusConfig};
use draft_sync::persistence::SnapshotStore;
use draft_sync::{
    AnalysisMode, AnalysisResult, BusStatus, DraftEngine, EngineOptions, Lane, RosterSnapshot,
    Side, SlotPick, SyncRelay, Unit, UnitCatalog,
};
use tokio::time::timeout;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

fn catalog() -> UnitCatalog {
    UnitCatalog::new([
        Unit::new(1, "UnitX", "X"),
        Unit::new(2, "UnitY", "Y"),
        Unit::new(3, "UnitZ", "Z"),
    ])
}

fn options(relay: &SyncRelay, authoritative: bool) -> EngineOptions {
    let mut options = EngineOptions::new(catalog());
    options.bus = Some(BusConfig {
        url: relay.url(),
        reconnect_interval: Duration::from_millis(50),
        resync_interval: None,
        channel_capacity: 64,
    });
    options.authoritative = authoritative;
    options
}

fn snapshot(side: Side, ids: &[i64]) -> RosterSnapshot {
    RosterSnapshot {
        side,
        picks: ids
            .iter()
            .enumerate()
            .map(|(slot_index, unit_id)| SlotPick {
                slot_index,
                unit_id: *unit_id,
                lane_hint: None,
            })
            .collect(),
        local_slot: None,
    }
}

async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    timeout(TEST_TIMEOUT, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

async fn connected(engine: &DraftEngine) {
    let mut status = engine.watch_bus_status();
    timeout(TEST_TIMEOUT, status.wait_for(|s| *s == BusStatus::Connected))
        .await
        .expect("engine never connected")
        .expect("status channel closed");
}

#[tokio::test]
async fn late_window_catches_up_via_request_sync() {
    let relay = SyncRelay::start(([127, 0, 0, 1], 0).into()).await.unwrap();

    let a = DraftEngine::create(options(&relay, true)).await;
    connected(&a).await;
    assert!(a.apply_poller_snapshot(snapshot(Side::Ally, &[1, 2])).await);
    assert!(a.set_lane_assignment(Side::Ally, Lane::Top, Some("X")).await);

    // B joins after A already holds state.
    let b = DraftEngine::create(options(&relay, false)).await;
    connected(&b).await;

    let b_ref = &b;
    eventually("B to receive A's lanes", || async move {
        b_ref.view().await.lanes.ally.get(Lane::Top) == Some("X")
    })
    .await;
    assert_eq!(b.view().await.rosters, a.view().await.rosters);

    a.dispose().await;
    b.dispose().await;
    relay.shutdown().await;
}

#[tokio::test]
async fn restored_primary_reaches_an_overlay_that_joined_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("draft-snapshot.json");

    // A previous run of the primary left state on disk.
    let mut offline = EngineOptions::new(catalog());
    offline.snapshot = Some(SnapshotStore::new(path.clone()));
    let previous = DraftEngine::create(offline).await;
    assert!(previous.apply_poller_snapshot(snapshot(Side::Ally, &[1])).await);
    previous.dispose().await;

    let relay = SyncRelay::start(([127, 0, 0, 1], 0).into()).await.unwrap();

    // The overlay asks for state while nobody can answer.
    let b = DraftEngine::create(options(&relay, false)).await;
    connected(&b).await;

    let mut primary = options(&relay, false);
    primary.snapshot = Some(SnapshotStore::new(path.clone()));
    let a = DraftEngine::create(primary).await;
    connected(&a).await;
    assert!(a.view().await.rosters.ally.contains_name("X"));

    let b_ref = &b;
    eventually("the overlay to receive the restored roster", || async move {
        b_ref.view().await.rosters.ally.contains_name("X")
    })
    .await;
    assert_eq!(b.view().await.lanes, a.view().await.lanes);

    a.dispose().await;
    b.dispose().await;
    relay.shutdown().await;
}

#[tokio::test]
async fn live_edits_propagate_both_ways_without_echo() {
    let relay = SyncRelay::start(([127, 0, 0, 1], 0).into()).await.unwrap();
    let a = DraftEngine::create(options(&relay, true)).await;
    let b = DraftEngine::create(options(&relay, false)).await;
    connected(&a).await;
    connected(&b).await;

    a.apply_poller_snapshot(snapshot(Side::Enemy, &[1, 2, 3])).await;
    let b_ref = &b;
    eventually("B to mirror the enemy roster and lanes", || async move {
        let view = b_ref.view().await;
        view.rosters.enemy.members().len() == 3 && view.lanes.enemy.len() == 3
    })
    .await;

    // An overlay edit flows back to the primary window.
    let b_lanes = b.view().await.lanes.enemy;
    let target = Lane::Mid;
    let unit = if b_lanes.get(target) == Some("Z") { "Y" } else { "Z" };
    assert!(b.set_lane_assignment(Side::Enemy, target, Some(unit)).await);

    let a_ref = &a;
    eventually("A to apply B's override", || async move {
        a_ref.view().await.lanes.enemy.get(target) == Some(unit)
    })
    .await;

    // Both windows settle on the same state: nothing echoes back and forth.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(a.view().await.lanes, b.view().await.lanes);
    assert_eq!(a.view().await.rosters, b.view().await.rosters);

    a.dispose().await;
    b.dispose().await;
    relay.shutdown().await;
}

#[tokio::test]
async fn analysis_stream_reaches_the_overlay() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let service_addr = listener.local_addr().unwrap();
    let app = Router::new().route("/analyze", post(|| async { r#"{"ban":"Yasuo"}"# }));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let relay = SyncRelay::start(([127, 0, 0, 1], 0).into()).await.unwrap();

    let mut primary = options(&relay, true);
    primary.analysis = AnalysisConfig {
        endpoint: Some(format!("http://{}/analyze", service_addr)),
        publish_interval: Duration::from_millis(20),
        request_timeout: Some(Duration::from_secs(5)),
    };
    let a = DraftEngine::create(primary).await;
    let b = DraftEngine::create(options(&relay, false)).await;
    connected(&a).await;
    connected(&b).await;

    assert!(a.start_analysis(AnalysisMode::Draft, false).await);

    let b_ref = &b;
    eventually("B to see the completed analysis", || async move {
        matches!(
            b_ref.view().await.analysis.get(&AnalysisMode::Draft),
            Some(AnalysisResult::Complete { .. })
        )
    })
    .await;
    match b.view().await.analysis.get(&AnalysisMode::Draft) {
        Some(AnalysisResult::Complete { text, structured }) => {
            assert_eq!(text, r#"{"ban":"Yasuo"}"#);
            assert_eq!(structured, &Some(serde_json::json!({"ban": "Yasuo"})));
        }
        other => panic!("unexpected result: {other:?}"),
    }

    // Clearing the session on the primary clears the overlay too.
    a.clear_session().await;
    eventually("B to clear", || async move {
        b_ref.view().await.analysis.is_empty()
    })
    .await;

    a.dispose().await;
    b.dispose().await;
    relay.shutdown().await;
}
