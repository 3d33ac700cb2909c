//! Analysis Session Manager
//!
//! At most one streamed session per [`AnalysisMode`]. A session's partial
//! text is written to the store on every chunk, so local listeners see each
//! one, while bus publication is throttled to one message per
//! `publish_interval`. Terminal results are always published right away.
//!
//! ## Superseded sessions
//!
//! Each session carries the store generation it was started under. Starting,
//! cancelling or clearing a mode bumps that generation, and every store write
//! checks it under the store lock, so a chunk that races a cancellation can
//! never land.

use futures::StreamExt;
use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::source::{AnalysisRequest, AnalysisSource};
use crate::error::AnalysisError;
use crate::model::{AnalysisMode, AnalysisResult};
use crate::store::SharedStore;
use crate::timer::Timer;

/// Lifecycle of one mode's session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_running(&self) -> bool {
        matches!(self, SessionState::Running)
    }
}

struct Slot {
    state: SessionState,
    generation: u64,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

struct ManagerInner {
    store: SharedStore,
    source: Option<Arc<dyn AnalysisSource>>,
    timer: Arc<dyn Timer>,
    publish_interval: Duration,
    /// Lock order: `sessions` before the store.
    sessions: Mutex<HashMap<AnalysisMode, Slot>>,
    shutdown: CancellationToken,
}

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    pub fn new(
        store: SharedStore,
        source: Option<Arc<dyn AnalysisSource>>,
        timer: Arc<dyn Timer>,
        publish_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                store,
                source,
                timer,
                publish_interval,
                sessions: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Start a session for `mode`.
    ///
    /// Returns false without doing anything if one is already running and
    /// `force` is not set. A forced start cancels the running session first.
    pub async fn start(&self, mode: AnalysisMode, force: bool) -> bool {
        let mut sessions = self.inner.sessions.lock().await;
        if let Some(slot) = sessions.get(&mode) {
            if slot.state.is_running() {
                if !force {
                    debug!(%mode, "Analysis already running");
                    return false;
                }
                info!(%mode, "Restarting analysis");
                slot.cancel.cancel();
            }
        }

        let (generation, request) = self
            .inner
            .store
            .update(|s| {
                let generation = s.begin_analysis(mode);
                (generation, AnalysisRequest::from_store(mode, s))
            })
            .await;

        let cancel = self.inner.shutdown.child_token();
        let inner = self.inner.clone();
        let session_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let outcome = run_session(&inner, mode, generation, request, session_cancel).await;
            debug!(%mode, generation, ?outcome, "Analysis session ended");
            let mut sessions = inner.sessions.lock().await;
            if let Some(slot) = sessions.get_mut(&mode) {
                if slot.generation == generation && slot.state.is_running() {
                    slot.state = outcome;
                }
            }
        });

        sessions.insert(
            mode,
            Slot {
                state: SessionState::Running,
                generation,
                cancel,
                task: Some(task),
            },
        );
        info!(%mode, generation, "Analysis started");
        true
    }

    /// Stop the running session for `mode`. Its result keeps whatever text
    /// had accumulated. Returns false if nothing was running.
    pub async fn cancel(&self, mode: AnalysisMode) -> bool {
        let mut sessions = self.inner.sessions.lock().await;
        let Some(slot) = sessions.get_mut(&mode) else {
            return false;
        };
        if !slot.state.is_running() {
            return false;
        }

        // The task may have stored its terminal result and be waiting on
        // `sessions` to report it. That result stands.
        let generation = slot.generation;
        let finished = self
            .inner
            .store
            .update(|s| {
                let finished = s.is_current(mode, generation)
                    .then(|| s.analysis(mode).and_then(terminal_state))
                    .flatten();
                if finished.is_none() {
                    s.retire_analysis(mode);
                }
                finished
            })
            .await;
        if let Some(state) = finished {
            debug!(%mode, ?state, "Session already finished, nothing to cancel");
            slot.state = state;
            return false;
        }

        slot.cancel.cancel();
        slot.state = SessionState::Cancelled;
        info!(%mode, "Analysis cancelled");
        true
    }

    pub async fn cancel_all(&self) {
        for mode in AnalysisMode::ALL {
            self.cancel(mode).await;
        }
    }

    /// Cancel everything and forget all sessions; every mode reads Idle.
    pub async fn reset(&self) {
        self.cancel_all().await;
        self.inner.sessions.lock().await.clear();
    }

    pub async fn status(&self, mode: AnalysisMode) -> SessionState {
        self.inner
            .sessions
            .lock()
            .await
            .get(&mode)
            .map(|slot| slot.state)
            .unwrap_or_default()
    }

    /// Cancel everything and wait for the session tasks to exit.
    pub async fn shutdown(&self) {
        self.cancel_all().await;
        self.inner.shutdown.cancel();
        let tasks: Vec<_> = self
            .inner
            .sessions
            .lock()
            .await
            .values_mut()
            .filter_map(|slot| slot.task.take())
            .collect();
        for task in tasks {
            let _ = task.await;
        }
    }
}

fn terminal_state(result: &AnalysisResult) -> Option<SessionState> {
    match result {
        AnalysisResult::Streaming { .. } => None,
        AnalysisResult::Complete { .. } => Some(SessionState::Completed),
        AnalysisResult::Failed { .. } => Some(SessionState::Failed),
    }
}

async fn run_session(
    inner: &ManagerInner,
    mode: AnalysisMode,
    generation: u64,
    request: AnalysisRequest,
    cancel: CancellationToken,
) -> SessionState {
    let Some(source) = inner.source.clone() else {
        let result = AnalysisResult::failed(AnalysisError::NoSource.to_string(), String::new());
        inner
            .store
            .update(|s| s.finish_analysis(mode, generation, result))
            .await;
        return SessionState::Failed;
    };

    let opened = tokio::select! {
        _ = cancel.cancelled() => return SessionState::Cancelled,
        opened = source.open(request) => opened,
    };
    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            warn!(%mode, "Analysis request failed: {}", e);
            let result = AnalysisResult::failed(e.to_string(), String::new());
            inner
                .store
                .update(|s| s.finish_analysis(mode, generation, result))
                .await;
            return SessionState::Failed;
        }
    };

    let mut text = String::new();
    let mut throttle = Throttle::new(inner.publish_interval);
    // Trailing publish for chunks that arrived inside the throttle window.
    let mut flush: Option<BoxFuture<'static, ()>> = None;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => return SessionState::Cancelled,

            _ = async {
                if let Some(f) = flush.as_mut() {
                    f.await;
                }
            }, if flush.is_some() => {
                flush = None;
                throttle.mark(inner.timer.now());
                let current = inner
                    .store
                    .update(|s| s.publish_analysis(mode, generation))
                    .await;
                if !current {
                    return SessionState::Cancelled;
                }
            }

            chunk = stream.next() => match chunk {
                Some(Ok(chunk)) => {
                    text.push_str(&chunk);
                    let now = inner.timer.now();
                    let publish = flush.is_none() && throttle.ready(now);
                    if publish {
                        throttle.mark(now);
                    } else if flush.is_none() {
                        flush = Some(inner.timer.sleep(throttle.remaining(now)));
                    }
                    let current = inner
                        .store
                        .update(|s| s.stream_analysis(mode, generation, &text, publish))
                        .await;
                    if !current {
                        return SessionState::Cancelled;
                    }
                }
                Some(Err(e)) => {
                    warn!(%mode, received = text.len(), "Analysis stream failed: {}", e);
                    let result = AnalysisResult::failed(e.to_string(), text);
                    inner
                        .store
                        .update(|s| s.finish_analysis(mode, generation, result))
                        .await;
                    return SessionState::Failed;
                }
                None => {
                    info!(%mode, received = text.len(), "Analysis complete");
                    let result = AnalysisResult::complete(text);
                    inner
                        .store
                        .update(|s| s.finish_analysis(mode, generation, result))
                        .await;
                    return SessionState::Completed;
                }
            },
        }
    }
}

/// Leading-edge rate limit for bus publication.
#[derive(Debug)]
struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    fn ready(&self, now: Instant) -> bool {
        self.last
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval)
    }

    fn remaining(&self, now: Instant) -> Duration {
        self.last
            .map(|last| {
                self.interval
                    .saturating_sub(now.saturating_duration_since(last))
            })
            .unwrap_or_default()
    }

    fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }
}
