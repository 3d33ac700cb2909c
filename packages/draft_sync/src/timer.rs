//! Timer port
//!
//! Everything that waits on the clock (bus reconnect backoff, analysis
//! publish throttling) goes through [`Timer`] so tests can drive time by hand.

use futures::future::BoxFuture;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

pub trait Timer: Send + Sync + 'static {
    fn now(&self) -> Instant;

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Wall-clock timer backed by the tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimer;

impl Timer for TokioTimer {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Virtual timer that only moves when [`ManualTimer::advance`] is called.
pub struct ManualTimer {
    origin: Instant,
    elapsed: Mutex<Duration>,
    tick: watch::Sender<Duration>,
}

impl Default for ManualTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualTimer {
    pub fn new() -> Self {
        let (tick, _) = watch::channel(Duration::ZERO);
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            tick,
        }
    }

    fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move virtual time forward, waking every sleeper whose deadline passed.
    pub fn advance(&self, by: Duration) {
        let now = {
            let mut elapsed = self.elapsed.lock().unwrap_or_else(|e| e.into_inner());
            *elapsed += by;
            *elapsed
        };
        self.tick.send_replace(now);
    }
}

impl Timer for ManualTimer {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        let deadline = self.elapsed() + duration;
        let mut rx = self.tick.subscribe();
        Box::pin(async move {
            // A closed channel means the timer is gone; never wake.
            let woke = rx.wait_for(|now| *now >= deadline).await.is_ok();
            if !woke {
                std::future::pending::<()>().await;
            }
        })
    }
}
