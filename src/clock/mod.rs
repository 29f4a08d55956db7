//! Injectable, cancellable time source for the polling loops.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A sleep was interrupted by its cancellation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic time since the clock was created.
    fn now(&self) -> Duration;

    /// Sleeps for `duration`, returning early with [`Cancelled`] if `cancel` fires.
    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> Result<(), Cancelled>;
}

/// Wall-clock implementation backed by the tokio timer.
#[derive(Debug)]
pub struct TokioClock {
    start: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self { start: tokio::time::Instant::now() }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> Result<(), Cancelled> {
        tokio::select! {
            _ = cancel.cancelled() => Err(Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

/// Virtual clock: sleeping advances time instantly. Used to simulate long
/// watch windows deterministically.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
    sleeps: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Number of completed sleeps, i.e. poll rounds driven through this clock.
    pub fn sleeps(&self) -> u64 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> Result<(), Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        self.advance(duration);
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        // let other tasks (e.g. a canceller) observe the new time
        tokio::task::yield_now().await;
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        Ok(())
    }
}
