use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ExecutionLister, MAX_CONSECUTIVE_FAILURES};
use crate::{
    clock::Clock,
    engine::Execution,
    error::Result,
    report::{Progress, ReportSink},
};

#[derive(Debug, Clone, PartialEq)]
pub enum WatchOutcome {
    /// A new execution appeared at the head of the log. Says nothing about its outcome.
    Detected(Execution),
    TimedOut { elapsed: Duration },
    Cancelled { elapsed: Duration },
}

/// Detects the appearance of a new execution by comparing the newest id of
/// successive one-element snapshots against a baseline.
///
/// Granularity: if two executions start within one poll interval only the
/// most recent one is observed.
pub struct ExecutionWatcher {
    lister: ExecutionLister,
    clock: Arc<dyn Clock>,
}

impl ExecutionWatcher {
    pub fn new(lister: ExecutionLister, clock: Arc<dyn Clock>) -> Self {
        Self { lister, clock }
    }

    pub async fn watch(
        &self,
        poll_interval: Duration,
        timeout: Duration,
        cancel: &CancellationToken,
        sink: &dyn ReportSink,
    ) -> Result<WatchOutcome> {
        let start = self.clock.now();
        if cancel.is_cancelled() {
            return Ok(WatchOutcome::Cancelled { elapsed: Duration::ZERO });
        }

        let baseline = self.lister.list(1).await?;
        let baseline_id = baseline.newest_id().map(str::to_string);
        info!(baseline = ?baseline_id, timeout_secs = timeout.as_secs(), "watching for new execution");

        let mut failures = 0u32;
        loop {
            let elapsed = self.clock.now().saturating_sub(start);
            if elapsed >= timeout {
                info!(elapsed_secs = elapsed.as_secs(), "no new execution before timeout");
                return Ok(WatchOutcome::TimedOut { elapsed });
            }

            let nap = poll_interval.min(timeout - elapsed);
            if self.clock.sleep(nap, cancel).await.is_err() {
                let elapsed = self.clock.now().saturating_sub(start);
                info!(elapsed_secs = elapsed.as_secs(), "watch cancelled");
                return Ok(WatchOutcome::Cancelled { elapsed });
            }

            match self.lister.list(1).await {
                Ok(snapshot) => {
                    failures = 0;
                    if let Some(newest) = snapshot.newest() {
                        if baseline_id.as_deref() != Some(newest.id.as_str()) {
                            info!(execution_id = %newest.id, status = %newest.status, "new execution detected");
                            return Ok(WatchOutcome::Detected(newest.clone()));
                        }
                    }
                    let elapsed = self.clock.now().saturating_sub(start);
                    debug!(elapsed_secs = elapsed.as_secs(), "no change");
                    sink.on_progress(&Progress::Watching { elapsed });
                }
                Err(e) if !e.is_retryable() => {
                    warn!(error = %e, "engine response unusable; not retrying");
                    return Err(e);
                }
                Err(e) => {
                    failures += 1;
                    warn!(attempt = failures, error = %e, "execution poll failed");
                    if failures >= MAX_CONSECUTIVE_FAILURES {
                        return Err(e);
                    }
                    sink.on_progress(&Progress::Retrying { attempt: failures, error: e.to_string() });
                }
            }
        }
    }
}
