use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::MAX_CONSECUTIVE_FAILURES;
use crate::{
    clock::Clock,
    engine::{Execution, ExecutionStatus, WorkflowEngine},
    error::Result,
    report::{Progress, ReportSink},
};

#[derive(Debug, Clone, PartialEq)]
pub enum AwaitOutcome {
    /// The execution reached `success` or `error`.
    Done { execution: Execution, elapsed: Duration },
    /// Deadline hit while still pending. The execution may still be running.
    TimedOut { last_status: Option<ExecutionStatus>, elapsed: Duration },
    Cancelled { elapsed: Duration },
}

/// Polls one execution until it is terminal, the deadline passes, or the run is cancelled.
pub struct ExecutionAwaiter {
    engine: Arc<dyn WorkflowEngine>,
    clock: Arc<dyn Clock>,
}

impl ExecutionAwaiter {
    pub fn new(engine: Arc<dyn WorkflowEngine>, clock: Arc<dyn Clock>) -> Self {
        Self { engine, clock }
    }

    /// Each round sleeps `poll_interval` and then fetches, so a run that is
    /// terminal on the N-th poll reports `elapsed == N * poll_interval`.
    pub async fn await_terminal(
        &self,
        execution_id: &str,
        poll_interval: Duration,
        timeout: Duration,
        cancel: &CancellationToken,
        sink: &dyn ReportSink,
    ) -> Result<AwaitOutcome> {
        let start = self.clock.now();
        let mut last_status = None;
        let mut failures = 0u32;
        info!(execution_id, timeout_secs = timeout.as_secs(), "waiting for execution to complete");

        loop {
            let elapsed = self.clock.now().saturating_sub(start);
            if elapsed >= timeout {
                warn!(execution_id, elapsed_secs = elapsed.as_secs(), status = ?last_status, "execution still pending at timeout");
                return Ok(AwaitOutcome::TimedOut { last_status, elapsed });
            }

            let nap = poll_interval.min(timeout - elapsed);
            if self.clock.sleep(nap, cancel).await.is_err() {
                let elapsed = self.clock.now().saturating_sub(start);
                return Ok(AwaitOutcome::Cancelled { elapsed });
            }

            match self.engine.get_execution(execution_id, false).await {
                Ok(execution) => {
                    failures = 0;
                    let elapsed = self.clock.now().saturating_sub(start);
                    if execution.status.is_terminal() {
                        info!(execution_id, status = %execution.status, elapsed_secs = elapsed.as_secs(), "execution finished");
                        return Ok(AwaitOutcome::Done { execution, elapsed });
                    }
                    debug!(execution_id, status = %execution.status, "still pending");
                    sink.on_progress(&Progress::Awaiting {
                        execution_id: execution_id.to_string(),
                        status: execution.status.clone(),
                        elapsed,
                    });
                    last_status = Some(execution.status);
                }
                Err(e) if !e.is_retryable() => {
                    warn!(execution_id, error = %e, "engine response unusable; not retrying");
                    return Err(e);
                }
                Err(e) => {
                    failures += 1;
                    warn!(execution_id, attempt = failures, error = %e, "execution fetch failed");
                    if failures >= MAX_CONSECUTIVE_FAILURES {
                        return Err(e);
                    }
                    sink.on_progress(&Progress::Retrying { attempt: failures, error: e.to_string() });
                }
            }
        }
    }
}
