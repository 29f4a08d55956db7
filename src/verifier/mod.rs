//! Orchestrates pre-flight, watch, await and post-flight into one verdict.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    clock::Clock,
    config::Settings,
    engine::{ExecutionStatus, WorkflowEngine},
    error::VerifyError,
    monitor::{AwaitOutcome, ExecutionAwaiter, ExecutionLister, ExecutionWatcher, WatchOutcome},
    probe::{check_environment, workflow_active, HealthProbe},
    report::{Phase, ReportSink, Verdict, VerificationReport},
    store::DocumentStoreProbe,
};

pub const CONFIRM_QUESTION: &str = "Monitor for new workflow execution?";

#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub watch_interval: Duration,
    pub watch_timeout: Duration,
    pub await_interval: Duration,
    pub await_timeout: Duration,
    /// Executions listed for the operator before watching starts.
    pub history_limit: usize,
    pub page_size: usize,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            watch_interval: Duration::from_secs(10),
            watch_timeout: Duration::from_secs(600),
            await_interval: Duration::from_secs(5),
            await_timeout: Duration::from_secs(600),
            history_limit: 10,
            page_size: 5,
        }
    }
}

/// Gate between a green pre-flight and the watch phase. Raced against cancellation.
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, question: &str) -> bool;
}

/// Answers every question with a fixed value.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

#[async_trait]
impl Confirm for AutoConfirm {
    async fn confirm(&self, _question: &str) -> bool {
        self.0
    }
}

pub struct PipelineVerifier {
    engine: Arc<dyn WorkflowEngine>,
    store: DocumentStoreProbe,
    clock: Arc<dyn Clock>,
    probe: HealthProbe,
    workflow_name: String,
    credentials: Vec<(String, Option<String>)>,
    options: VerifyOptions,
}

struct Run<'a> {
    phase: Phase,
    sink: &'a dyn ReportSink,
}

impl Run<'_> {
    fn advance(&mut self, to: Phase) {
        debug_assert!(self.phase.allows(to), "illegal transition {} -> {}", self.phase, to);
        info!(from = %self.phase, %to, "phase change");
        self.sink.on_phase_change(self.phase, to);
        self.phase = to;
    }
}

impl PipelineVerifier {
    pub fn new(
        engine: Arc<dyn WorkflowEngine>,
        store: DocumentStoreProbe,
        clock: Arc<dyn Clock>,
        settings: &Settings,
        options: VerifyOptions,
    ) -> Self {
        Self {
            engine,
            store,
            clock,
            probe: HealthProbe::new(settings.probe_timeout),
            workflow_name: settings.engine.workflow_name.clone(),
            credentials: settings.credentials.clone(),
            options,
        }
    }

    pub async fn run(
        &self,
        sink: &dyn ReportSink,
        confirm: &dyn Confirm,
        cancel: &CancellationToken,
    ) -> VerificationReport {
        let started = self.clock.now();
        let mut run = Run { phase: Phase::Init, sink };
        let mut report = self.execute(&mut run, confirm, cancel).await;

        if report.execution.is_some() && report.verdict != Verdict::Cancelled {
            let evidence = self.store.query_recent(self.options.page_size).await;
            sink.on_evidence(&evidence);
            report.evidence = Some(evidence);
        }

        run.advance(Phase::Reported);
        report.elapsed = self.clock.now().saturating_sub(started);
        sink.on_report(&report);
        report
    }

    async fn execute(
        &self,
        run: &mut Run<'_>,
        confirm: &dyn Confirm,
        cancel: &CancellationToken,
    ) -> VerificationReport {
        let mut report = VerificationReport::new(Verdict::PreconditionFailed);

        // Pre-flight: probes run concurrently, each under its own timeout
        run.advance(Phase::Preflight);
        let (engine_health, evidence) = tokio::join!(
            self.probe.check(
                self.engine.system(),
                self.engine.list_workflows(),
                workflow_active(&self.workflow_name),
            ),
            self.store.query_recent(self.options.page_size),
        );
        let env_health = check_environment(&self.credentials);
        for result in [&engine_health, &env_health] {
            run.sink.on_health(result);
        }
        run.sink.on_evidence(&evidence);
        report.health = vec![engine_health, env_health];
        report.preflight_evidence = Some(evidence);

        let failed: Vec<String> = report
            .health
            .iter()
            .filter(|h| !h.ready)
            .map(|h| format!("{}: {}", h.system, h.message.as_deref().unwrap_or("not ready")))
            .collect();
        if !failed.is_empty() {
            run.advance(Phase::PreflightFailed);
            report.cause = Some(failed.join("; "));
            return report;
        }

        let lister = ExecutionLister::new(self.engine.clone());
        if self.options.history_limit > 0 {
            match lister.list(self.options.history_limit).await {
                Ok(snapshot) => run.sink.on_executions(&snapshot),
                Err(e) => warn!(error = %e, "could not list recent executions"),
            }
        }

        let answer = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            answer = confirm.confirm(CONFIRM_QUESTION) => Some(answer),
        };
        if answer.is_none() || cancel.is_cancelled() {
            run.advance(Phase::Cancelled);
            report.verdict = Verdict::Cancelled;
            report.cause = Some("cancelled before monitoring started".into());
            return report;
        }
        if answer == Some(false) {
            run.advance(Phase::Skipped);
            report.verdict = Verdict::Skipped;
            report.cause = Some("monitoring skipped by operator".into());
            return report;
        }

        run.advance(Phase::Watching);
        let watcher = ExecutionWatcher::new(lister, self.clock.clone());
        let watched = watcher
            .watch(self.options.watch_interval, self.options.watch_timeout, cancel, run.sink)
            .await;
        let detected = match watched {
            Ok(WatchOutcome::Detected(execution)) => execution,
            Ok(WatchOutcome::TimedOut { elapsed }) => {
                run.advance(Phase::NoExecution);
                report.verdict = Verdict::NoExecutionDetected;
                report.cause = Some(format!("no new execution within {}s", elapsed.as_secs()));
                return report;
            }
            Ok(WatchOutcome::Cancelled { .. }) => {
                run.advance(Phase::Cancelled);
                report.verdict = Verdict::Cancelled;
                report.cause = Some("watch cancelled".into());
                return report;
            }
            Err(e) => {
                fail_on_error(run, &mut report, &e);
                return report;
            }
        };

        run.advance(Phase::Detected);
        run.sink.on_detected(&detected);
        let execution_id = detected.id.clone();
        report.execution = Some(detected);

        run.advance(Phase::Awaiting);
        let awaiter = ExecutionAwaiter::new(self.engine.clone(), self.clock.clone());
        let awaited = awaiter
            .await_terminal(
                &execution_id,
                self.options.await_interval,
                self.options.await_timeout,
                cancel,
                run.sink,
            )
            .await;

        match awaited {
            Ok(AwaitOutcome::Done { execution, elapsed }) => {
                report.execution_elapsed = Some(elapsed);
                report.final_status = Some(execution.status.clone());
                if execution.status == ExecutionStatus::Success {
                    run.advance(Phase::Pass);
                    report.verdict = Verdict::Pass;
                } else {
                    run.advance(Phase::Fail);
                    report.verdict = Verdict::Fail;
                    report.error_detail = self.error_detail(&execution_id).await;
                    report.cause = Some(format!("execution {execution_id} ended with status {}", execution.status));
                }
                report.execution = Some(execution);
            }
            Ok(AwaitOutcome::TimedOut { last_status, elapsed }) => {
                run.advance(Phase::Timeout);
                report.verdict = Verdict::Timeout;
                report.execution_elapsed = Some(elapsed);
                let status = last_status.as_ref().map(|s| s.as_str()).unwrap_or("unknown");
                report.cause = Some(format!(
                    "execution {execution_id} still {status} after {}s; it may still be running",
                    elapsed.as_secs()
                ));
                report.final_status = last_status;
            }
            Ok(AwaitOutcome::Cancelled { elapsed }) => {
                run.advance(Phase::Cancelled);
                report.verdict = Verdict::Cancelled;
                report.execution_elapsed = Some(elapsed);
                report.cause = Some("await cancelled".into());
            }
            Err(e) => fail_on_error(run, &mut report, &e),
        }
        report
    }

    async fn error_detail(&self, execution_id: &str) -> Option<String> {
        match self.engine.get_execution(execution_id, true).await {
            Ok(execution) => execution.error_message(),
            Err(e) => {
                warn!(execution_id, error = %e, "could not fetch error details");
                None
            }
        }
    }
}

/// Poll loops give up with either a dead engine or an unreadable payload.
fn fail_on_error(run: &mut Run<'_>, report: &mut VerificationReport, e: &VerifyError) {
    let (phase, verdict) = if e.is_retryable() {
        (Phase::Unreachable, Verdict::Unreachable)
    } else {
        (Phase::InvalidResponse, Verdict::InvalidResponse)
    };
    run.advance(phase);
    report.verdict = verdict;
    report.cause = Some(e.to_string());
}
