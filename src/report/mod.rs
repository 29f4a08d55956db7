//! Run phases, verdicts and the reporting seam between the verifier and its output.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tracing::{info, warn};

use crate::{
    engine::{Execution, ExecutionSnapshot, ExecutionStatus},
    probe::HealthResult,
    store::StoreEvidence,
};

/// States of one verification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Init,
    Preflight,
    PreflightFailed,
    Skipped,
    Watching,
    NoExecution,
    Detected,
    Awaiting,
    Pass,
    Fail,
    Timeout,
    Unreachable,
    InvalidResponse,
    Cancelled,
    Reported,
}

impl Phase {
    pub fn allows(self, next: Phase) -> bool {
        use Phase::*;
        match self {
            Init => next == Preflight,
            Preflight => matches!(next, PreflightFailed | Skipped | Watching | Cancelled),
            Watching => matches!(next, NoExecution | Detected | Cancelled | Unreachable | InvalidResponse),
            Detected => next == Awaiting,
            Awaiting => matches!(next, Pass | Fail | Timeout | Cancelled | Unreachable | InvalidResponse),
            PreflightFailed | Skipped | NoExecution | Pass | Fail | Timeout | Unreachable | InvalidResponse
            | Cancelled => next == Reported,
            Reported => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Init => "INIT",
            Phase::Preflight => "PREFLIGHT",
            Phase::PreflightFailed => "PREFLIGHT_FAILED",
            Phase::Skipped => "SKIPPED",
            Phase::Watching => "WATCHING",
            Phase::NoExecution => "NO_EXECUTION",
            Phase::Detected => "DETECTED",
            Phase::Awaiting => "AWAITING",
            Phase::Pass => "PASS",
            Phase::Fail => "FAIL",
            Phase::Timeout => "TIMEOUT",
            Phase::Unreachable => "UNREACHABLE",
            Phase::InvalidResponse => "INVALID_RESPONSE",
            Phase::Cancelled => "CANCELLED",
            Phase::Reported => "REPORTED",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Pass,
    Fail,
    NoExecutionDetected,
    Timeout,
    PreconditionFailed,
    Unreachable,
    /// The engine answered with a payload that could not be read.
    InvalidResponse,
    Skipped,
    Cancelled,
}

impl Verdict {
    pub fn exit_code(self) -> u8 {
        match self {
            Verdict::Pass | Verdict::Skipped => 0,
            Verdict::Fail => 1,
            Verdict::PreconditionFailed => 2,
            Verdict::NoExecutionDetected | Verdict::Timeout => 3,
            Verdict::Unreachable => 4,
            Verdict::InvalidResponse => 5,
            Verdict::Cancelled => 130,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
            Verdict::NoExecutionDetected => "NO_EXECUTION_DETECTED",
            Verdict::Timeout => "TIMEOUT",
            Verdict::PreconditionFailed => "PRECONDITION_FAILED",
            Verdict::Unreachable => "UNREACHABLE",
            Verdict::InvalidResponse => "INVALID_RESPONSE",
            Verdict::Skipped => "SKIPPED",
            Verdict::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything learned during one run. Built once by the verifier.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub verdict: Verdict,
    pub health: Vec<HealthResult>,
    pub preflight_evidence: Option<StoreEvidence>,
    pub execution: Option<Execution>,
    pub final_status: Option<ExecutionStatus>,
    pub error_detail: Option<String>,
    pub evidence: Option<StoreEvidence>,
    /// Time spent waiting for the detected execution to finish.
    #[serde(serialize_with = "opt_secs")]
    pub execution_elapsed: Option<Duration>,
    #[serde(serialize_with = "secs")]
    pub elapsed: Duration,
    pub cause: Option<String>,
}

impl VerificationReport {
    pub(crate) fn new(verdict: Verdict) -> Self {
        Self {
            verdict,
            health: Vec::new(),
            preflight_evidence: None,
            execution: None,
            final_status: None,
            error_detail: None,
            evidence: None,
            execution_elapsed: None,
            elapsed: Duration::ZERO,
            cause: None,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.verdict.exit_code()
    }
}

fn secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

fn opt_secs<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_some(&d.as_secs_f64()),
        None => s.serialize_none(),
    }
}

/// Intermediate progress from the polling loops.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    Watching { elapsed: Duration },
    Awaiting { execution_id: String, status: ExecutionStatus, elapsed: Duration },
    Retrying { attempt: u32, error: String },
}

/// Receives everything the verifier wants an operator to see.
pub trait ReportSink: Send + Sync {
    fn on_phase_change(&self, _from: Phase, _to: Phase) {}
    fn on_health(&self, _result: &HealthResult) {}
    fn on_evidence(&self, _evidence: &StoreEvidence) {}
    fn on_executions(&self, _snapshot: &ExecutionSnapshot) {}
    fn on_detected(&self, _execution: &Execution) {}
    fn on_progress(&self, _progress: &Progress) {}
    fn on_report(&self, report: &VerificationReport);
}

/// Sink that only emits tracing events. Used with `--json`, where stdout carries the report.
#[derive(Debug, Default)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn on_phase_change(&self, from: Phase, to: Phase) {
        info!(%from, %to, "phase change");
    }

    fn on_health(&self, result: &HealthResult) {
        if result.ready {
            info!(system = %result.system, message = ?result.message, "ready");
        } else {
            warn!(system = %result.system, reachable = result.reachable, message = ?result.message, "not ready");
        }
    }

    fn on_detected(&self, execution: &Execution) {
        info!(execution_id = %execution.id, status = %execution.status, "new execution detected");
    }

    fn on_report(&self, report: &VerificationReport) {
        info!(verdict = %report.verdict, elapsed_secs = report.elapsed.as_secs(), "run finished");
    }
}

/// Events captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Phase(Phase, Phase),
    Health(HealthResult),
    Evidence(StoreEvidence),
    Executions(usize),
    Detected(String),
    Progress(Progress),
    Report(Verdict),
}

/// Sink that records every event in order, for assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Target phases in the order they were entered.
    pub fn phases(&self) -> Vec<Phase> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Phase(_, to) => Some(to),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl ReportSink for RecordingSink {
    fn on_phase_change(&self, from: Phase, to: Phase) {
        self.push(Event::Phase(from, to));
    }
    fn on_health(&self, result: &HealthResult) {
        self.push(Event::Health(result.clone()));
    }
    fn on_evidence(&self, evidence: &StoreEvidence) {
        self.push(Event::Evidence(evidence.clone()));
    }
    fn on_executions(&self, snapshot: &ExecutionSnapshot) {
        self.push(Event::Executions(snapshot.len()));
    }
    fn on_detected(&self, execution: &Execution) {
        self.push(Event::Detected(execution.id.clone()));
    }
    fn on_progress(&self, progress: &Progress) {
        self.push(Event::Progress(progress.clone()));
    }
    fn on_report(&self, report: &VerificationReport) {
        self.push(Event::Report(report.verdict));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions_are_allowed() {
        let path = [
            Phase::Init,
            Phase::Preflight,
            Phase::Watching,
            Phase::Detected,
            Phase::Awaiting,
            Phase::Pass,
            Phase::Reported,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].allows(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn no_watching_without_preflight_and_reported_is_terminal() {
        assert!(!Phase::Init.allows(Phase::Watching));
        assert!(!Phase::PreflightFailed.allows(Phase::Watching));
        assert!(!Phase::Watching.allows(Phase::Pass));
        assert!(!Phase::Reported.allows(Phase::Init));
    }

    #[test]
    fn exit_codes_follow_verdicts() {
        assert_eq!(Verdict::Pass.exit_code(), 0);
        assert_eq!(Verdict::Fail.exit_code(), 1);
        assert_eq!(Verdict::PreconditionFailed.exit_code(), 2);
        assert_eq!(Verdict::NoExecutionDetected.exit_code(), 3);
        assert_eq!(Verdict::Timeout.exit_code(), 3);
        assert_eq!(Verdict::Unreachable.exit_code(), 4);
        assert_eq!(Verdict::InvalidResponse.exit_code(), 5);
    }

    #[test]
    fn report_serializes_verdict_and_seconds() {
        let mut report = VerificationReport::new(Verdict::NoExecutionDetected);
        report.elapsed = Duration::from_millis(1500);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["verdict"], "NO_EXECUTION_DETECTED");
        assert_eq!(json["elapsed"], 1.5);
        assert!(json["execution_elapsed"].is_null());
    }
}
