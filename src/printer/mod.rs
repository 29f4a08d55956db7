//! Console output: colored status lines, execution tables and the markdown report (termimad).

use std::fmt::Write as _;
use std::io::{self, Write};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use termimad::MadSkin;
use tokio::sync::oneshot;
use unicode_width::UnicodeWidthChar;

use crate::{
    engine::{Execution, ExecutionSnapshot, Workflow},
    probe::HealthResult,
    report::{Phase, Progress, ReportSink, Verdict, VerificationReport},
    store::StoreEvidence,
    verifier::Confirm,
};

const RULE_WIDTH: usize = 80;

pub struct MarkdownPrinter {
    pub skin: MadSkin,
}

impl Default for MarkdownPrinter {
    fn default() -> Self {
        Self { skin: MadSkin::default() }
    }
}

impl MarkdownPrinter {
    pub fn print(&self, text: &str) {
        self.skin.print_text(text);
        println!();
    }
}

/// Human-facing sink: prints phases, probe results and progress as they happen.
pub struct ConsoleSink {
    markdown: MarkdownPrinter,
    /// Progress lines overwrite themselves with `\r` only on a terminal.
    inline_progress: bool,
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self { markdown: MarkdownPrinter::default(), inline_progress: io::stdout().is_terminal() }
    }

    fn end_progress_line(&self) {
        if self.inline_progress {
            println!();
        }
    }
}

impl ReportSink for ConsoleSink {
    fn on_phase_change(&self, _from: Phase, to: Phase) {
        match to {
            Phase::Preflight => println!("\n📋 Running Pre-Flight Checks\n"),
            Phase::PreflightFailed => {
                println!("\n{}", "❌ Pre-flight checks failed. Fix issues above before testing.".red())
            }
            Phase::Watching => {
                println!("\n👀 Monitoring for workflow execution...");
                println!("   Upload an audio file to the watched Google Drive folder to trigger");
            }
            Phase::Skipped => println!("\n👋 Monitoring skipped. Run anytime to check pipeline health."),
            Phase::NoExecution => {
                self.end_progress_line();
                println!("{}", "⏱️  Timeout reached. No new execution detected.".yellow());
            }
            Phase::Awaiting => println!("\n⏳ Waiting for execution to complete..."),
            Phase::Pass
            | Phase::Fail
            | Phase::Timeout
            | Phase::Cancelled
            | Phase::Unreachable
            | Phase::InvalidResponse => {
                self.end_progress_line()
            }
            _ => {}
        }
    }

    fn on_health(&self, result: &HealthResult) {
        print!("{}", render_health(result));
    }

    fn on_evidence(&self, evidence: &StoreEvidence) {
        print!("{}", render_evidence(evidence));
    }

    fn on_executions(&self, snapshot: &ExecutionSnapshot) {
        println!("\n{}", "=".repeat(RULE_WIDTH));
        println!("📊 Last {} workflow executions\n", snapshot.len());
        print!("{}", render_executions(&snapshot.executions));
    }

    fn on_detected(&self, execution: &Execution) {
        self.end_progress_line();
        println!("\n{}", "🎉 New execution detected!".green());
        println!("   ID: {}", execution.id);
        println!("   Status: {}", execution.status);
        println!("   Started: {}", format_timestamp(execution.started_at));
    }

    fn on_progress(&self, progress: &Progress) {
        let line = match progress {
            Progress::Watching { elapsed } => format!("   Waiting... ({}s elapsed)", elapsed.as_secs()),
            Progress::Awaiting { status, elapsed, .. } => {
                format!("   Status: {status} ({}s elapsed)", elapsed.as_secs())
            }
            Progress::Retrying { attempt, error } => {
                format!("   ⚠️  poll failed (attempt {attempt}): {error}")
            }
        };
        if self.inline_progress && !matches!(progress, Progress::Retrying { .. }) {
            print!("\r{line}");
            io::stdout().flush().ok();
        } else {
            println!("{line}");
        }
    }

    fn on_report(&self, report: &VerificationReport) {
        println!("\n{}", "=".repeat(RULE_WIDTH));
        self.markdown.print(&render_report(report));
        let headline = format!("{} {}", verdict_icon(report.verdict), report.verdict);
        match report.verdict {
            Verdict::Pass => println!("{}", headline.green().bold()),
            Verdict::Skipped => println!("{}", headline.bold()),
            Verdict::Fail | Verdict::PreconditionFailed | Verdict::Unreachable | Verdict::InvalidResponse => {
                println!("{}", headline.red().bold())
            }
            _ => println!("{}", headline.yellow().bold()),
        }
    }
}

/// Reads a y/n answer from stdin; refuses when stdin is not a terminal unless `assume_yes`.
pub struct StdinConfirm {
    pub assume_yes: bool,
}

#[async_trait]
impl Confirm for StdinConfirm {
    async fn confirm(&self, question: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        if !io::stdin().is_terminal() {
            eprintln!("stdin is not a terminal; pass --yes to monitor without a prompt");
            return false;
        }
        print!("\n{question} (y/n): ");
        io::stdout().flush().ok();

        // Detached thread: an unanswered read_line must not hold up runtime shutdown on Ctrl-C.
        let (tx, rx) = oneshot::channel();
        std::thread::spawn(move || {
            let mut answer = String::new();
            let yes = io::stdin().read_line(&mut answer).is_ok() && is_yes(&answer);
            let _ = tx.send(yes);
        });
        rx.await.unwrap_or(false)
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

pub fn verdict_icon(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Pass => "✅",
        Verdict::Fail | Verdict::PreconditionFailed | Verdict::Unreachable | Verdict::InvalidResponse => "❌",
        Verdict::NoExecutionDetected | Verdict::Timeout => "⏱️",
        Verdict::Skipped => "👋",
        Verdict::Cancelled => "🛑",
    }
}

/// `42s` under a minute, `3m 7s` otherwise.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

pub fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

/// Truncates then pads `s` to exactly `width` terminal columns.
pub fn fit(s: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for c in s.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > width {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push_str(&" ".repeat(width - used));
    out
}

pub fn render_health(result: &HealthResult) -> String {
    let mut out = String::new();
    let message = result.message.as_deref().unwrap_or("");
    if result.ready {
        let _ = writeln!(out, "{} {}: {}", "✅".green(), result.system, message);
    } else if result.reachable {
        let _ = writeln!(out, "{} {}: {}", "⚠️ ".yellow(), result.system, message.yellow());
    } else {
        let _ = writeln!(out, "{} {}: {}", "❌".red(), result.system, message.red());
    }
    for line in &result.details {
        let _ = writeln!(out, "   {line}");
    }
    out
}

pub fn render_evidence(evidence: &StoreEvidence) -> String {
    let mut out = String::new();
    match evidence {
        StoreEvidence::Available(records) => {
            let _ = writeln!(out, "✅ document store accessible");
            let _ = writeln!(out, "   Recent entries: {}", records.len());
            for r in records {
                let created = r
                    .created_time
                    .map(|t| t.format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                let _ = writeln!(out, "   - {} (created: {created})", fit(&r.title, 50).trim_end());
            }
        }
        StoreEvidence::Unavailable(reason) => {
            let _ = writeln!(out, "⚠️  document store unavailable: {reason}");
        }
    }
    out
}

pub fn render_executions(executions: &[Execution]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}{}{}{}", fit("Status", 13), fit("Started", 20), fit("Duration", 10), "Workflow");
    let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
    if executions.is_empty() {
        let _ = writeln!(out, "(no executions)");
    }
    for e in executions {
        let duration = e
            .duration()
            .and_then(|d| d.to_std().ok())
            .map(format_duration)
            .unwrap_or_else(|| "N/A".to_string());
        let status = format!("{} {}", e.status.icon(), e.status);
        let _ = writeln!(
            out,
            "{}{}{}{}",
            fit(&status, 13),
            fit(&format_timestamp(e.started_at), 20),
            fit(&duration, 10),
            fit(e.workflow_name().unwrap_or("Unknown"), 30).trim_end()
        );
    }
    out
}

pub fn render_workflows(workflows: &[Workflow]) -> String {
    let mut out = String::new();
    for wf in workflows {
        let status = if wf.active { "🟢 Active" } else { "⚪ Inactive" };
        let _ = writeln!(out, "   {status} | {} | {}", wf.id, wf.name);
    }
    if workflows.is_empty() {
        let _ = writeln!(out, "   (no workflows)");
    }
    out
}

/// Markdown summary of a finished run.
pub fn render_report(report: &VerificationReport) -> String {
    let mut md = String::from("## Verification report\n\n|Item|Value|\n|-|-|\n");
    let _ = writeln!(md, "|Verdict|**{}**|", report.verdict);
    for h in &report.health {
        let state = if h.ready { "ready" } else if h.reachable { "not ready" } else { "unreachable" };
        let _ = writeln!(md, "|{}|{}|", h.system, state);
    }
    if let Some(e) = &report.execution {
        let _ = writeln!(md, "|Execution|{}|", e.id);
        if let Some(name) = e.workflow_name() {
            let _ = writeln!(md, "|Workflow|{}|", escape_cell(name));
        }
    }
    if let Some(status) = &report.final_status {
        let _ = writeln!(md, "|Final status|{} {}|", status.icon(), status);
    }
    if let Some(d) = report.execution_elapsed {
        let _ = writeln!(md, "|Execution wait|{}|", format_duration(d));
    }
    let _ = writeln!(md, "|Elapsed|{}|", format_duration(report.elapsed));
    match &report.evidence {
        Some(StoreEvidence::Available(records)) => {
            let newest = records.first().map(|r| escape_cell(&r.title)).unwrap_or_else(|| "-".into());
            let _ = writeln!(md, "|Newest record|{newest}|");
        }
        Some(StoreEvidence::Unavailable(reason)) => {
            let _ = writeln!(md, "|Document store|unavailable: {}|", escape_cell(reason));
        }
        None => {}
    }
    if let Some(cause) = &report.cause {
        let _ = writeln!(md, "\n**Cause:** {cause}");
    }
    if let Some(detail) = &report.error_detail {
        let _ = writeln!(md, "\n**Error details:** {detail}");
    }
    md
}

fn escape_cell(s: &str) -> String {
    s.replace('|', "\\|")
}
