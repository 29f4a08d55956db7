mod cli;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use pipewatch::{
    clock::TokioClock,
    config::{Config, Settings},
    engine::{N8nClient, WorkflowEngine},
    printer::{render_executions, render_workflows, ConsoleSink, StdinConfirm},
    report::{LogSink, ReportSink, Verdict},
    store::{DocumentStore, DocumentStoreProbe, NotionClient},
    verifier::{PipelineVerifier, VerifyOptions},
    VerifyError,
};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = cli::Cli::parse();

    // Logs go to stderr so stdout stays clean for the report
    let default_filter = if args.verbose { "pipewatch=debug,info" } else { "pipewatch=info,warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut cfg = Config::load();
    if let Some(name) = &args.workflow {
        cfg.set("WORKFLOW_NAME", name.clone());
    }

    let settings = match Settings::from_config(&cfg) {
        Ok(s) => s,
        Err(e @ VerifyError::Config(_)) => {
            eprintln!("{} {}", "❌".red(), e);
            return Ok(ExitCode::from(Verdict::PreconditionFailed.exit_code()));
        }
        Err(e) => return Err(e.into()),
    };

    let engine: Arc<dyn WorkflowEngine> =
        Arc::new(N8nClient::from_settings(&settings.engine).context("failed to build n8n client")?);

    // Shortcuts
    if args.list_workflows {
        let workflows = engine.list_workflows().await.context("failed to list workflows")?;
        println!("📋 Workflows on {}:", settings.engine.base_url);
        print!("{}", render_workflows(&workflows));
        return Ok(ExitCode::SUCCESS);
    }
    if let Some(limit) = args.executions {
        let executions = engine.list_executions(limit).await.context("failed to list executions")?;
        print!("{}", render_executions(&executions));
        return Ok(ExitCode::SUCCESS);
    }

    let store = NotionClient::from_settings(&settings.store)
        .context("failed to build Notion client")?
        .map(|c| Arc::new(c) as Arc<dyn DocumentStore>);
    if store.is_none() {
        warn!("NOTION_API_TOKEN or NOTION_DATABASE_ID not set; document store checks disabled");
    }

    let options = VerifyOptions {
        watch_interval: Duration::from_secs(args.watch_interval),
        watch_timeout: Duration::from_secs(args.watch_timeout),
        await_interval: Duration::from_secs(args.await_interval),
        await_timeout: Duration::from_secs(args.await_timeout),
        history_limit: args.history,
        page_size: args.page_size,
    };
    let verifier = PipelineVerifier::new(
        engine,
        DocumentStoreProbe::new(store),
        Arc::new(TokioClock::new()),
        &settings,
        options,
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let sink: Box<dyn ReportSink> = if args.json { Box::new(LogSink) } else { Box::new(ConsoleSink::new()) };
    // --json has no prompt: the operator cannot see one
    let confirm = StdinConfirm { assume_yes: args.yes || args.json };
    let report = verifier.run(sink.as_ref(), &confirm, &cancel).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report).context("failed to serialize report")?);
    }
    Ok(ExitCode::from(report.exit_code()))
}
