use clap::{ArgGroup, Parser};

#[derive(Parser, Debug, Clone)]
#[command(name = "pipewatch", about = "Verify that the n8n transcription pipeline is deployed and executing", version)]
#[command(group(ArgGroup::new("shortcut").args(["list_workflows", "executions"]).multiple(false)))]
pub struct Cli {
    /// Skip the confirmation prompt and start monitoring right after pre-flight.
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Seconds to wait for a new execution to appear.
    #[arg(long = "watch-timeout", default_value_t = 600)]
    pub watch_timeout: u64,

    /// Seconds between execution-log polls while watching.
    #[arg(long = "watch-interval", default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub watch_interval: u64,

    /// Seconds to wait for a detected execution to finish.
    #[arg(long = "await-timeout", default_value_t = 600)]
    pub await_timeout: u64,

    /// Seconds between status polls of the detected execution.
    #[arg(long = "await-interval", default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub await_interval: u64,

    /// Recent executions shown before monitoring (0 to skip).
    #[arg(long, default_value_t = 10)]
    pub history: usize,

    /// Document store records fetched per probe.
    #[arg(long = "page-size", default_value_t = 5)]
    pub page_size: usize,

    /// Name fragment of the monitored workflow (overrides WORKFLOW_NAME).
    #[arg(long)]
    pub workflow: Option<String>,

    /// Print the final report as JSON on stdout; progress goes to the log.
    #[arg(long)]
    pub json: bool,

    /// Debug logging on stderr.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// List workflows on the engine and exit.
    #[arg(long = "list-workflows")]
    pub list_workflows: bool,

    /// Show the most recent executions and exit.
    #[arg(long, value_name = "N", num_args = 0..=1, default_missing_value = "10")]
    pub executions: Option<usize>,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
