//! CLI command definitions for pairforge.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use crate::export::DatasetWriter;
use crate::inputs;
use crate::llm::WorkersAiClient;
use crate::scheduler::{RetryPolicy, WorkerPool, WorkerPoolConfig, DEFAULT_WORKERS};
use crate::shutdown::ShutdownController;
use crate::store::ResultStore;

/// Default model to run prompts against.
const DEFAULT_MODEL: &str = "@cf/meta/llama-3-8b-instruct";

/// Default output path for the generated dataset.
const DEFAULT_OUTPUT: &str = "normal_data.json";

/// Chat-pair dataset generator for fine-tuning data.
#[derive(Parser)]
#[command(name = "pairforge")]
#[command(about = "Generate user/assistant chat pairs from prompt lists")]
#[command(version)]
#[command(
    long_about = "pairforge fans a list of prompts out to a completion API through a fixed pool of workers, retries transient failures, and accumulates one {user, assistant} pair per prompt into a JSON dataset.\n\nThe dataset is saved on completion and on interrupt (ctrl-c / SIGTERM).\n\nExample usage:\n  pairforge generate --prompts prompts.json --references references.json --output normal_data.json"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the generation pipeline over the input lists.
    #[command(alias = "gen")]
    Generate(GenerateArgs),
}

/// Arguments for `pairforge generate`.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// JSON file holding the array of prompts.
    #[arg(short, long)]
    pub prompts: String,

    /// JSON file holding the array of reference examples (same length).
    #[arg(short, long)]
    pub references: String,

    /// Output path for the generated dataset.
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    pub output: String,

    /// Model ID appended to the API base URL.
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Number of concurrent workers.
    #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Completion API base URL (model ID is appended).
    #[arg(long, env = "WORKERS_AI_API_BASE")]
    pub api_base: String,

    /// Bearer token for the completion API.
    #[arg(long, env = "WORKERS_AI_API_TOKEN", hide_env_values = true)]
    pub api_token: String,

    /// Maximum completion attempts per prompt. 0 retries forever.
    #[arg(long, default_value_t = 0)]
    pub max_attempts: u32,

    /// Wait before the first retry, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub backoff_ms: u64,

    /// Backoff growth factor per retry. 1.0 keeps the wait fixed.
    #[arg(long, default_value_t = 1.0)]
    pub backoff_multiplier: f64,

    /// Cap on the grown backoff, in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    pub max_backoff_ms: u64,

    /// Randomize each backoff to decorrelate workers.
    #[arg(long)]
    pub jitter: bool,

    /// Where to write prompts that exhausted --max-attempts.
    #[arg(long)]
    pub dead_letter: Option<String>,
}

/// Parses command-line arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parses arguments and runs the selected command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Runs the selected command with already-parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate(args) => run_generate(args).await,
    }
}

async fn run_generate(args: GenerateArgs) -> anyhow::Result<()> {
    let tasks = inputs::load_tasks(&args.prompts, &args.references)
        .context("Failed to load input lists")?;
    info!(tasks = tasks.len(), model = %args.model, "Loaded input lists");

    let store = Arc::new(ResultStore::new());
    let controller = Arc::new(ShutdownController::new(
        Arc::clone(&store),
        DatasetWriter::new(&args.output),
    ));
    // Lives for the whole process; on SIGINT/SIGTERM it persists and exits.
    let _listener = controller.spawn_signal_listener();

    let mut retry = RetryPolicy::default()
        .with_initial_backoff(Duration::from_millis(args.backoff_ms))
        .with_backoff_multiplier(args.backoff_multiplier)
        .with_max_backoff(Duration::from_millis(args.max_backoff_ms))
        .with_jitter(args.jitter);
    if args.max_attempts > 0 {
        retry = retry.with_max_attempts(args.max_attempts);
    }

    let mut config = WorkerPoolConfig::new(&args.model)
        .with_num_workers(args.workers)
        .with_retry(retry);
    if let Some(ref path) = args.dead_letter {
        config = config.with_dead_letter_path(path);
    }

    let client = Arc::new(WorkersAiClient::new(&args.api_base, &args.api_token));
    let pool = WorkerPool::new(config, client, Arc::clone(&store));
    // Persist whatever completed even if the pool itself errors out.
    let run_result = pool.run(tasks).await;
    controller.finalize();
    let stats = run_result?;
    info!(
        completed = stats.tasks_completed,
        dead_lettered = stats.tasks_dead_lettered,
        output = %args.output,
        "Processing complete"
    );
    Ok(())
}
