//! streamcast - replay a streamed response into a live-updating message
//!
//! Platform calls are printed to stdout as JSON lines; logs go to stderr.

mod console;
mod replay;
mod script;

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use streamcast_core::StreamConfig;
use tracing::{debug, info};

use console::ConsoleClient;
use replay::{Pacing, Replay};

#[derive(Parser)]
#[command(name = "streamcast", version, about)]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream a script through a session
    Replay(ReplayArgs),
}

#[derive(Args)]
struct ReplayArgs {
    /// Script to replay (stdin when omitted)
    file: Option<PathBuf>,

    /// Config file (defaults to the user config file when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Built-in limits for a platform: discord or telegram
    #[arg(long, conflicts_with = "config")]
    preset: Option<String>,

    /// Chars appended per chunk
    #[arg(long, default_value_t = 16)]
    chunk_size: usize,

    /// Delay between chunks
    #[arg(long, default_value_t = 50)]
    chunk_delay_ms: u64,

    /// Channel the response is posted to
    #[arg(long, default_value = "console")]
    target: String,

    /// Add feedback reactions to the final message
    #[arg(long)]
    feedback: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Command::Replay(args) => run_replay(args).await,
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level '{}'", level))?;

    // stdout carries the platform calls
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn load_config(args: &ReplayArgs) -> Result<StreamConfig> {
    if let Some(path) = &args.config {
        return StreamConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()));
    }

    if let Some(name) = &args.preset {
        return StreamConfig::preset(name).ok_or_else(|| anyhow!("unknown preset '{}'", name));
    }

    match StreamConfig::default_path().filter(|path| path.exists()) {
        Some(path) => {
            debug!(path = %path.display(), "Using user config");
            StreamConfig::load(&path)
                .with_context(|| format!("failed to load config from {}", path.display()))
        }
        None => Ok(StreamConfig::default()),
    }
}

fn read_script(file: Option<&PathBuf>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display())),
        None => {
            let mut script = String::new();
            std::io::stdin()
                .read_to_string(&mut script)
                .context("failed to read script from stdin")?;
            Ok(script)
        }
    }
}

async fn run_replay(args: ReplayArgs) -> Result<()> {
    let config = load_config(&args)?;
    let script = read_script(args.file.as_ref())?;
    let steps = script::parse(&script)?;

    info!(steps = steps.len(), target = %args.target, "Replaying script");

    let replay = Replay::new(
        Arc::new(ConsoleClient::stdout()),
        args.target,
        config,
        Pacing {
            chunk_size: args.chunk_size,
            chunk_delay: Duration::from_millis(args.chunk_delay_ms),
        },
        args.feedback,
    );
    let summary = replay.run(steps).await;

    info!(
        state = %summary.state,
        messages = summary.messages,
        flushes = summary.stats.flushes,
        failed_flushes = summary.stats.failed_flushes,
        continuations = summary.stats.continuations,
        "Replay finished"
    );
    Ok(())
}
