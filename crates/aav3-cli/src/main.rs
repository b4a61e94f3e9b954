use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use aav3_config::CliOverrides;
use aav3_core::SessionStatus;
use aav3_orchestrator::SessionParams;
use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::prelude::*;

/// Run one multi-agent engineering session against a task brief.
#[derive(Debug, Parser)]
#[command(name = "aav3", version)]
struct Cli {
    /// Path to a file containing the task brief.
    #[arg(long)]
    task: PathBuf,

    /// Session identifier. Defaults to a freshly generated ULID.
    #[arg(long)]
    session_id: Option<String>,

    /// Override the maximum number of fix-loop rounds.
    #[arg(long)]
    max_rounds: Option<u32>,

    /// Override the consensus approval threshold (0.0-1.0).
    #[arg(long)]
    consensus_threshold: Option<f64>,

    /// Directory under which `aav3_<session_id>/` is created. Defaults to
    /// the platform data directory for this tool.
    #[arg(long)]
    sessions_dir: Option<PathBuf>,
}

fn default_sessions_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "aav3")
        .map(|dirs| dirs.data_dir().join("sessions"))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let base_dir = cli.sessions_dir.clone().unwrap_or_else(default_sessions_dir);
    std::fs::create_dir_all(&base_dir)
        .with_context(|| format!("failed to create sessions directory: {}", base_dir.display()))?;

    // Long-running sessions log to stderr and to a daily-rolling file under
    // the sessions directory, so an unattended run leaves a durable trail.
    let file_appender = tracing_appender::rolling::daily(&base_dir, "aav3.log");
    let (file_writer, _file_guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::fmt::layer().with_writer(file_writer).with_ansi(false))
        .try_init()
        .ok();

    let overrides = CliOverrides {
        consensus_threshold: cli.consensus_threshold,
        max_rounds: cli.max_rounds,
        ..Default::default()
    };
    let config = aav3_config::resolve(&overrides, |name| std::env::var(name).ok())
        .context("invalid configuration")?;

    let task_text = std::fs::read_to_string(&cli.task)
        .with_context(|| format!("failed to read task file: {}", cli.task.display()))?;

    let base_url = std::env::var("AAV3_LLM_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
    let api_key = std::env::var("AAV3_LLM_API_KEY").unwrap_or_default();
    let llm = aav3_llm::LlmClient::new(base_url, api_key, config.model.clone());

    let session_id = cli.session_id.clone().unwrap_or_else(|| ulid::Ulid::new().to_string().to_lowercase());
    let cancel = AtomicBool::new(false);

    let verdict = aav3_orchestrator::run_session(
        SessionParams {
            session_id,
            task_text,
            base_dir,
        },
        &config,
        &llm,
        &cancel,
    )
    .await;

    println!("{}", serde_json::to_string_pretty(&verdict)?);

    match verdict.status {
        SessionStatus::Error => std::process::exit(1),
        SessionStatus::Done | SessionStatus::Cancelled => Ok(()),
    }
}
