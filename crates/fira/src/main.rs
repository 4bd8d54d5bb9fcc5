use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use fira_models::RiskLevel;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fira", about = "Financial Investment Research Agents")]
struct Cli {
    /// Path to configuration file (defaults are used when it does not exist)
    #[arg(short, long, default_value = "config/fira.toml")]
    config: PathBuf,

    /// Investment question; prompted for on stdin when omitted
    #[arg(short, long)]
    question: Option<String>,

    /// Risk awareness: Low, Medium or High
    #[arg(short, long, default_value_t = RiskLevel::Medium)]
    risk: RiskLevel,

    /// Turn cap for the coordinator (overrides config)
    #[arg(long)]
    max_turns: Option<u32>,

    /// Deadline for the whole run in seconds (overrides config)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = fira::load_config(&cli.config)?;

    let question = match cli.question {
        Some(q) => q,
        None => prompt_question()?,
    };
    if question.trim().is_empty() {
        bail!("No question provided");
    }

    let orchestrator = fira::build_orchestrator(&config).context("Failed to build orchestrator")?;
    let max_turns = cli.max_turns.unwrap_or(config.agents.coordinator_max_turns);
    let deadline = Duration::from_secs(
        cli.timeout_secs
            .unwrap_or(config.agents.total_timeout_seconds),
    );

    // Ctrl-C cancels the run; sessions are still released
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            on_signal.cancel();
        }
    });

    let result = fira::research(
        &orchestrator,
        &question,
        cli.risk,
        max_turns,
        deadline,
        cancel,
    )
    .await
    .map_err(|e| anyhow::anyhow!("Research run failed: {e}"))?;

    // Output result as JSON to stdout
    let output = if cli.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{output}");

    Ok(())
}

fn prompt_question() -> Result<String> {
    eprint!("Enter your investment question: ");
    std::io::stderr().flush().ok();
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read question from stdin")?;
    Ok(line.trim().to_string())
}
