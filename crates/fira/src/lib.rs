//! FIRA - Financial Investment Research Agents
//!
//! A coordinator agent delegates one investment question to fundamental,
//! macro and quantitative specialists, then hands their sections to a report
//! editor that writes the final Markdown (and PDF) report into a shared
//! output directory.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use fira::models::{FiraConfig, RiskLevel, RunResult};
//! use fira::agents::{Orchestrator, ChatRuntime, McpStdioSession};
//! use fira::store::OutputStore;
//! ```

pub use fira_agents as agents;
pub use fira_models as models;
pub use fira_store as store;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use fira_agents::{
    Adapters, AgentError, ChatRuntime, Credentials, ExternalSession, FredClient, McpStdioSession,
    OpenAiSandbox, Orchestrator, Renderer,
};
use fira_models::{frame_question, FiraConfig, RiskLevel, RunResult};
use fira_store::OutputStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Load configuration from `path`, falling back to defaults when the file
/// does not exist, then apply environment overrides.
pub fn load_config(path: &Path) -> Result<FiraConfig, anyhow::Error> {
    let mut config = if path.exists() {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?
    } else {
        debug!(path = %path.display(), "Config file not found, using defaults");
        FiraConfig::default()
    };
    config.apply_env_overrides();
    Ok(config)
}

/// Build an Orchestrator from configuration.
pub fn build_orchestrator(config: &FiraConfig) -> Result<Orchestrator, anyhow::Error> {
    let store = OutputStore::from_config(&config.output)
        .with_context(|| format!("Failed to prepare output directory {}", config.output.dir))?;

    let mut names = config.agents.required_credentials.clone();
    names.extend([
        config.runtime.api_key_env.clone(),
        config.sandbox.api_key_env.clone(),
        config.fred.api_key_env.clone(),
    ]);
    let credentials = Credentials::from_env(&names);
    debug!(?credentials, "Credentials loaded");

    let runtime = ChatRuntime::new(
        &config.runtime,
        credentials.get(&config.runtime.api_key_env).unwrap_or_default(),
    )?;
    let sandbox = OpenAiSandbox::new(
        &config.sandbox,
        credentials.get(&config.sandbox.api_key_env).unwrap_or_default(),
    )?;
    let fred = FredClient::new(
        reqwest::Client::new(),
        &config.fred,
        credentials.get(&config.fred.api_key_env).map(str::to_string),
    );

    let adapters = Adapters {
        store,
        fred,
        renderer: Renderer::new(&config.render),
        sandbox: Arc::new(sandbox),
        sandbox_attempts: config.sandbox.max_attempts,
    };

    let sessions: Vec<Arc<dyn ExternalSession>> = if config.market_data.enabled {
        let market = McpStdioSession::market_data(&config.market_data);
        vec![Arc::new(market) as Arc<dyn ExternalSession>]
    } else {
        Vec::new()
    };

    Ok(Orchestrator::new(
        Arc::new(runtime),
        config.agents.clone(),
        adapters,
        sessions,
        credentials,
    ))
}

/// Frame `question` with today's date and the risk level and run it.
pub async fn research(
    orchestrator: &Orchestrator,
    question: &str,
    risk: RiskLevel,
    max_turns: u32,
    deadline: Duration,
    cancel: CancellationToken,
) -> Result<RunResult, AgentError> {
    let framed = frame_question(question, risk, chrono::Local::now().date_naive());
    info!(%risk, "Research question framed");
    orchestrator
        .run_with_cancel(&framed, max_turns, deadline, cancel)
        .await
}
