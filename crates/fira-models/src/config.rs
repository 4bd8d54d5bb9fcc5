use serde::{Deserialize, Serialize};

/// Top-level configuration for FIRA.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FiraConfig {
    pub output: OutputConfig,
    pub agents: AgentsConfig,
    pub runtime: RuntimeConfig,
    pub sandbox: SandboxConfig,
    pub market_data: MarketDataConfig,
    pub fred: FredConfig,
    pub render: RenderConfig,
}

impl FiraConfig {
    /// Apply the environment overrides recognised by the research workflow
    /// (`DEFAULT_LLM_MODEL`, `DEFAULT_PM_MODEL`, `CODE_INTERPRETER_MODEL`,
    /// `DEFAULT_MAX_TURNS`, `YAHOO_MCP_TIMEOUT`).
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Same as [`FiraConfig::apply_env_overrides`] with an injectable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("DEFAULT_LLM_MODEL") {
            self.agents.specialist_model = model.clone();
            self.agents.editor_model = model.clone();
            self.sandbox.model = model;
        }
        if let Some(model) = lookup("DEFAULT_PM_MODEL") {
            self.agents.coordinator_model = model;
        }
        if let Some(model) = lookup("CODE_INTERPRETER_MODEL") {
            self.sandbox.model = model;
        }
        if let Some(turns) = lookup("DEFAULT_MAX_TURNS").and_then(|v| v.parse().ok()) {
            self.agents.coordinator_max_turns = turns;
        }
        if let Some(secs) = lookup("YAHOO_MCP_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.market_data.request_timeout_seconds = secs;
        }
    }
}

/// Where generated artifacts are written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Shared output directory. Relative paths are anchored at the working directory.
    pub dir: String,
    /// Leading path segment stripped from relative names before anchoring,
    /// so `outputs/foo.png` never becomes `outputs/outputs/foo.png`.
    pub root_segment: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: "outputs".to_string(),
            root_segment: "outputs".to_string(),
        }
    }
}

/// Configuration for the agent orchestration layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentsConfig {
    /// Deadline for the entire run in seconds.
    pub total_timeout_seconds: u64,
    /// Turn cap handed to the coordinator.
    pub coordinator_max_turns: u32,
    /// Turn cap for each specialist delegation.
    pub specialist_max_turns: u32,
    /// Turn cap for the report editor. Kept below the coordinator's.
    pub stitch_max_turns: u32,
    pub coordinator_model: String,
    pub specialist_model: String,
    pub editor_model: String,
    pub temperature: f32,
    /// Environment variables that must be set before a run may start.
    pub required_credentials: Vec<String>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            total_timeout_seconds: 1200,
            coordinator_max_turns: 40,
            specialist_max_turns: 25,
            stitch_max_turns: 20,
            coordinator_model: "gpt-4.1-mini".to_string(),
            specialist_model: "gpt-4.1-mini".to_string(),
            editor_model: "gpt-4.1-mini".to_string(),
            temperature: 0.0,
            required_credentials: vec!["OPENAI_API_KEY".to_string()],
        }
    }
}

/// Chat-completions endpoint that backs every role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Per-request timeout in seconds.
    pub request_timeout_seconds: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            request_timeout_seconds: 180,
        }
    }
}

/// Sandboxed code-execution service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub model: String,
    /// Total submission attempts, first try included.
    pub max_attempts: u32,
    pub request_timeout_seconds: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "gpt-4.1-mini".to_string(),
            max_attempts: 3,
            request_timeout_seconds: 300,
        }
    }
}

/// The market-data query process, spoken to over stdio.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MarketDataConfig {
    pub enabled: bool,
    pub command: String,
    pub args: Vec<String>,
    pub request_timeout_seconds: u64,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "python".to_string(),
            args: vec!["tools/yahoo_finance_mcp.py".to_string()],
            request_timeout_seconds: 300,
        }
    }
}

/// FRED macro time-series API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FredConfig {
    pub base_url: String,
    pub api_key_env: String,
}

impl Default for FredConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.stlouisfed.org/fred".to_string(),
            api_key_env: "FRED_API_KEY".to_string(),
        }
    }
}

/// Markdown-to-PDF renderer binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            command: "pandoc".to_string(),
            args: vec!["--toc".to_string(), "--toc-depth=2".to_string()],
        }
    }
}
