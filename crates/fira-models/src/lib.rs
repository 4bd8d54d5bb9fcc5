pub mod agent_message;
pub mod config;
pub mod run;

pub use agent_message::{DelegationRequest, StitchReply, StitchRequest, ToolCall};
pub use config::{
    AgentsConfig, FiraConfig, FredConfig, MarketDataConfig, OutputConfig, RenderConfig,
    RuntimeConfig, SandboxConfig,
};
pub use run::{frame_question, RiskLevel, RunResult};
