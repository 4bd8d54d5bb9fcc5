pub mod adapters;
pub mod chat;
pub mod credentials;
pub mod error;
pub mod orchestrator;
pub mod parser;
pub mod prompts;
pub mod roles;
pub mod runtime;
pub mod session;
pub mod stitch;
pub mod toolbox;

pub mod test_support;

pub use adapters::{Adapters, FredClient, OpenAiSandbox, Renderer, SandboxService};
pub use chat::ChatRuntime;
pub use credentials::Credentials;
pub use error::AgentError;
pub use orchestrator::Orchestrator;
pub use roles::{CapabilityBundle, Role, RoleKind, SessionKind, ToolKind};
pub use runtime::{AgentRuntime, ToolDispatcher, ToolSpec};
pub use session::{ExternalSession, McpStdioSession, SessionScope};
pub use stitch::{StitchHandle, StitchingWorkflow};
pub use toolbox::{RoleToolbox, ToolContext};
