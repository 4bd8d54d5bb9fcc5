//! In-process tools. Every adapter reads and writes through the shared
//! [`OutputStore`] and answers with a JSON value.

pub mod files;
pub mod fred;
pub mod render;
pub mod sandbox;

use std::sync::Arc;

use fira_store::OutputStore;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::AgentError;
use crate::roles::ToolKind;

pub use fred::FredClient;
pub use render::Renderer;
pub use sandbox::{ContainerFile, OpenAiSandbox, SandboxService, SandboxSubmission};

/// The adapter set shared by every role of a run.
#[derive(Clone)]
pub struct Adapters {
    pub store: OutputStore,
    pub fred: FredClient,
    pub renderer: Renderer,
    pub sandbox: Arc<dyn SandboxService>,
    pub sandbox_attempts: u32,
}

impl Adapters {
    /// Run the adapter behind `tool`. Delegation tools are not adapters and
    /// are rejected here.
    pub async fn invoke(&self, tool: ToolKind, arguments: Value) -> Result<Value, AgentError> {
        match tool {
            ToolKind::ListOutputFiles => {
                files::list_output_files(&self.store, parse_args(arguments)?)
            }
            ToolKind::ReadFile => files::read_file(&self.store, parse_args(arguments)?),
            ToolKind::WriteMarkdown => files::write_markdown(&self.store, parse_args(arguments)?),
            ToolKind::GeneratePdf => {
                self.renderer
                    .generate_pdf(&self.store, parse_args(arguments)?)
                    .await
            }
            ToolKind::FredSeries => self.fred.series(&self.store, parse_args(arguments)?).await,
            ToolKind::CodeInterpreter => {
                sandbox::run_code_interpreter(
                    self.sandbox.as_ref(),
                    &self.store,
                    self.sandbox_attempts,
                    parse_args(arguments)?,
                )
                .await
            }
            ToolKind::Delegate(_) | ToolKind::ReportEditor => Err(AgentError::Configuration(
                format!("{} is not an adapter tool", tool.name()),
            )),
        }
    }
}

/// Decode tool arguments. A missing argument object counts as `{}`.
pub(crate) fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, AgentError> {
    let arguments = if arguments.is_null() {
        Value::Object(Default::default())
    } else {
        arguments
    };
    serde_json::from_value(arguments).map_err(|e| AgentError::Validation(e.to_string()))
}
