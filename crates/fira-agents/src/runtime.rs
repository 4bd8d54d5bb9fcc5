use async_trait::async_trait;
use fira_models::ToolCall;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;

use crate::error::AgentError;
use crate::roles::Role;

/// A tool as advertised to a model: name, description, JSON-schema parameters.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Executes the tool calls a model requests on behalf of one role.
///
/// `dispatch` never fails: errors are converted into a JSON error string the
/// model can read and react to.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    async fn specs(&self) -> Vec<ToolSpec>;

    async fn dispatch(&self, call: &ToolCall) -> String;
}

/// The conversational tool-calling loop that drives a role.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Run `role` on `input` until it produces a final answer or exhausts
    /// `max_turns`. Returns the final answer text.
    async fn run(
        &self,
        role: &Role,
        tools: &dyn ToolDispatcher,
        input: &str,
        max_turns: u32,
    ) -> Result<String, AgentError>;
}

/// Dispatch the calls of a single model turn. Outputs come back in call
/// order; calls run concurrently only when the role permits it.
pub async fn dispatch_all(
    role: &Role,
    tools: &dyn ToolDispatcher,
    calls: &[ToolCall],
) -> Vec<String> {
    if role.parallel_tool_calls && calls.len() > 1 {
        join_all(calls.iter().map(|call| tools.dispatch(call))).await
    } else {
        let mut outputs = Vec::with_capacity(calls.len());
        for call in calls {
            outputs.push(tools.dispatch(call).await);
        }
        outputs
    }
}
