use std::sync::Arc;

use async_trait::async_trait;
use fira_models::{DelegationRequest, StitchRequest, ToolCall};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::adapters::{parse_args, Adapters};
use crate::error::AgentError;
use crate::roles::{CapabilityBundle, Role, RoleKind, ToolKind};
use crate::runtime::{AgentRuntime, ToolDispatcher, ToolSpec};
use crate::session::SessionScope;
use crate::stitch::StitchHandle;

/// Everything a role's tools need during one run.
#[derive(Clone)]
pub struct ToolContext {
    pub runtime: Arc<dyn AgentRuntime>,
    pub bundle: Arc<CapabilityBundle>,
    pub adapters: Adapters,
    pub sessions: Arc<SessionScope>,
    /// Present for the coordinator only.
    pub stitcher: Option<StitchHandle>,
    pub specialist_max_turns: u32,
}

/// Tool dispatcher for one role. Enforces the role's allow-list: a call to
/// anything outside it is answered with an error object and never executed.
pub struct RoleToolbox {
    role: Arc<Role>,
    ctx: ToolContext,
}

impl RoleToolbox {
    pub fn new(role: Arc<Role>, ctx: ToolContext) -> Self {
        Self { role, ctx }
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, AgentError> {
        if let Some(tool) = ToolKind::from_name(&call.name) {
            if !self.role.allows(tool) {
                return Ok(self.refuse(&call.name));
            }
            let arguments = call.arguments.clone();
            return match tool {
                ToolKind::Delegate(kind) => self.delegate(kind, arguments).await,
                ToolKind::ReportEditor => self.stitch(arguments).await,
                other => self.ctx.adapters.invoke(other, arguments).await,
            };
        }

        for kind in &self.role.sessions {
            let Some(session) = self.ctx.sessions.get(*kind) else {
                continue;
            };
            let tools = session.list_tools().await?;
            if tools.iter().any(|t| t.name == call.name) {
                return session.call_tool(&call.name, call.arguments.clone()).await;
            }
        }

        Ok(self.refuse(&call.name))
    }

    async fn delegate(&self, kind: RoleKind, arguments: Value) -> Result<Value, AgentError> {
        let request: DelegationRequest = parse_args(arguments)?;
        let role = Arc::clone(self.ctx.bundle.role(kind));
        info!(from = %self.role.kind, to = %kind, "Delegating");

        let mut ctx = self.ctx.clone();
        ctx.stitcher = None;
        let nested = RoleToolbox::new(Arc::clone(&role), ctx);
        let answer = self
            .ctx
            .runtime
            .run(&role, &nested, &request.input, self.ctx.specialist_max_turns)
            .await
            .map_err(|e| AgentError::Delegation(format!("{} failed: {e}", role.name)))?;
        Ok(Value::String(answer))
    }

    async fn stitch(&self, arguments: Value) -> Result<Value, AgentError> {
        let request: StitchRequest = parse_args(arguments)?;
        let stitcher = self.ctx.stitcher.as_ref().ok_or_else(|| {
            AgentError::Configuration("report editor is not available in this context".to_string())
        })?;
        let reply = stitcher.stitch(request).await?;
        match &reply.file {
            Some(file) => info!(role = %self.role.kind, file = %file, "Report stitched"),
            None => warn!(role = %self.role.kind, "Report editor answer names no file"),
        }
        Ok(Value::String(reply.output))
    }

    fn refuse(&self, name: &str) -> Value {
        warn!(role = %self.role.kind, tool = %name, "Refused tool outside allow-list");
        json!({"error": format!("Tool '{name}' is not available to {}", self.role.name)})
    }

    /// Turn a tool failure into something the calling model can act on.
    fn on_failure(&self, tool: &str, error: &AgentError) -> Value {
        warn!(role = %self.role.kind, tool = %tool, error = %error, "Tool call failed");
        if tool == ToolKind::CodeInterpreter.name() {
            json!({"error": format!(
                "Error running code interpreter. You must provide BOTH a clear natural language \
                 analysis request and a non-empty list of input_files (relative to outputs/). \
                 Details: {error}"
            )})
        } else {
            json!({"error": error.to_string()})
        }
    }
}

#[async_trait]
impl ToolDispatcher for RoleToolbox {
    async fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.role.tools.iter().map(|t| t.spec()).collect();
        for kind in &self.role.sessions {
            let Some(session) = self.ctx.sessions.get(*kind) else {
                continue;
            };
            match session.list_tools().await {
                Ok(tools) => specs.extend(tools),
                Err(e) => warn!(session = ?kind, error = %e, "Could not list session tools"),
            }
        }
        specs
    }

    async fn dispatch(&self, call: &ToolCall) -> String {
        debug!(role = %self.role.kind, tool = %call.name, id = %call.id, "Dispatching tool call");
        let value = match self.execute(call).await {
            Ok(value) => value,
            Err(e) => self.on_failure(&call.name, &e),
        };
        match value {
            Value::String(text) => text,
            other => other.to_string(),
        }
    }
}
