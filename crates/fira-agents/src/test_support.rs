//! Scripted stand-ins for the model runtime, the market-data session and the
//! sandbox service.
//!
//! `ScriptedRuntime` plays a fixed sequence of steps per role and routes the
//! tool calls through the real toolbox, so allow-lists, adapters, the stitch
//! task and session lookups are all exercised without a network.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use fira_models::{FredConfig, RenderConfig, ToolCall};
use fira_store::OutputStore;
use serde_json::{json, Value};

use crate::adapters::{Adapters, ContainerFile, FredClient, Renderer, SandboxService, SandboxSubmission};
use crate::error::AgentError;
use crate::roles::{Role, RoleKind, SessionKind};
use crate::runtime::{dispatch_all, AgentRuntime, ToolDispatcher, ToolSpec};
use crate::session::ExternalSession;

/// One scripted model turn.
#[derive(Debug, Clone)]
pub enum Step {
    /// Request these tool calls, then continue with the next step.
    Call(Vec<ToolCall>),
    /// Finish with this answer.
    Answer(String),
    /// Fail the run with a transient error.
    Fail(String),
    /// Never finish.
    Hang,
}

/// Build a tool call with a generated id.
pub fn call(name: &str, arguments: Value) -> ToolCall {
    static NEXT: AtomicUsize = AtomicUsize::new(1);
    ToolCall {
        id: format!("call_{}", NEXT.fetch_add(1, Ordering::SeqCst)),
        name: name.to_string(),
        arguments,
    }
}

/// A tool call made during a scripted run and what the toolbox answered.
#[derive(Debug, Clone)]
pub struct ToolExchange {
    pub role: RoleKind,
    pub tool: String,
    pub output: String,
}

#[derive(Default)]
pub struct ScriptedRuntime {
    scripts: Mutex<HashMap<RoleKind, VecDeque<Step>>>,
    inputs: Mutex<Vec<(RoleKind, String)>>,
    exchanges: Mutex<Vec<ToolExchange>>,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append steps to a role's script. A role is scripted once per run it
    /// takes part in; steps are consumed across runs in order.
    pub fn script(self, role: RoleKind, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(role)
            .or_default()
            .extend(steps);
        self
    }

    /// Inputs each role received, in order.
    pub fn inputs(&self, role: RoleKind) -> Vec<String> {
        self.inputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(r, _)| *r == role)
            .map(|(_, input)| input.clone())
            .collect()
    }

    pub fn exchanges(&self) -> Vec<ToolExchange> {
        self.exchanges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The answer the toolbox gave for the first call to `tool`.
    pub fn output_of(&self, tool: &str) -> Option<String> {
        self.exchanges()
            .into_iter()
            .find(|e| e.tool == tool)
            .map(|e| e.output)
    }

    fn next_step(&self, role: RoleKind) -> Option<Step> {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&role)
            .and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    async fn run(
        &self,
        role: &Role,
        tools: &dyn ToolDispatcher,
        input: &str,
        max_turns: u32,
    ) -> Result<String, AgentError> {
        self.inputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((role.kind, input.to_string()));

        let mut turns = 0u32;
        loop {
            let step = self.next_step(role.kind).ok_or_else(|| {
                AgentError::Parse(format!("no scripted step left for {}", role.name))
            })?;
            match step {
                Step::Call(calls) => {
                    turns += 1;
                    if turns > max_turns {
                        return Err(AgentError::MaxTurns(max_turns));
                    }
                    let outputs = dispatch_all(role, tools, &calls).await;
                    let mut exchanges = self.exchanges.lock().unwrap_or_else(PoisonError::into_inner);
                    for (call, output) in calls.iter().zip(outputs) {
                        exchanges.push(ToolExchange {
                            role: role.kind,
                            tool: call.name.clone(),
                            output,
                        });
                    }
                }
                Step::Answer(text) => return Ok(text),
                Step::Fail(message) => return Err(AgentError::Transient(message)),
                Step::Hang => std::future::pending::<()>().await,
            }
        }
    }
}

/// Session double that counts lifecycle calls.
pub struct CountingSession {
    kind: SessionKind,
    fail_connect: bool,
    tools: Vec<ToolSpec>,
    opens: AtomicUsize,
    closes: AtomicUsize,
    calls: Mutex<Vec<(String, Value)>>,
}

impl CountingSession {
    /// A market-data session offering `get_stock_info`.
    pub fn market_data() -> Arc<Self> {
        Arc::new(Self::build(false))
    }

    /// A market-data session whose connect always fails.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self::build(true))
    }

    fn build(fail_connect: bool) -> Self {
        Self {
            kind: SessionKind::MarketData,
            fail_connect,
            tools: vec![ToolSpec {
                name: "get_stock_info".to_string(),
                description: "Company profile and key statistics".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {"ticker": {"type": "string"}},
                    "required": ["ticker"]
                }),
            }],
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ExternalSession for CountingSession {
    fn kind(&self) -> SessionKind {
        self.kind
    }

    async fn connect(&self) -> Result<(), AgentError> {
        if self.fail_connect {
            return Err(AgentError::Session("connection refused".to_string()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ToolSpec>, AgentError> {
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, AgentError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.to_string(), arguments.clone()));
        Ok(json!({"tool": name, "ticker": arguments.get("ticker"), "price": 187.5}))
    }

    async fn close(&self) -> Result<(), AgentError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Sandbox double: fails the first N submissions, then answers with a
/// fixed text and a fixed set of container files.
pub struct ScriptedSandbox {
    failures_before_success: u32,
    output_text: String,
    files: Vec<(ContainerFile, Vec<u8>)>,
    attempts: AtomicU32,
    uploads: Mutex<Vec<PathBuf>>,
}

impl ScriptedSandbox {
    pub fn new(output_text: impl Into<String>) -> Self {
        Self {
            failures_before_success: 0,
            output_text: output_text.into(),
            files: Vec::new(),
            attempts: AtomicU32::new(0),
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_first(mut self, failures: u32) -> Self {
        self.failures_before_success = failures;
        self
    }

    /// A generated file at `path` inside the container.
    pub fn with_output(mut self, path: &str, bytes: &[u8]) -> Self {
        self.push_file(path, "assistant", bytes);
        self
    }

    /// An uploaded input echoed back by the container listing.
    pub fn with_user_file(mut self, path: &str) -> Self {
        self.push_file(path, "user", b"");
        self
    }

    fn push_file(&mut self, path: &str, source: &str, bytes: &[u8]) {
        let id = format!("cfile_{}", self.files.len() + 1);
        self.files.push((
            ContainerFile {
                id,
                path: path.to_string(),
                source: source.to_string(),
            },
            bytes.to_vec(),
        ));
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> Vec<PathBuf> {
        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SandboxService for ScriptedSandbox {
    async fn upload(&self, path: &Path) -> Result<String, AgentError> {
        let mut uploads = self.uploads.lock().unwrap_or_else(PoisonError::into_inner);
        uploads.push(path.to_path_buf());
        Ok(format!("file-{}", uploads.len()))
    }

    async fn submit(
        &self,
        _request: &str,
        _file_ids: &[String],
    ) -> Result<SandboxSubmission, AgentError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures_before_success {
            return Err(AgentError::Transient(format!(
                "sandbox unavailable (attempt {attempt})"
            )));
        }
        Ok(SandboxSubmission {
            output_text: self.output_text.clone(),
            container_id: Some("cntr_test".to_string()),
        })
    }

    async fn list_files(&self, _container_id: &str) -> Result<Vec<ContainerFile>, AgentError> {
        Ok(self.files.iter().map(|(f, _)| f.clone()).collect())
    }

    async fn download(&self, _container_id: &str, file_id: &str) -> Result<Vec<u8>, AgentError> {
        self.files
            .iter()
            .find(|(f, _)| f.id == file_id)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| AgentError::Transient(format!("no such container file {file_id}")))
    }
}

/// Adapters over `store` with no FRED key, a renderer that is never
/// installed, and the given sandbox.
pub fn offline_adapters(store: OutputStore, sandbox: Arc<dyn SandboxService>) -> Adapters {
    Adapters {
        store,
        fred: FredClient::new(reqwest::Client::new(), &FredConfig::default(), None),
        renderer: Renderer::new(&RenderConfig {
            command: "/nonexistent/fira-renderer".to_string(),
            args: Vec::new(),
        }),
        sandbox,
        sandbox_attempts: 3,
    }
}
