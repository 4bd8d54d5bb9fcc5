use std::process::Stdio;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use fira_models::MarketDataConfig;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::AgentError;
use crate::roles::SessionKind;
use crate::runtime::ToolSpec;

const PROTOCOL_VERSION: &str = "2024-11-05";
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// A long-lived out-of-process tool provider.
///
/// Only the orchestrator opens and closes sessions; roles reach them through
/// the toolbox by [`SessionKind`].
#[async_trait]
pub trait ExternalSession: Send + Sync {
    fn kind(&self) -> SessionKind;

    async fn connect(&self) -> Result<(), AgentError>;

    async fn list_tools(&self) -> Result<Vec<ToolSpec>, AgentError>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, AgentError>;

    async fn close(&self) -> Result<(), AgentError>;
}

struct Connection {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    tools: Vec<ToolSpec>,
}

impl Connection {
    async fn send(&mut self, message: &Value) -> Result<(), AgentError> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn request(&mut self, method: &str, params: Value) -> Result<Value, AgentError> {
        let id = self.next_id;
        self.next_id += 1;
        self.send(&json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await?;

        loop {
            let line = self.stdout.next_line().await?.ok_or_else(|| {
                AgentError::Session(format!("market-data process closed during {method}"))
            })?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let message: Value = match serde_json::from_str(line) {
                Ok(v) => v,
                Err(e) => {
                    debug!(error = %e, "Skipping non-JSON line from session process");
                    continue;
                }
            };
            // Notifications and replies to other requests are skipped
            if message.get("id").and_then(Value::as_u64) != Some(id) {
                continue;
            }
            if let Some(err) = message.get("error") {
                let text = err
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| err.to_string());
                return Err(AgentError::Session(format!("{method} failed: {text}")));
            }
            return Ok(message.get("result").cloned().unwrap_or(Value::Null));
        }
    }
}

/// A market-data process speaking newline-delimited JSON-RPC 2.0 over stdio.
/// Exchanges are serialised behind an async mutex.
pub struct McpStdioSession {
    kind: SessionKind,
    command: String,
    args: Vec<String>,
    request_timeout: Duration,
    conn: Mutex<Option<Connection>>,
}

impl McpStdioSession {
    pub fn new(
        kind: SessionKind,
        command: impl Into<String>,
        args: Vec<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            kind,
            command: command.into(),
            args,
            request_timeout,
            conn: Mutex::new(None),
        }
    }

    pub fn market_data(config: &MarketDataConfig) -> Self {
        Self::new(
            SessionKind::MarketData,
            config.command.clone(),
            config.args.clone(),
            Duration::from_secs(config.request_timeout_seconds),
        )
    }

    async fn timed<T>(
        &self,
        what: &str,
        fut: impl std::future::Future<Output = Result<T, AgentError>>,
    ) -> Result<T, AgentError> {
        tokio::time::timeout(self.request_timeout, fut)
            .await
            .map_err(|_| {
                AgentError::Session(format!(
                    "{what} timed out after {}s",
                    self.request_timeout.as_secs()
                ))
            })?
    }
}

#[async_trait]
impl ExternalSession for McpStdioSession {
    fn kind(&self) -> SessionKind {
        self.kind
    }

    async fn connect(&self) -> Result<(), AgentError> {
        let mut guard = self.conn.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        debug!(command = %self.command, args = ?self.args, "Spawning session process");
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AgentError::Session(format!("Failed to spawn {}: {e}", self.command)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::Session("session stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Session("session stdout unavailable".to_string()))?;

        let mut conn = Connection {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
            tools: Vec::new(),
        };

        let handshake = async {
            conn.request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {"name": "fira", "version": env!("CARGO_PKG_VERSION")}
                }),
            )
            .await?;
            conn.send(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
                .await?;
            let listed = conn.request("tools/list", json!({})).await?;
            Ok::<_, AgentError>(parse_tools(&listed))
        };
        let tools = self
            .timed("session handshake", handshake)
            .await
            .map_err(|e| match e {
                AgentError::Session(_) => e,
                other => AgentError::Session(format!(
                    "handshake with {} failed: {other}",
                    self.command
                )),
            })?;

        info!(kind = ?self.kind, tools = tools.len(), "Session connected");
        conn.tools = tools;
        *guard = Some(conn);
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ToolSpec>, AgentError> {
        let guard = self.conn.lock().await;
        guard
            .as_ref()
            .map(|c| c.tools.clone())
            .ok_or_else(|| AgentError::Session("session is not connected".to_string()))
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, AgentError> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| AgentError::Session("session is not connected".to_string()))?;

        debug!(tool = %name, "Session tool call");
        let result = self
            .timed(
                name,
                conn.request("tools/call", json!({"name": name, "arguments": arguments})),
            )
            .await?;
        Ok(tool_result_value(&result))
    }

    async fn close(&self) -> Result<(), AgentError> {
        let Some(conn) = self.conn.lock().await.take() else {
            return Ok(());
        };
        let Connection {
            mut child, stdin, ..
        } = conn;
        drop(stdin);

        match tokio::time::timeout(CLOSE_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(kind = ?self.kind, %status, "Session process exited");
                Ok(())
            }
            Ok(Err(e)) => Err(AgentError::Io(e)),
            Err(_) => {
                warn!(kind = ?self.kind, "Session process did not exit, killing");
                child.kill().await?;
                Ok(())
            }
        }
    }
}

fn parse_tools(listed: &Value) -> Vec<ToolSpec> {
    listed
        .get("tools")
        .and_then(Value::as_array)
        .map(|tools| {
            tools
                .iter()
                .filter_map(|t| {
                    Some(ToolSpec {
                        name: t.get("name")?.as_str()?.to_string(),
                        description: t
                            .get("description")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        parameters: t
                            .get("inputSchema")
                            .cloned()
                            .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Flatten a `tools/call` result into a JSON value for the model.
fn tool_result_value(result: &Value) -> Value {
    let text = result
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
        return json!({"error": text});
    }
    serde_json::from_str(&text).unwrap_or_else(|_| json!({"content": text}))
}

/// Sessions opened for one run. Every session registered here is closed by
/// [`SessionScope::close_all`], in reverse order of acquisition.
#[derive(Default)]
pub struct SessionScope {
    sessions: std::sync::Mutex<Vec<Arc<dyn ExternalSession>>>,
}

impl SessionScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect `session` and register it. A session that fails to connect
    /// is not registered.
    pub async fn open(&self, session: Arc<dyn ExternalSession>) -> Result<(), AgentError> {
        session.connect().await?;
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(session);
        Ok(())
    }

    pub fn get(&self, kind: SessionKind) -> Option<Arc<dyn ExternalSession>> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|s| s.kind() == kind)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every registered session, newest first. Close failures are
    /// logged and do not stop the remaining closes. Returns the number of
    /// sessions released.
    pub async fn close_all(&self) -> usize {
        let sessions: Vec<_> = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        let count = sessions.len();
        for session in sessions.into_iter().rev() {
            if let Err(e) = session.close().await {
                error!(kind = ?session.kind(), error = %e, "Failed to close session");
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_parses_json_text() {
        let result = json!({"content": [{"type": "text", "text": "{\"price\": 187.5}"}]});
        assert_eq!(tool_result_value(&result), json!({"price": 187.5}));
    }

    #[test]
    fn tool_result_wraps_plain_text() {
        let result = json!({"content": [
            {"type": "text", "text": "line one"},
            {"type": "text", "text": "line two"}
        ]});
        assert_eq!(
            tool_result_value(&result),
            json!({"content": "line one\nline two"})
        );
    }

    #[test]
    fn tool_result_error_flag() {
        let result = json!({"isError": true, "content": [{"type": "text", "text": "bad ticker"}]});
        assert_eq!(tool_result_value(&result), json!({"error": "bad ticker"}));
    }

    #[test]
    fn parse_tools_reads_input_schema() {
        let listed = json!({"tools": [
            {"name": "get_stock_info", "description": "Info", "inputSchema": {"type": "object"}},
            {"description": "nameless"},
            {"name": "get_news"}
        ]});
        let tools = parse_tools(&listed);
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "get_stock_info");
        assert_eq!(tools[1].description, "");
        assert_eq!(tools[1].parameters["type"], "object");
    }

    #[tokio::test]
    async fn spawn_failure_is_session_error() {
        let session = McpStdioSession::new(
            SessionKind::MarketData,
            "/nonexistent/fira-market-data",
            Vec::new(),
            Duration::from_secs(1),
        );
        assert!(matches!(
            session.connect().await,
            Err(AgentError::Session(_))
        ));
        // Closing an unconnected session is a no-op
        assert!(session.close().await.is_ok());
    }

    /// Appends its lifecycle events to a log shared with other sessions.
    struct LoggedSession {
        name: &'static str,
        fail_close: bool,
        log: Arc<std::sync::Mutex<Vec<String>>>,
    }

    impl LoggedSession {
        fn record(&self, event: &str) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{event} {}", self.name));
        }
    }

    #[async_trait]
    impl ExternalSession for LoggedSession {
        fn kind(&self) -> SessionKind {
            SessionKind::MarketData
        }

        async fn connect(&self) -> Result<(), AgentError> {
            self.record("open");
            Ok(())
        }

        async fn list_tools(&self) -> Result<Vec<ToolSpec>, AgentError> {
            Ok(Vec::new())
        }

        async fn call_tool(&self, _name: &str, _arguments: Value) -> Result<Value, AgentError> {
            Ok(Value::Null)
        }

        async fn close(&self) -> Result<(), AgentError> {
            self.record("close");
            if self.fail_close {
                return Err(AgentError::Session("already gone".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn scope_closes_newest_first() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let scope = SessionScope::new();
        for (name, fail_close) in [("a", false), ("b", true), ("c", false)] {
            let session = LoggedSession {
                name,
                fail_close,
                log: Arc::clone(&log),
            };
            scope.open(Arc::new(session)).await.unwrap();
        }

        // A failed close does not stop the rest
        assert_eq!(scope.close_all().await, 3);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["open a", "open b", "open c", "close c", "close b", "close a"]
        );
        assert!(scope.is_empty());
    }
}
