//! The stdio JSON-RPC session against a tiny shell-script server.
#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use fira_agents::{AgentError, ExternalSession, McpStdioSession, SessionKind, SessionScope};
use serde_json::json;

/// Replies to initialize, tools/list and tools/call; ignores notifications.
const FAKE_SERVER: &str = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"fake","version":"0"}}}\n' "$id" ;;
    *'"method":"tools/list"'*)
      printf '{"jsonrpc":"2.0","method":"notifications/message","params":{}}\n'
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"get_stock_info","description":"Company info","inputSchema":{"type":"object","properties":{"ticker":{"type":"string"}}}}]}}\n' "$id" ;;
    *'"name":"get_stock_info"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"{\\"ticker\\": \\"NVDA\\", \\"price\\": 187.5}"}]}}\n' "$id" ;;
    *'"method":"tools/call"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"isError":true,"content":[{"type":"text","text":"unknown tool"}]}}\n' "$id" ;;
  esac
done
"#;

fn fake_session() -> McpStdioSession {
    McpStdioSession::new(
        SessionKind::MarketData,
        "sh",
        vec!["-c".to_string(), FAKE_SERVER.to_string()],
        Duration::from_secs(5),
    )
}

#[tokio::test]
async fn handshake_lists_and_calls_tools() {
    let session = fake_session();
    session.connect().await.unwrap();
    // Connecting twice reuses the process
    session.connect().await.unwrap();

    let tools = session.list_tools().await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "get_stock_info");
    assert_eq!(tools[0].parameters["properties"]["ticker"]["type"], "string");

    let value = session
        .call_tool("get_stock_info", json!({"ticker": "NVDA"}))
        .await
        .unwrap();
    assert_eq!(value, json!({"ticker": "NVDA", "price": 187.5}));

    let error = session.call_tool("get_news", json!({})).await.unwrap();
    assert_eq!(error, json!({"error": "unknown tool"}));

    session.close().await.unwrap();
    assert!(matches!(
        session.list_tools().await,
        Err(AgentError::Session(_))
    ));
}

#[tokio::test]
async fn scope_closes_stdio_session_once() {
    let scope = SessionScope::new();
    scope.open(Arc::new(fake_session())).await.unwrap();
    assert_eq!(scope.len(), 1);
    assert!(scope.get(SessionKind::MarketData).is_some());

    assert_eq!(scope.close_all().await, 1);
    assert!(scope.is_empty());
    assert_eq!(scope.close_all().await, 0);
}

#[tokio::test]
async fn failed_open_is_not_registered() {
    let scope = SessionScope::new();
    let broken = McpStdioSession::new(
        SessionKind::MarketData,
        "sh",
        vec!["-c".to_string(), "exit 0".to_string()],
        Duration::from_secs(5),
    );
    let err = scope.open(Arc::new(broken)).await.unwrap_err();
    assert!(matches!(err, AgentError::Session(_)), "{err}");
    assert!(scope.is_empty());
}
