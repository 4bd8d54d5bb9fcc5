use std::time::Duration;

use async_trait::async_trait;
use fira_models::{RuntimeConfig, ToolCall};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::roles::Role;
use crate::runtime::{dispatch_all, AgentRuntime, ToolDispatcher};

/// Agent runtime over an OpenAI-compatible `/chat/completions` endpoint.
/// One request is one turn.
#[derive(Debug, Clone)]
pub struct ChatRuntime {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ChatRuntime {
    pub fn new(config: &RuntimeConfig, api_key: impl Into<String>) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    async fn complete(&self, body: &Value) -> Result<Value, AgentError> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AgentError::Transient(format!("Chat request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AgentError::Transient(format!(
                "Chat request failed ({status}): {text}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AgentError::Parse(format!("Failed to parse chat response: {e}")))
    }
}

#[async_trait]
impl AgentRuntime for ChatRuntime {
    async fn run(
        &self,
        role: &Role,
        tools: &dyn ToolDispatcher,
        input: &str,
        max_turns: u32,
    ) -> Result<String, AgentError> {
        let tool_defs: Vec<Value> = tools
            .specs()
            .await
            .into_iter()
            .map(|spec| {
                json!({
                    "type": "function",
                    "function": {
                        "name": spec.name,
                        "description": spec.description,
                        "parameters": spec.parameters,
                    }
                })
            })
            .collect();

        let mut messages = vec![
            json!({"role": "system", "content": role.instructions}),
            json!({"role": "user", "content": input}),
        ];

        info!(role = %role.kind, model = %role.model.model, max_turns, "Agent run started");
        for turn in 1..=max_turns {
            let mut body = json!({
                "model": role.model.model,
                "temperature": role.model.temperature,
                "messages": messages,
            });
            if !tool_defs.is_empty() {
                body["tools"] = json!(tool_defs);
                body["parallel_tool_calls"] = json!(role.parallel_tool_calls);
            }

            let response = self.complete(&body).await?;
            let message = response
                .pointer("/choices/0/message")
                .cloned()
                .ok_or_else(|| AgentError::Parse("chat response has no message".to_string()))?;

            let calls = parse_tool_calls(&message);
            if calls.is_empty() {
                let text = message
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if text.trim().is_empty() {
                    return Err(AgentError::Parse(format!(
                        "{} returned an empty answer",
                        role.name
                    )));
                }
                info!(role = %role.kind, turns = turn, "Agent run finished");
                return Ok(text.to_string());
            }

            debug!(role = %role.kind, turn, calls = calls.len(), "Model requested tools");
            messages.push(message);
            let outputs = dispatch_all(role, tools, &calls).await;
            for (call, output) in calls.iter().zip(outputs) {
                messages.push(json!({
                    "role": "tool",
                    "tool_call_id": call.id,
                    "content": output,
                }));
            }
        }

        warn!(role = %role.kind, max_turns, "Agent ran out of turns");
        Err(AgentError::MaxTurns(max_turns))
    }
}

/// Tool calls of an assistant message. Arguments arrive as a JSON-encoded
/// string; text that does not decode is kept as a string.
fn parse_tool_calls(message: &Value) -> Vec<ToolCall> {
    let Some(calls) = message.get("tool_calls").and_then(Value::as_array) else {
        return Vec::new();
    };
    calls
        .iter()
        .filter_map(|call| {
            let function = call.get("function")?;
            let name = function.get("name")?.as_str()?.to_string();
            let id = call
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let arguments = match function.get("arguments") {
                Some(Value::String(raw)) => {
                    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
                }
                Some(other) => other.clone(),
                None => Value::Null,
            };
            Some(ToolCall {
                id,
                name,
                arguments,
            })
        })
        .collect()
}
