use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use fira_models::SandboxConfig;
use fira_store::OutputStore;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::parser::extract_reason;
use crate::prompts::CODE_INTERPRETER_INSTRUCTIONS;

const NO_DOWNLOADS: &str = "No downloads were generated and no <reason> was provided. \
Please call the tool again, and ask for downloadable files.";

/// Text answer of one sandbox submission and the container it ran in.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxSubmission {
    pub output_text: String,
    pub container_id: Option<String>,
}

/// A file inside a sandbox container. `source` is `"user"` for uploaded
/// inputs and something else for generated outputs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContainerFile {
    pub id: String,
    pub path: String,
    #[serde(default)]
    pub source: String,
}

/// Remote code-execution service.
#[async_trait]
pub trait SandboxService: Send + Sync {
    /// Upload a local file; returns an opaque file handle.
    async fn upload(&self, path: &Path) -> Result<String, AgentError>;

    async fn submit(
        &self,
        request: &str,
        file_ids: &[String],
    ) -> Result<SandboxSubmission, AgentError>;

    async fn list_files(&self, container_id: &str) -> Result<Vec<ContainerFile>, AgentError>;

    async fn download(&self, container_id: &str, file_id: &str) -> Result<Vec<u8>, AgentError>;
}

#[derive(Debug, Deserialize)]
pub struct CodeInterpreterArgs {
    #[serde(default)]
    pub request: String,
    #[serde(default)]
    pub input_files: Value,
}

/// Run an analysis in the sandbox and pull every generated file into the
/// store.
pub async fn run_code_interpreter(
    service: &dyn SandboxService,
    store: &OutputStore,
    max_attempts: u32,
    args: CodeInterpreterArgs,
) -> Result<Value, AgentError> {
    let request = args.request.trim();
    if request.is_empty() {
        return Err(AgentError::Validation(
            "'request' must be a non-empty analysis description".to_string(),
        ));
    }
    let input_files = input_file_names(&args.input_files)?;

    let mut file_ids = Vec::with_capacity(input_files.len());
    for name in &input_files {
        let path = store.locate(name)?;
        if !path.is_file() {
            return Err(AgentError::Validation(format!(
                "Input file '{name}' does not exist in the output directory. \
                 Use list_output_files to see what is available and read_file to preview it."
            )));
        }
        let id = service
            .upload(&path)
            .await
            .map_err(|e| AgentError::Transient(format!("Failed to upload {name}: {e}")))?;
        file_ids.push(id);
    }

    let submission = submit_with_retry(service, request, &file_ids, max_attempts).await?;

    let mut downloaded: Vec<PathBuf> = Vec::new();
    if let Some(container) = &submission.container_id {
        for file in service.list_files(container).await? {
            if file.source == "user" {
                continue;
            }
            let Some(name) = Path::new(&file.path).file_name() else {
                continue;
            };
            let bytes = service.download(container, &file.id).await?;
            let dest = store.resolve(name)?;
            std::fs::write(&dest, bytes)?;
            debug!(file = %dest.display(), "Downloaded sandbox output");
            downloaded.push(dest);
        }
    }

    if downloaded.is_empty() {
        let reason = extract_reason(&submission.output_text)
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| NO_DOWNLOADS.to_string());
        return Err(AgentError::Transient(reason));
    }

    info!(files = downloaded.len(), "Code interpreter finished");
    let files: Vec<String> = downloaded
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    Ok(json!({
        "analysis": submission.output_text,
        "files": files,
    }))
}

fn input_file_names(value: &Value) -> Result<Vec<String>, AgentError> {
    let invalid =
        || AgentError::Validation("'input_files' must be a non-empty list of filenames".to_string());
    let items = value.as_array().ok_or_else(invalid)?;
    if items.is_empty() {
        return Err(invalid());
    }
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or_else(invalid)
        })
        .collect()
}

/// Submit up to `max_attempts` times with no delay. Every failure counts as
/// retryable; the last one is returned as `Transient`.
async fn submit_with_retry(
    service: &dyn SandboxService,
    request: &str,
    file_ids: &[String],
    max_attempts: u32,
) -> Result<SandboxSubmission, AgentError> {
    let attempts = max_attempts.max(1);
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match service.submit(request, file_ids).await {
            Ok(submission) => return Ok(submission),
            Err(e) => {
                warn!(attempt, max_attempts = attempts, error = %e, "Sandbox submission failed");
                last_error = e.to_string();
            }
        }
    }
    Err(AgentError::Transient(format!(
        "Sandbox submission failed after {attempts} attempts: {last_error}"
    )))
}

/// Sandbox backed by the OpenAI Files, Responses and Containers endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiSandbox {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiSandbox {
    pub fn new(config: &SandboxConfig, api_key: impl Into<String>) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: config.model.clone(),
        })
    }

    async fn checked(&self, response: reqwest::Response) -> Result<reqwest::Response, AgentError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        Err(AgentError::Transient(format!(
            "Sandbox request failed ({status}): {text}"
        )))
    }
}

#[async_trait]
impl SandboxService for OpenAiSandbox {
    async fn upload(&self, path: &Path) -> Result<String, AgentError> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        let form = reqwest::multipart::Form::new()
            .text("purpose", "user_data")
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(name));

        let response = self
            .http
            .post(format!("{}/files", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        let body: Value = self.checked(response).await?.json().await?;
        body.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AgentError::Parse("file upload response has no id".to_string()))
    }

    async fn submit(
        &self,
        request: &str,
        file_ids: &[String],
    ) -> Result<SandboxSubmission, AgentError> {
        let body = json!({
            "model": self.model,
            "instructions": CODE_INTERPRETER_INSTRUCTIONS,
            "input": request,
            "tools": [{
                "type": "code_interpreter",
                "container": {"type": "auto", "file_ids": file_ids}
            }],
            "tool_choice": "required",
        });
        let response = self
            .http
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let body: Value = self.checked(response).await?.json().await?;
        Ok(parse_submission(&body))
    }

    async fn list_files(&self, container_id: &str) -> Result<Vec<ContainerFile>, AgentError> {
        #[derive(Deserialize)]
        struct Listing {
            #[serde(default)]
            data: Vec<ContainerFile>,
        }

        let response = self
            .http
            .get(format!("{}/containers/{container_id}/files", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let listing: Listing = self.checked(response).await?.json().await?;
        Ok(listing.data)
    }

    async fn download(&self, container_id: &str, file_id: &str) -> Result<Vec<u8>, AgentError> {
        let response = self
            .http
            .get(format!(
                "{}/containers/{container_id}/files/{file_id}/content",
                self.base_url
            ))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let bytes = self.checked(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

fn parse_submission(body: &Value) -> SandboxSubmission {
    let items = body
        .get("output")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut output_text = String::new();
    let mut container_id = None;
    for item in &items {
        match item.get("type").and_then(Value::as_str) {
            Some("message") => {
                let parts = item.get("content").and_then(Value::as_array);
                for part in parts.into_iter().flatten() {
                    if part.get("type").and_then(Value::as_str) == Some("output_text") {
                        if let Some(text) = part.get("text").and_then(Value::as_str) {
                            output_text.push_str(text);
                        }
                    }
                }
            }
            Some("code_interpreter_call") => {
                if container_id.is_none() {
                    container_id = item
                        .get("container_id")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                }
            }
            _ => {}
        }
    }

    SandboxSubmission {
        output_text,
        container_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_text_and_container() {
        let body = json!({
            "output": [
                {"type": "code_interpreter_call", "container_id": "cntr_1", "code": "..."},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "Volatility is 23%."},
                    {"type": "refusal", "text": "ignored"},
                    {"type": "output_text", "text": " Chart saved."}
                ]}
            ]
        });
        let submission = parse_submission(&body);
        assert_eq!(submission.output_text, "Volatility is 23%. Chart saved.");
        assert_eq!(submission.container_id.as_deref(), Some("cntr_1"));
    }

    #[test]
    fn input_files_must_be_strings() {
        assert!(input_file_names(&json!(["a.csv", "b.csv"])).is_ok());
        assert!(matches!(
            input_file_names(&json!([])),
            Err(AgentError::Validation(_))
        ));
        assert!(matches!(
            input_file_names(&json!("a.csv")),
            Err(AgentError::Validation(_))
        ));
        assert!(matches!(
            input_file_names(&json!(["a.csv", 3])),
            Err(AgentError::Validation(_))
        ));
        assert!(matches!(
            input_file_names(&Value::Null),
            Err(AgentError::Validation(_))
        ));
    }
}
