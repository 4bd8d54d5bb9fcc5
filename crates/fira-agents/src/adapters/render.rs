use fira_models::RenderConfig;
use fira_store::OutputStore;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{debug, warn};

use super::files::with_md_extension;
use crate::error::AgentError;

#[derive(Debug, Deserialize)]
pub struct GeneratePdfArgs {
    pub markdown_filename: String,
}

/// Markdown-to-PDF rendering through an external binary.
#[derive(Debug, Clone)]
pub struct Renderer {
    command: String,
    args: Vec<String>,
}

impl Renderer {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }

    /// Check whether the renderer binary can be run.
    pub async fn is_available(&self) -> bool {
        match Command::new(&self.command).arg("--version").output().await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }

    pub async fn generate_pdf(
        &self,
        store: &OutputStore,
        args: GeneratePdfArgs,
    ) -> Result<Value, AgentError> {
        let file = with_md_extension(&args.markdown_filename);
        let source = store.locate(&file)?;
        if !source.is_file() {
            return Ok(json!({"error": "file not found", "file": file}));
        }

        if !self.is_available().await {
            warn!(command = %self.command, "PDF renderer not installed");
            return Ok(json!({
                "error": "renderer_not_installed",
                "detail": format!("`{}` was not found; the report stays Markdown only", self.command),
            }));
        }

        let pdf = source.with_extension("pdf");
        let pdf_name = pdf
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        debug!(source = %source.display(), "Rendering PDF");
        let output = Command::new(&self.command)
            .args(&self.args)
            .arg(&source)
            .arg("-o")
            .arg(&pdf)
            .current_dir(store.root())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, stderr = %stderr, "PDF rendering failed");
            return Ok(json!({
                "error": format!("PDF rendering failed ({}): {}", output.status, stderr.trim()),
                "file": file,
            }));
        }

        Ok(json!({"pdf_file": pdf_name, "file": file}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer(command: &str) -> Renderer {
        Renderer::new(&RenderConfig {
            command: command.to_string(),
            args: Vec::new(),
        })
    }

    #[tokio::test]
    async fn missing_source_is_reported_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path().join("outputs"));
        store.ensure_dir().unwrap();

        let value = renderer("/nonexistent/renderer")
            .generate_pdf(
                &store,
                GeneratePdfArgs {
                    markdown_filename: "report".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(value["error"], "file not found");
        assert_eq!(value["file"], "report.md");
    }

    #[tokio::test]
    async fn absent_renderer_has_distinct_code() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path().join("outputs"));
        store.ensure_dir().unwrap();
        std::fs::write(store.root().join("report.md"), "# Report").unwrap();

        let value = renderer("/nonexistent/renderer")
            .generate_pdf(
                &store,
                GeneratePdfArgs {
                    markdown_filename: "outputs/report.md".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(value["error"], "renderer_not_installed");
        assert!(value["detail"].is_string());
    }
}
