use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid tool arguments: {0}")]
    Validation(String),

    #[error("External service error: {0}")]
    Transient(String),

    #[error("Run timed out after {0} seconds")]
    Timeout(u64),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Delegation failed: {0}")]
    Delegation(String),

    #[error("Agent exceeded {0} turns")]
    MaxTurns(u32),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Agent response parse error: {0}")]
    Parse(String),

    #[error("Output store error: {0}")]
    Store(#[from] fira_store::StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
