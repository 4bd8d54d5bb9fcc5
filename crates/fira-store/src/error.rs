use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path escapes the output directory: {0}")]
    OutsideRoot(String),

    #[error("File not found: {0}")]
    NotFound(String),
}
