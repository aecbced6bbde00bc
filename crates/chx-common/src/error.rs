//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for CHX operations
pub type Result<T> = std::result::Result<T, ChxError>;

/// Workspace-level error type
#[derive(Error, Debug)]
pub enum ChxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timestamp parse error: {0}")]
    Timestamp(String),
}
