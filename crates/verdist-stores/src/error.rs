//! Sink error types

use thiserror::Error;

use verdist_core::TemplateError;

/// Upload-related errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Invalid artifact
    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    /// Upload failed
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Tool not found
    #[error("Required tool not found: {0}")]
    ToolNotFound(String),

    /// Upload command exited unsuccessfully
    #[error("Command '{command}' failed with exit code {exit_code:?}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Rate limited by the remote side
    #[error("Rate limited, retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },

    /// Placeholder rendering error
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// Whether trying the same upload again could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UploadFailed(_)
                | Self::CommandFailed { .. }
                | Self::Timeout(_)
                | Self::RateLimited { .. }
                | Self::Io(_)
        )
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
