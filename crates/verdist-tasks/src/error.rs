//! Task orchestration errors

use thiserror::Error;

use verdist_core::{PlanError, TemplateError};

use crate::task::CompletedItem;

/// Errors raised by the dispatcher, the upload queue and the upload pool
#[derive(Debug, Error)]
pub enum TaskError {
    /// Task list could not be built or is unusable
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Placeholder rendering failed while expanding a task
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// The upload queue no longer has a receiver; the item is handed back
    #[error("Upload queue is closed, {} was not enqueued", .0.task.id)]
    QueueClosed(Box<CompletedItem>),

    /// The upload pool task panicked or was cancelled
    #[error("Upload pool terminated abnormally: {0}")]
    PoolAborted(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for task operations
pub type Result<T> = std::result::Result<T, TaskError>;
