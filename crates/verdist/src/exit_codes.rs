//! Exit codes for the CLI

use thiserror::Error;

use verdist_core::{ConfigError, VerdistError};

/// Success
pub const SUCCESS: i32 = 0;

/// General error
pub const ERROR: i32 = 1;

/// Configuration error
pub const CONFIG_ERROR: i32 = 2;

/// At least one packaging task failed
pub const PACKAGING_FAILED: i32 = 3;

/// At least one upload failed or was left unprocessed
pub const UPLOAD_FAILED: i32 = 4;

/// Failures a command reports after it ran to completion
#[derive(Debug, Error)]
pub enum CommandFailure {
    #[error("{0} packaging task(s) failed")]
    Packaging(usize),

    #[error("{failed} upload(s) failed, {unprocessed} left unprocessed")]
    Upload { failed: usize, unprocessed: usize },

    #[error("{0} configuration problem(s) found")]
    Invalid(usize),
}

/// Map an error to the process exit code
pub fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(failure) = cause.downcast_ref::<CommandFailure>() {
            return match failure {
                CommandFailure::Packaging(_) => PACKAGING_FAILED,
                CommandFailure::Upload { .. } => UPLOAD_FAILED,
                CommandFailure::Invalid(_) => CONFIG_ERROR,
            };
        }
        if cause.downcast_ref::<ConfigError>().is_some() {
            return CONFIG_ERROR;
        }
        if let Some(VerdistError::Config(_)) = cause.downcast_ref::<VerdistError>() {
            return CONFIG_ERROR;
        }
    }
    ERROR
}
