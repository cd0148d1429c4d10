//! Error types for Verdist

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using VerdistError
pub type Result<T> = std::result::Result<T, VerdistError>;

/// Main error type for Verdist operations
#[derive(Debug, Error)]
pub enum VerdistError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Task-list expansion errors
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Placeholder rendering errors
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// Missing required field
    #[error("Missing required configuration field: {0}")]
    MissingField(String),

    /// Packaging tool could not be located
    #[error("Packaging tool not found: {0}")]
    ToolNotFound(String),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while expanding versions into packaging tasks
#[derive(Debug, Error)]
pub enum PlanError {
    /// No version identifiers were requested
    #[error("No versions requested")]
    NoVersions,

    /// The expansion produced no tasks
    #[error("Version plan produced no tasks (are all variants disabled?)")]
    EmptyPlan,

    /// Two tasks share the same identifier
    #[error("Duplicate task: {0}")]
    DuplicateTask(String),

    /// Version identifier is unusable
    #[error("Invalid version identifier '{0}': {1}")]
    InvalidVersion(String, String),

    /// Variant name is unusable
    #[error("Invalid variant name '{0}': {1}")]
    InvalidVariant(String, String),

    /// Build date could not be parsed
    #[error("Invalid build date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),
}

/// Placeholder rendering errors
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Template references a placeholder with no value
    #[error("Unknown placeholder {{{placeholder}}} in '{template}'")]
    UnknownPlaceholder {
        placeholder: String,
        template: String,
    },
}

impl VerdistError {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }
}
