//! Verdist Core - Core library for version packaging
//!
//! This crate provides the configuration model, the shared error types and
//! the placeholder templating used by the packaging dispatcher and the
//! upload sinks.

pub mod config;
pub mod error;
pub mod template;

pub use config::{
    Config, PackagingConfig, RetryConfig, SinkConfig, UploadConfig, UploadPoolConfig,
    VariantConfig, VersionPlanConfig,
};
pub use error::{ConfigError, PlanError, Result, TemplateError, VerdistError};
pub use template::TemplateVars;
