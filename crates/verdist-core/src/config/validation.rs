//! Configuration validation

use std::collections::HashSet;
use std::path::PathBuf;

use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::template::placeholders;

use super::types::{Config, SinkConfig, UploadConfig, VersionPlanConfig};

/// Placeholders the version plan may reference
pub const PLAN_PLACEHOLDERS: &[&str] = &["version", "variant", "date", "compact_date", "dest", "source"];

/// Placeholders a destination layout may reference
pub const LAYOUT_PLACEHOLDERS: &[&str] = &["version", "variant", "date", "compact_date"];

/// Placeholders an upload command may reference
pub const SINK_PLACEHOLDERS: &[&str] = &["artifact", "name", "version", "variant", "date", "compact_date"];

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_packaging(config)?;
    validate_upload_pool(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn validate_packaging(config: &Config) -> Result<()> {
    let packaging = &config.packaging;

    if packaging.concurrency == 0 {
        return Err(invalid("packaging.concurrency", "must be at least 1"));
    }

    if packaging.timeout_secs == Some(0) {
        return Err(invalid("packaging.timeout_secs", "must be greater than 0"));
    }

    if let Some(tool) = &packaging.tool {
        if tool.as_os_str().is_empty() {
            return Err(invalid("packaging.tool", "tool cannot be empty"));
        }
    }

    validate_layout("packaging.layout", &packaging.layout)
}

fn validate_upload_pool(config: &Config) -> Result<()> {
    let upload = &config.upload;

    if upload.concurrency == 0 {
        return Err(invalid("upload.concurrency", "must be at least 1"));
    }

    if upload.retry.max_attempts == 0 {
        return Err(invalid("upload.retry.max_attempts", "must be at least 1"));
    }

    if !upload.retry.multiplier.is_finite() || upload.retry.multiplier < 1.0 {
        return Err(invalid("upload.retry.multiplier", "must be a number >= 1.0"));
    }

    if upload.retry.max_delay_ms < upload.retry.base_delay_ms {
        return Err(invalid(
            "upload.retry.max_delay_ms",
            "must not be smaller than base_delay_ms",
        ));
    }

    Ok(())
}

/// Validate the version plan
pub fn validate_version_plan(plan: &VersionPlanConfig) -> Result<()> {
    debug!(count = plan.variants.len(), "validating version plan");

    if plan.variants.is_empty() {
        return Err(invalid("variants", "at least one variant is required"));
    }

    check_placeholders("artifact", &plan.artifact, PLAN_PLACEHOLDERS)?;
    for (i, arg) in plan.common_args.iter().enumerate() {
        check_placeholders(&format!("common_args[{}]", i), arg, PLAN_PLACEHOLDERS)?;
    }

    let mut seen = HashSet::new();
    for (i, variant) in plan.variants.iter().enumerate() {
        if variant.name.trim().is_empty() {
            return Err(invalid(&format!("variants[{}].name", i), "variant name cannot be empty"));
        }

        if variant.name.contains(':') || variant.name.contains('/') {
            return Err(invalid(
                &format!("variants[{}].name", i),
                "variant name cannot contain ':' or '/'",
            ));
        }

        if !seen.insert(variant.name.as_str()) {
            return Err(invalid(
                &format!("variants[{}].name", i),
                &format!("duplicate variant '{}'", variant.name),
            ));
        }

        for (j, arg) in variant.args.iter().enumerate() {
            check_placeholders(&format!("variants[{}].args[{}]", i, j), arg, PLAN_PLACEHOLDERS)?;
        }

        if let Some(artifact) = &variant.artifact {
            check_placeholders(&format!("variants[{}].artifact", i), artifact, PLAN_PLACEHOLDERS)?;
        }
    }

    Ok(())
}

/// Validate the upload sink definitions
pub fn validate_upload_config(upload: &UploadConfig) -> Result<()> {
    debug!(count = upload.sinks.len(), "validating upload config");

    if upload.sinks.is_empty() {
        return Err(invalid("sinks", "at least one sink is required"));
    }

    let mut seen = HashSet::new();
    for (i, sink) in upload.sinks.iter().enumerate() {
        let field = format!("sinks[{}]", i);

        if sink.name().trim().is_empty() {
            return Err(invalid(&format!("{}.name", field), "sink name cannot be empty"));
        }

        if !seen.insert(sink.name()) {
            return Err(invalid(
                &format!("{}.name", field),
                &format!("duplicate sink '{}'", sink.name()),
            ));
        }

        match sink {
            SinkConfig::Directory { path, layout, .. } => {
                if *path == PathBuf::new() {
                    return Err(ConfigError::MissingField(format!("{}.path", field)).into());
                }
                validate_layout(&format!("{}.layout", field), layout)?;
            }
            SinkConfig::Command {
                command,
                args,
                timeout_secs,
                ..
            } => {
                if command.trim().is_empty() {
                    return Err(ConfigError::MissingField(format!("{}.command", field)).into());
                }
                if *timeout_secs == Some(0) {
                    return Err(invalid(&format!("{}.timeout_secs", field), "must be greater than 0"));
                }
                for (j, arg) in args.iter().enumerate() {
                    check_placeholders(&format!("{}.args[{}]", field, j), arg, SINK_PLACEHOLDERS)?;
                }
            }
        }
    }

    Ok(())
}

fn validate_layout(field: &str, layout: &str) -> Result<()> {
    if !layout.contains("{version}") {
        return Err(invalid(field, "must contain {version} placeholder"));
    }
    if layout.starts_with('/') || layout.split('/').any(|part| part == "..") {
        return Err(invalid(field, "must be a relative path without '..'"));
    }
    check_placeholders(field, layout, LAYOUT_PLACEHOLDERS)
}

fn check_placeholders(field: &str, template: &str, allowed: &[&str]) -> Result<()> {
    for name in placeholders(template) {
        if !allowed.contains(&name.as_str()) {
            return Err(invalid(
                field,
                &format!("unknown placeholder {{{}}}; expected one of: {}", name, allowed.join(", ")),
            ));
        }
    }
    Ok(())
}

fn invalid(field: &str, message: &str) -> crate::error::VerdistError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}
