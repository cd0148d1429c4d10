//! Validate command

use std::path::PathBuf;

use clap::Args;
use console::style;
use tracing::info;

use verdist_core::config::{load_upload_config, load_version_plan};
use verdist_stores::SinkRegistry;

use crate::cli::{Cli, OutputFormat};
use crate::exit_codes::CommandFailure;

use super::load_configuration;

/// Load and check the configuration, version plan and upload sinks
#[derive(Debug, Args)]
pub struct ValidateCommand {
    /// Treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Default)]
struct Findings {
    config_path: Option<PathBuf>,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidateCommand {
    /// Execute the validate command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(strict = self.strict, "executing validate command");
        let mut findings = check(cli);

        if self.strict {
            let mut warnings = std::mem::take(&mut findings.warnings);
            findings.errors.append(&mut warnings);
        }

        let passed = findings.errors.is_empty();

        match cli.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "valid": passed,
                    "config_path": findings.config_path.as_ref().map(|p| p.display().to_string()),
                    "errors": findings.errors,
                    "warnings": findings.warnings,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Text if !cli.quiet => print_findings(&findings, passed),
            OutputFormat::Text => {}
        }

        if !passed {
            return Err(CommandFailure::Invalid(findings.errors.len()).into());
        }
        Ok(())
    }
}

fn check(cli: &Cli) -> Findings {
    let mut findings = Findings::default();

    let config = match load_configuration(cli) {
        Ok((config, path)) => {
            if path.is_none() {
                findings
                    .warnings
                    .push("No configuration file found, using defaults".to_string());
            }
            findings.config_path = path;
            config
        }
        Err(e) => {
            findings.errors.push(format!("Configuration: {:#}", e));
            return findings;
        }
    };

    if let Err(e) = config.packaging.resolve_tool() {
        findings.errors.push(format!("Packaging tool: {}", e));
    }

    if !config.packaging.source_dir.is_dir() {
        findings.errors.push(format!(
            "Source directory {} does not exist",
            config.packaging.source_dir.display()
        ));
    }

    match load_version_plan(&config.packaging.version_config) {
        Ok(plan) => {
            let enabled = plan.enabled_variants().count();
            if enabled == 0 {
                findings
                    .errors
                    .push("Version plan: every variant is disabled".to_string());
            } else if enabled < plan.variants.len() {
                findings.warnings.push(format!(
                    "Version plan: {} of {} variants disabled",
                    plan.variants.len() - enabled,
                    plan.variants.len()
                ));
            }
        }
        Err(e) => findings.errors.push(format!("Version plan: {}", e)),
    }

    match load_upload_config(&config.upload.config) {
        Ok(upload) => {
            let registry = SinkRegistry::from_config(&upload);
            for name in registry.unavailable() {
                findings
                    .warnings
                    .push(format!("Upload sink '{}' does not look available", name));
            }
        }
        Err(e) => findings.errors.push(format!("Upload config: {}", e)),
    }

    findings
}

fn print_findings(findings: &Findings, passed: bool) {
    println!("{}", style("Validation Results").bold());
    println!();

    if let Some(path) = &findings.config_path {
        println!("Config: {}", style(path.display()).cyan());
        println!();
    }

    if !findings.errors.is_empty() {
        println!("{}", style("Errors:").red().bold());
        for error in &findings.errors {
            println!("  {} {}", style("✗").red(), error);
        }
        println!();
    }

    if !findings.warnings.is_empty() {
        println!("{}", style("Warnings:").yellow().bold());
        for warning in &findings.warnings {
            println!("  {} {}", style("!").yellow(), warning);
        }
        println!();
    }

    if passed {
        if findings.warnings.is_empty() {
            println!("{}", style("✓ All checks passed").green().bold());
        } else {
            println!(
                "{} with {} warning(s)",
                style("✓ Validation passed").green().bold(),
                findings.warnings.len()
            );
        }
    } else {
        println!(
            "{} with {} error(s)",
            style("✗ Validation failed").red().bold(),
            findings.errors.len()
        );
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    use crate::cli::commands::test_support::write_project;
    use crate::exit_codes::{exit_code, CONFIG_ERROR};

    fn cli_for(dir: &std::path::Path) -> Cli {
        let config = dir.join("verdist.yaml");
        Cli::try_parse_from([
            "verdist",
            "-q",
            "--config",
            config.to_str().unwrap(),
            "validate",
        ])
        .unwrap()
    }

    #[test]
    fn test_valid_project() {
        let temp = TempDir::new().unwrap();
        write_project(temp.path());

        let findings = check(&cli_for(temp.path()));
        assert!(findings.errors.is_empty(), "{:?}", findings.errors);
        assert_eq!(findings.config_path, Some(temp.path().join("verdist.yaml")));
    }

    #[test]
    fn test_collects_every_problem() {
        let temp = TempDir::new().unwrap();
        write_project(temp.path());
        std::fs::write(temp.path().join("versions.yaml"), "variants: []\n").unwrap();
        std::fs::remove_file(temp.path().join("upload.yaml")).unwrap();

        let findings = check(&cli_for(temp.path()));
        assert_eq!(findings.errors.len(), 2, "{:?}", findings.errors);
        assert!(findings.errors[0].starts_with("Version plan"));
        assert!(findings.errors[1].starts_with("Upload config"));
    }

    #[test]
    fn test_invalid_maps_to_config_exit_code() {
        let temp = TempDir::new().unwrap();
        write_project(temp.path());
        std::fs::write(
            temp.path().join("verdist.yaml"),
            "packaging:\n  tool: /nonexistent/vermake\n",
        )
        .unwrap();

        let cli = cli_for(temp.path());
        let err = ValidateCommand { strict: false }.execute(&cli).unwrap_err();
        assert_eq!(exit_code(&err), CONFIG_ERROR);
    }
}
