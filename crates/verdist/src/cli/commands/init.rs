//! Init command

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use console::style;
use tracing::info;

use verdist_core::config::defaults::{
    DEFAULT_CONFIG_TEMPLATE, DEFAULT_CONFIG_TOML, DEFAULT_CONFIG_YAML, DEFAULT_UPLOAD_CONFIG,
    DEFAULT_UPLOAD_TEMPLATE, DEFAULT_VERSION_CONFIG, DEFAULT_VERSION_PLAN_TEMPLATE,
};

use crate::cli::output;
use crate::cli::Cli;

/// Write a starter configuration, version plan and upload config
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Overwrite existing files
    #[arg(short, long)]
    pub force: bool,

    /// Write the main configuration as TOML
    #[arg(long)]
    pub toml: bool,

    /// Directory to write into (default: current directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// What happened to one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOutcome {
    Written,
    Kept,
}

impl InitCommand {
    /// Execute the init command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(force = self.force, toml = self.toml, "executing init command");
        let dir = match &self.output {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let (config_name, config_content) = if self.toml {
            (DEFAULT_CONFIG_TOML, template_as_toml()?)
        } else {
            (DEFAULT_CONFIG_YAML, DEFAULT_CONFIG_TEMPLATE.to_string())
        };

        let files = [
            (config_name, config_content),
            (DEFAULT_VERSION_CONFIG, DEFAULT_VERSION_PLAN_TEMPLATE.to_string()),
            (DEFAULT_UPLOAD_CONFIG, DEFAULT_UPLOAD_TEMPLATE.to_string()),
        ];

        let mut written = 0;
        for (name, content) in &files {
            let path = dir.join(name);
            match write_file(&path, content, self.force)? {
                WriteOutcome::Written => {
                    written += 1;
                    if !cli.quiet {
                        output::success(&format!(
                            "Wrote {}",
                            output::path_style().apply_to(path.display())
                        ));
                    }
                }
                WriteOutcome::Kept => {
                    if !cli.quiet {
                        output::warning(&format!(
                            "{} already exists, use --force to overwrite",
                            path.display()
                        ));
                    }
                }
            }
        }

        if !cli.quiet && written > 0 {
            println!();
            println!("Next steps:");
            println!(
                "  1. Point {} at your packaging tool",
                style("packaging.tool").cyan()
            );
            println!("  2. Describe your variants in {}", style(DEFAULT_VERSION_CONFIG).cyan());
            println!(
                "  3. Run {} to check everything",
                style("verdist validate").cyan()
            );
        }

        Ok(())
    }
}

fn write_file(path: &Path, content: &str, force: bool) -> anyhow::Result<WriteOutcome> {
    if path.exists() && !force {
        return Ok(WriteOutcome::Kept);
    }
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "wrote file");
    Ok(WriteOutcome::Written)
}

/// The YAML template re-encoded as TOML (comments are lost)
fn template_as_toml() -> anyhow::Result<String> {
    let value: serde_yaml::Value = serde_yaml::from_str(DEFAULT_CONFIG_TEMPLATE)?;
    let content = toml::to_string_pretty(&value).context("Failed to convert template to TOML")?;
    Ok(format!("# Verdist Configuration\n\n{}", content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;
    use verdist_core::config::{load_config, load_upload_config, load_version_plan};

    fn cli() -> Cli {
        Cli::try_parse_from(["verdist", "-q", "init"]).unwrap()
    }

    fn init(dir: &Path, force: bool, toml: bool) {
        InitCommand {
            force,
            toml,
            output: Some(dir.to_path_buf()),
        }
        .execute(&cli())
        .unwrap();
    }

    #[test]
    fn test_init_writes_loadable_files() {
        let temp = TempDir::new().unwrap();
        init(temp.path(), false, false);

        let config = load_config(&temp.path().join(DEFAULT_CONFIG_YAML)).unwrap();
        assert_eq!(config.packaging.version_config, temp.path().join(DEFAULT_VERSION_CONFIG));

        let plan = load_version_plan(&config.packaging.version_config).unwrap();
        assert_eq!(plan.variants.len(), 2);
        let upload = load_upload_config(&config.upload.config).unwrap();
        assert_eq!(upload.sinks.len(), 1);
    }

    #[test]
    fn test_init_keeps_existing_files() {
        let temp = TempDir::new().unwrap();
        let plan = temp.path().join(DEFAULT_VERSION_CONFIG);
        std::fs::write(&plan, "custom").unwrap();

        init(temp.path(), false, false);
        assert_eq!(std::fs::read_to_string(&plan).unwrap(), "custom");

        init(temp.path(), true, false);
        assert_eq!(
            std::fs::read_to_string(&plan).unwrap(),
            DEFAULT_VERSION_PLAN_TEMPLATE
        );
    }

    #[test]
    fn test_init_toml() {
        let temp = TempDir::new().unwrap();
        init(temp.path(), false, true);

        let path = temp.path().join(DEFAULT_CONFIG_TOML);
        let config = load_config(&path).unwrap();
        assert_eq!(config.packaging.concurrency, 4);
        assert_eq!(config.upload.retry.max_attempts, 3);
        assert!(!temp.path().join(DEFAULT_CONFIG_YAML).exists());
    }
}
