//! CLI commands

mod init;
mod package;
mod plan;
mod run;
mod upload;
mod validate;

pub use init::InitCommand;
pub use package::PackageCommand;
pub use plan::PlanCommand;
pub use run::RunCommand;
pub use upload::UploadCommand;
pub use validate::ValidateCommand;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use tracing::{debug, warn};

use verdist_core::config::{load_config, load_config_or_default, load_upload_config, load_version_plan};
use verdist_core::Config;
use verdist_stores::SinkRegistry;
use verdist_tasks::{
    parse, parse_build_date, DispatcherOptions, PackageTask, PlanRequest, TaskReporter,
    TracingReporter,
};

use crate::cli::output::{self, ConsoleReporter};
use crate::cli::Cli;

/// Which versions to package, shared by `plan`, `package` and `run`
#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Version to package (repeatable)
    #[arg(long = "version", value_name = "VERSION", required = true)]
    pub versions: Vec<String>,

    /// Build date (YYYY-MM-DD, default: today)
    #[arg(long)]
    pub date: Option<String>,

    /// Output directory (default: packaging.output_dir)
    #[arg(long)]
    pub dest: Option<PathBuf>,

    /// Only package these variants (repeatable)
    #[arg(long = "variant", value_name = "VARIANT")]
    pub variants: Vec<String>,
}

/// Load the configuration named by `--config`, or search for one
pub(crate) fn load_configuration(cli: &Cli) -> anyhow::Result<(Config, Option<PathBuf>)> {
    match &cli.config {
        Some(path) => {
            let config = load_config(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            Ok((config, Some(path.clone())))
        }
        None => {
            let cwd = std::env::current_dir()?;
            let loaded = load_config_or_default(&cwd).context("Failed to load configuration")?;
            if loaded.1.is_none() {
                debug!("no configuration file found, using defaults");
                if cli.show_progress() {
                    output::info("No configuration file found, using defaults");
                }
            }
            Ok(loaded)
        }
    }
}

/// Parse `--date`, defaulting to today in local time
pub(crate) fn build_date(date: Option<&str>) -> anyhow::Result<chrono::NaiveDate> {
    match date {
        Some(date) => Ok(parse_build_date(date)?),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

/// Expand the version plan into packaging tasks
pub(crate) fn expand_tasks(config: &Config, args: &PlanArgs) -> anyhow::Result<Vec<PackageTask>> {
    let plan_path = &config.packaging.version_config;
    let mut plan = load_version_plan(plan_path)
        .with_context(|| format!("Failed to load version plan from {}", plan_path.display()))?;

    if !args.variants.is_empty() {
        for name in &args.variants {
            if !plan.variants.iter().any(|v| &v.name == name) {
                anyhow::bail!("Unknown variant '{}' (not in {})", name, plan_path.display());
            }
        }
        plan.variants.retain(|v| args.variants.contains(&v.name));
    }

    let dest = args
        .dest
        .clone()
        .unwrap_or_else(|| config.packaging.output_dir.clone());
    let request = PlanRequest::new(args.versions.clone(), build_date(args.date.as_deref())?, absolute(&dest)?)
        .with_source_dir(&config.packaging.source_dir)
        .with_layout(&config.packaging.layout);

    Ok(parse(&plan, &request)?)
}

fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Dispatcher options from config, tolerating a missing tool in dry runs
pub(crate) fn dispatcher_options(config: &Config, dry_run: bool) -> anyhow::Result<DispatcherOptions> {
    match DispatcherOptions::from_config(&config.packaging) {
        Ok(options) => Ok(options.with_dry_run(dry_run)),
        Err(e) if dry_run => {
            warn!(error = %e, "packaging tool unavailable, continuing dry run");
            let tool = config
                .packaging
                .tool
                .clone()
                .unwrap_or_else(|| PathBuf::from("vermake"));
            let mut options = DispatcherOptions::new(tool)
                .with_source_dir(&config.packaging.source_dir)
                .with_concurrency(config.packaging.concurrency)
                .with_dry_run(true);
            options.env = config.packaging.env.clone();
            Ok(options)
        }
        Err(e) => Err(e).context("Packaging tool is not usable"),
    }
}

/// Build the upload sinks from the upload configuration
pub(crate) fn load_sinks(config: &Config, cli: &Cli) -> anyhow::Result<SinkRegistry> {
    let path = &config.upload.config;
    let upload = load_upload_config(path)
        .with_context(|| format!("Failed to load upload configuration from {}", path.display()))?;
    let registry = SinkRegistry::from_config(&upload);

    for name in registry.unavailable() {
        warn!(sink = %name, "upload sink is not available");
        if cli.show_progress() {
            output::warning(&format!("Upload sink '{}' does not look available", name));
        }
    }

    Ok(registry)
}

/// Console reporter unless output is quiet or machine-readable
pub(crate) fn reporter(cli: &Cli) -> Arc<dyn TaskReporter> {
    if cli.show_progress() {
        Arc::new(ConsoleReporter::new(cli.verbose))
    } else {
        Arc::new(TracingReporter)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;

    /// Write a config, version plan and upload config into `dir`
    pub fn write_project(dir: &Path) {
        std::fs::write(
            dir.join("verdist.yaml"),
            "packaging:\n  tool: /bin/sh\n  output_dir: dist\n  concurrency: 2\nupload:\n  config: upload.yaml\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("versions.yaml"),
            "artifact: \"{version}-{variant}.zip\"\nvariants:\n  - name: linux\n    args: [\"--target=linux\"]\n  - name: mac\n    args: [\"--target=mac\"]\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("upload.yaml"),
            "sinks:\n  - kind: directory\n    name: archive\n    path: releases\n",
        )
        .unwrap();
    }
}
