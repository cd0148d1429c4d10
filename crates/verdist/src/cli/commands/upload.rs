//! Upload command

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use console::style;
use tracing::info;

use verdist_stores::Artifact;
use verdist_tasks::{
    check_variant, check_version, upload_queue, CompletedItem, TaskId, UploadPool, UploadPoolOptions, UploadSummary,
};

use crate::cli::output;
use crate::cli::{Cli, OutputFormat};
use crate::exit_codes::CommandFailure;

use super::{build_date, load_configuration, load_sinks, reporter};

/// Upload artifacts that were packaged earlier
#[derive(Debug, Args)]
pub struct UploadCommand {
    /// Artifact to upload (repeatable)
    #[arg(long = "artifact", value_name = "PATH", required = true)]
    pub artifacts: Vec<PathBuf>,

    /// Version the artifacts belong to
    #[arg(long)]
    pub version: String,

    /// Variant name (default: the artifact's file stem)
    #[arg(long)]
    pub variant: Option<String>,

    /// Build date (YYYY-MM-DD, default: today)
    #[arg(long)]
    pub date: Option<String>,

    /// Maximum simultaneous uploads
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Resolve destinations without transferring anything
    #[arg(long)]
    pub dry_run: bool,
}

impl UploadCommand {
    /// Execute the upload command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(
            artifacts = self.artifacts.len(),
            version = %self.version,
            dry_run = self.dry_run,
            "executing upload command"
        );
        let (config, _) = load_configuration(cli)?;
        let items = self.items()?;
        let sinks = Arc::new(load_sinks(&config, cli)?);

        let mut options = UploadPoolOptions::from_config(&config.upload).with_dry_run(self.dry_run);
        if let Some(concurrency) = self.concurrency {
            anyhow::ensure!(concurrency > 0, "--concurrency must be at least 1");
            options.concurrency = concurrency;
        }

        if cli.show_progress() {
            println!(
                "{} {} to {}",
                style("Uploading").bold(),
                output::plural(items.len(), "artifact"),
                sinks.names().join(", ")
            );
            println!();
        }

        let (queue, receiver) = upload_queue();
        let pool = UploadPool::spawn(receiver, sinks, options, reporter(cli));
        for item in items {
            queue.enqueue(item)?;
        }
        drop(queue);

        let summary = pool.join().await?;

        match cli.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
            OutputFormat::Text if !cli.quiet => print_summary(&summary),
            OutputFormat::Text => {}
        }

        check_summary(&summary)
    }

    fn items(&self) -> anyhow::Result<Vec<CompletedItem>> {
        if self.variant.is_some() && self.artifacts.len() > 1 {
            anyhow::bail!("--variant can only be given with a single --artifact");
        }

        // Both parts of the id end up as directories under each sink root.
        check_version(&self.version)?;
        let date = build_date(self.date.as_deref())?;
        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(self.artifacts.len());

        for path in &self.artifacts {
            let artifact = Artifact::from_path(path)
                .and_then(Artifact::with_sha256)
                .with_context(|| format!("Cannot read artifact {}", path.display()))?;

            let variant = match &self.variant {
                Some(variant) => variant.clone(),
                None => path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
                    .with_context(|| format!("Cannot derive a variant from {}", path.display()))?,
            };
            check_variant(&variant)?;

            let id = TaskId::new(self.version.as_str(), variant);
            if !seen.insert(id.clone()) {
                anyhow::bail!("Artifact {} is given more than once", id);
            }
            items.push(CompletedItem::from_artifact(id, date, artifact));
        }

        Ok(items)
    }
}

/// Summary lines for an upload pool run
pub(crate) fn print_summary(summary: &UploadSummary) {
    println!();
    let mut parts = vec![format!("{} uploaded", summary.succeeded.len())];
    if !summary.failed.is_empty() {
        parts.push(style(format!("{} failed", summary.failed.len())).red().to_string());
    }
    if !summary.unprocessed.is_empty() {
        parts.push(
            style(format!("{} not uploaded", summary.unprocessed.len()))
                .yellow()
                .to_string(),
        );
    }
    let line = format!("{} in {}", parts.join(", "), output::duration(summary.duration));

    if summary.is_success() {
        output::success(&line);
        return;
    }

    output::error(&line);
    for failure in &summary.failed {
        println!(
            "  {} {}: {}",
            style(&failure.task_id).red(),
            failure.sink,
            failure.error
        );
    }
    for item in &summary.unprocessed {
        println!(
            "  {} {} ({})",
            style(item.id()).yellow(),
            output::path_style().apply_to(item.artifact.path.display()),
            summary.reason
        );
    }
}

/// Turn failed or unprocessed uploads into a command failure
pub(crate) fn check_summary(summary: &UploadSummary) -> anyhow::Result<()> {
    if summary.is_success() {
        return Ok(());
    }
    Err(CommandFailure::Upload {
        failed: summary.failed.len(),
        unprocessed: summary.unprocessed.len(),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    use crate::cli::commands::test_support::write_project;

    fn cli_for(dir: &std::path::Path, args: &[&str]) -> Cli {
        let config = dir.join("verdist.yaml");
        let mut argv = vec!["verdist", "-q", "--config", config.to_str().unwrap(), "upload"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn command(cli: &Cli) -> &UploadCommand {
        match &cli.command {
            crate::cli::Commands::Upload(cmd) => cmd,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_upload_copies_into_sink() {
        let temp = TempDir::new().unwrap();
        write_project(temp.path());
        let artifact = temp.path().join("1.0-linux.zip");
        std::fs::write(&artifact, b"zip").unwrap();

        let cli = cli_for(
            temp.path(),
            &[
                "--artifact",
                artifact.to_str().unwrap(),
                "--version",
                "1.0",
                "--variant",
                "linux",
                "--date",
                "2024-01-01",
            ],
        );
        command(&cli).execute(&cli).unwrap();

        let uploaded = temp
            .path()
            .join("releases/1.0/2024-01-01/1.0-linux.zip");
        assert_eq!(std::fs::read(uploaded).unwrap(), b"zip");
    }

    #[test]
    fn test_variant_defaults_to_file_stem() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("linux.zip");
        let b = temp.path().join("mac.zip");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();

        let cli = cli_for(
            temp.path(),
            &[
                "--artifact",
                a.to_str().unwrap(),
                "--artifact",
                b.to_str().unwrap(),
                "--version",
                "2.0",
            ],
        );
        let items = command(&cli).items().unwrap();
        let ids: Vec<String> = items.iter().map(|i| i.id().to_string()).collect();
        assert_eq!(ids, vec!["2.0:linux", "2.0:mac"]);
        assert!(items[0].artifact.sha256.is_some());
    }

    #[test]
    fn test_missing_artifact_is_an_error() {
        let temp = TempDir::new().unwrap();
        let cli = cli_for(
            temp.path(),
            &["--artifact", "/nonexistent/a.zip", "--version", "1.0"],
        );
        assert!(command(&cli).items().is_err());
    }

    #[test]
    fn test_ids_that_leave_the_sink_root_are_rejected() {
        let temp = TempDir::new().unwrap();
        let artifact = temp.path().join("linux.zip");
        std::fs::write(&artifact, b"zip").unwrap();
        let path = artifact.to_str().unwrap();

        for version in ["..", "../../x", "a/b"] {
            let cli = cli_for(temp.path(), &["--artifact", path, "--version", version]);
            let err = command(&cli).items().unwrap_err();
            assert!(err.to_string().contains("Invalid version"), "{version}: {err}");
        }

        for variant in ["..", "a/b"] {
            let cli = cli_for(
                temp.path(),
                &["--artifact", path, "--version", "1.0", "--variant", variant],
            );
            let err = command(&cli).items().unwrap_err();
            assert!(err.to_string().contains("Invalid variant"), "{variant}: {err}");
        }

        let dotted = temp.path().join("...zip");
        std::fs::write(&dotted, b"zip").unwrap();
        let cli = cli_for(
            temp.path(),
            &["--artifact", dotted.to_str().unwrap(), "--version", "1.0"],
        );
        assert!(command(&cli).items().is_err());
    }
}
