//! Package command

use clap::Args;
use console::style;
use tracing::info;

use verdist_tasks::{upload_queue, Dispatcher, PackageReport};

use crate::cli::output;
use crate::cli::{Cli, OutputFormat};
use crate::exit_codes::CommandFailure;

use super::{dispatcher_options, expand_tasks, load_configuration, reporter, PlanArgs};

/// Package versions without uploading the artifacts
#[derive(Debug, Args)]
pub struct PackageCommand {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Maximum concurrent packaging processes
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Show what would run without running it
    #[arg(long)]
    pub dry_run: bool,
}

impl PackageCommand {
    /// Execute the package command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(
            versions = ?self.plan.versions,
            dry_run = self.dry_run,
            "executing package command"
        );
        let (config, _) = load_configuration(cli)?;
        let tasks = expand_tasks(&config, &self.plan)?;

        let mut options = dispatcher_options(&config, self.dry_run)?;
        if let Some(concurrency) = self.concurrency {
            anyhow::ensure!(concurrency > 0, "--concurrency must be at least 1");
            options = options.with_concurrency(concurrency);
        }

        if cli.show_progress() {
            println!(
                "{} {} with up to {} at a time",
                style("Packaging").bold(),
                output::plural(tasks.len(), "task"),
                options.concurrency
            );
            println!();
        }

        // Nothing drains the queue; the receiver only has to outlive the run.
        let (queue, _receiver) = upload_queue();
        let dispatcher = Dispatcher::new(options, reporter(cli));
        let report = dispatcher.run(tasks, &queue).await?;

        match cli.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            OutputFormat::Text if !cli.quiet => print_report(&report),
            OutputFormat::Text => {}
        }

        if !report.is_success() {
            return Err(CommandFailure::Packaging(report.failures.len()).into());
        }
        Ok(())
    }
}

/// Summary lines for a packaging report
pub(crate) fn print_report(report: &PackageReport) {
    println!();
    let mut parts = vec![format!("{} packaged", report.succeeded.len())];
    if !report.failures.is_empty() {
        parts.push(style(format!("{} failed", report.failures.len())).red().to_string());
    }
    if !report.skipped.is_empty() {
        parts.push(format!("{} skipped", report.skipped.len()));
    }
    let line = format!("{} in {}", parts.join(", "), output::duration(report.duration));

    if report.is_success() {
        output::success(&line);
    } else {
        output::error(&line);
        for failure in &report.failures {
            let reason = failure.reason.lines().next().unwrap_or_default();
            println!("  {} {}", style(&failure.task_id).red(), reason);
        }
    }
}
