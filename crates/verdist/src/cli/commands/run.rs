//! Run command: package versions and upload every artifact that succeeds

use std::sync::Arc;

use clap::Args;
use console::style;
use tracing::{info, warn};

use verdist_tasks::{upload_queue, Dispatcher, UploadPool, UploadPoolOptions};

use crate::cli::output;
use crate::cli::{Cli, OutputFormat};
use crate::exit_codes::CommandFailure;

use super::package::print_report;
use super::upload::{check_summary, print_summary};
use super::{dispatcher_options, expand_tasks, load_configuration, load_sinks, reporter, PlanArgs};

/// Package versions and upload the artifacts as they are produced
#[derive(Debug, Args)]
pub struct RunCommand {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Package only, do not upload
    #[arg(long)]
    pub no_upload: bool,

    /// Show what would run without running or uploading anything
    #[arg(long)]
    pub dry_run: bool,

    /// Maximum concurrent packaging processes
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Maximum simultaneous uploads
    #[arg(long)]
    pub upload_concurrency: Option<usize>,
}

impl RunCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(
            versions = ?self.plan.versions,
            no_upload = self.no_upload,
            dry_run = self.dry_run,
            "executing run command"
        );
        let (config, _) = load_configuration(cli)?;
        let tasks = expand_tasks(&config, &self.plan)?;

        let mut options = dispatcher_options(&config, self.dry_run)?;
        if let Some(concurrency) = self.concurrency {
            anyhow::ensure!(concurrency > 0, "--concurrency must be at least 1");
            options = options.with_concurrency(concurrency);
        }

        let mut pool_options = UploadPoolOptions::from_config(&config.upload).with_dry_run(self.dry_run);
        if let Some(concurrency) = self.upload_concurrency {
            anyhow::ensure!(concurrency > 0, "--upload-concurrency must be at least 1");
            pool_options.concurrency = concurrency;
        }

        let sinks = if self.no_upload {
            None
        } else {
            Some(Arc::new(load_sinks(&config, cli)?))
        };

        if cli.show_progress() {
            println!(
                "{} {} with up to {} at a time",
                style("Packaging").bold(),
                output::plural(tasks.len(), "task"),
                options.concurrency
            );
            if let Some(sinks) = &sinks {
                println!(
                    "{} to {}",
                    style("Uploading").bold(),
                    sinks.names().join(", ")
                );
            }
            println!();
        }

        let reporter = reporter(cli);
        let (queue, receiver) = upload_queue();

        let (pool, _receiver) = match sinks {
            Some(sinks) => (
                Some(UploadPool::spawn(receiver, sinks, pool_options, reporter.clone())),
                None,
            ),
            None => (None, Some(receiver)),
        };

        let signal_task = pool.as_ref().map(|pool| {
            let shutdown = pool.shutdown_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted, stopping uploads after in-flight items");
                    shutdown.shutdown();
                }
            })
        });

        let dispatcher = Dispatcher::new(options, reporter);
        let report = dispatcher.run(tasks, &queue).await;
        // Closing the queue lets the pool stop once it has drained.
        drop(queue);

        let summary = match pool {
            Some(pool) => Some(pool.join().await?),
            None => None,
        };
        if let Some(task) = signal_task {
            task.abort();
        }
        let report = report?;

        match cli.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "packaging": report,
                    "upload": summary,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Text if !cli.quiet => {
                print_report(&report);
                if let Some(summary) = &summary {
                    print_summary(summary);
                }
            }
            OutputFormat::Text => {}
        }

        if !report.is_success() {
            return Err(CommandFailure::Packaging(report.failures.len()).into());
        }
        match &summary {
            Some(summary) => check_summary(summary),
            None => Ok(()),
        }
    }
}
