//! Plan command

use clap::Args;
use console::style;
use tracing::info;

use crate::cli::output::{self, header, key_value};
use crate::cli::{Cli, OutputFormat};

use super::{dispatcher_options, expand_tasks, load_configuration, PlanArgs};

/// Show the packaging tasks for the given versions without running them
#[derive(Debug, Args)]
pub struct PlanCommand {
    #[command(flatten)]
    pub plan: PlanArgs,
}

impl PlanCommand {
    /// Execute the plan command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(versions = ?self.plan.versions, "executing plan command");
        let (config, _) = load_configuration(cli)?;
        let tasks = expand_tasks(&config, &self.plan)?;

        match cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            }
            OutputFormat::Text => {
                // The plan is still shown when the tool is missing.
                let options = dispatcher_options(&config, true)?;

                println!("{}", header("Packaging plan"));
                println!("{}", key_value("Tool", &options.tool.display().to_string()));
                println!(
                    "{}",
                    key_value("Source", &options.source_dir.display().to_string())
                );
                println!(
                    "{}",
                    key_value("Concurrency", &options.concurrency.to_string())
                );
                println!();

                for task in &tasks {
                    println!("  {}", output::task_style().apply_to(&task.id));
                    println!(
                        "    {} {}",
                        style("→").dim(),
                        output::path_style().apply_to(task.artifact.display())
                    );
                    if cli.verbose {
                        println!("    {}", style(options.command_line(task)).dim());
                    }
                }

                println!();
                println!("{}", output::plural(tasks.len(), "task"));
            }
        }

        Ok(())
    }
}
