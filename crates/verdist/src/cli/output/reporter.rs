//! Console reporter with live progress

use console::style;

use verdist_tasks::{TaskEvent, TaskReporter};

use super::{bytes, duration};

/// Prints packaging and upload progress as it happens
pub struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl TaskReporter for ConsoleReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { id, command } => {
                println!(
                    "  {} {} {}",
                    style("▸").dim(),
                    style(id).bold(),
                    if self.verbose {
                        style(format!("({})", command)).dim().to_string()
                    } else {
                        String::new()
                    }
                );
            }
            TaskEvent::Output { id, line, is_stderr } => {
                if self.verbose {
                    if *is_stderr {
                        println!("    {} {}", style(format!("[{}]", id)).red().dim(), line);
                    } else {
                        println!("    {} {}", style(format!("[{}]", id)).dim(), line);
                    }
                }
            }
            TaskEvent::Packaged {
                id,
                artifact,
                size,
                duration: elapsed,
            } => {
                println!(
                    "  {} {} {} {} {}",
                    style("✓").green(),
                    style(id).green(),
                    style(artifact).cyan(),
                    style(format!("({})", bytes(*size))).dim(),
                    duration(*elapsed)
                );
            }
            TaskEvent::Failed {
                id,
                duration: elapsed,
                error,
            } => {
                println!(
                    "  {} {} {}",
                    style("✗").red(),
                    style(id).red(),
                    duration(*elapsed)
                );
                for line in error.lines() {
                    println!("    {}", style(line).red());
                }
            }
            TaskEvent::Skipped { id, reason } => {
                println!(
                    "  {} {} {}",
                    style("○").yellow(),
                    style(id).yellow(),
                    style(format!("({})", reason)).dim()
                );
            }
            TaskEvent::Enqueued { .. } => {}
            TaskEvent::AllPackaged { .. } => {}
            TaskEvent::UploadStarted { id, sinks } => {
                if self.verbose {
                    println!(
                        "  {} {} {}",
                        style("↑").dim(),
                        style(id).bold(),
                        style(format!("({} sinks)", sinks)).dim()
                    );
                }
            }
            TaskEvent::UploadRetry {
                id,
                sink,
                attempt,
                delay,
                error,
            } => {
                println!(
                    "  {} {} {} attempt {} failed, retrying in {}: {}",
                    style("↻").yellow(),
                    style(id).yellow(),
                    style(sink).dim(),
                    attempt,
                    duration(*delay),
                    error
                );
            }
            TaskEvent::Uploaded {
                id,
                locations,
                skipped,
                duration: elapsed,
            } => {
                let label = if *skipped { "(dry run)" } else { "uploaded" };
                println!(
                    "  {} {} {} {}",
                    style("↑").green(),
                    style(id).green(),
                    style(label).dim(),
                    duration(*elapsed)
                );
                if self.verbose {
                    for location in locations {
                        println!("    {}", style(location).cyan());
                    }
                }
            }
            TaskEvent::UploadFailed {
                id,
                sink,
                attempts,
                error,
            } => {
                println!(
                    "  {} {} upload to {} failed after {}: {}",
                    style("✗").red(),
                    style(id).red(),
                    style(sink).bold(),
                    if *attempts == 1 {
                        "1 attempt".to_string()
                    } else {
                        format!("{} attempts", attempts)
                    },
                    error
                );
            }
            TaskEvent::PoolStopped { .. } => {}
        }
    }
}
