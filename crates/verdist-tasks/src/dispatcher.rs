//! Packaging dispatcher: runs the packaging tool for every task with bounded
//! parallelism and feeds successful results into the upload queue

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use verdist_core::{ConfigError, PackagingConfig, PlanError};
use verdist_stores::Artifact;

use crate::error::Result;
use crate::queue::UploadQueue;
use crate::reporter::{TaskEvent, TaskReporter};
use crate::task::{CompletedItem, PackageFailure, PackageTask, TaskId};

/// Number of stderr lines kept in failure reasons
const STDERR_TAIL_LINES: usize = 20;

/// Options for the packaging dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    /// Packaging tool to run
    pub tool: PathBuf,
    /// Working directory for the tool
    pub source_dir: PathBuf,
    /// Maximum concurrent tool processes
    pub concurrency: usize,
    /// Kill the tool after this long
    pub timeout: Option<Duration>,
    /// Compute SHA256 of produced artifacts
    pub checksum: bool,
    /// Report tasks without running anything
    pub dry_run: bool,
    /// Environment passed to every tool invocation
    pub env: HashMap<String, String>,
}

impl DispatcherOptions {
    /// Options for running `tool` with defaults for everything else
    pub fn new(tool: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            source_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            concurrency: num_cpus(),
            timeout: None,
            checksum: true,
            dry_run: false,
            env: HashMap::new(),
        }
    }

    /// Options from the packaging configuration
    ///
    /// Fails when the packaging tool is not configured or cannot be found.
    pub fn from_config(config: &PackagingConfig) -> std::result::Result<Self, ConfigError> {
        let tool = config.resolve_tool()?;
        Ok(Self {
            source_dir: config.source_dir.clone(),
            concurrency: config.concurrency,
            timeout: config.timeout_secs.map(Duration::from_secs),
            checksum: config.checksum,
            env: config.env.clone(),
            ..Self::new(tool)
        })
    }

    /// Override the concurrency limit
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Toggle dry run
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set the tool working directory
    pub fn with_source_dir(mut self, source_dir: impl Into<PathBuf>) -> Self {
        self.source_dir = source_dir.into();
        self
    }

    /// Set the tool timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Command line shown for a task
    pub fn command_line(&self, task: &PackageTask) -> String {
        std::iter::once(self.tool.display().to_string())
            .chain(task.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Outcome of one packaging run, in task-list order
#[derive(Debug, Clone, Default, Serialize)]
pub struct PackageReport {
    /// Tasks whose artifact was enqueued for upload
    pub succeeded: Vec<TaskId>,
    /// Tasks that failed, with the reason
    pub failures: Vec<PackageFailure>,
    /// Tasks that were not run (dry run)
    pub skipped: Vec<TaskId>,
    /// Wall-clock time of the whole run
    pub duration: Duration,
}

impl PackageReport {
    /// Whether no task failed
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of tasks covered by the report
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failures.len() + self.skipped.len()
    }
}

enum TaskOutcome {
    Enqueued,
    Skipped,
    Failed(String),
}

/// Packaging dispatcher
pub struct Dispatcher {
    options: DispatcherOptions,
    reporter: Arc<dyn TaskReporter>,
}

impl Dispatcher {
    /// Create a new dispatcher
    pub fn new(options: DispatcherOptions, reporter: Arc<dyn TaskReporter>) -> Self {
        Self { options, reporter }
    }

    /// Dispatcher options
    pub fn options(&self) -> &DispatcherOptions {
        &self.options
    }

    /// Package every task and enqueue the successful ones
    ///
    /// At most `concurrency` tool processes run at once. A failing task never
    /// affects its siblings and is never enqueued. Returns once every task has
    /// finished.
    #[instrument(skip_all, fields(tasks = tasks.len(), concurrency = self.options.concurrency))]
    pub async fn run(&self, tasks: Vec<PackageTask>, queue: &UploadQueue) -> Result<PackageReport> {
        if tasks.is_empty() {
            return Err(PlanError::EmptyPlan.into());
        }

        let mut seen = HashSet::new();
        for task in &tasks {
            if !seen.insert(&task.id) {
                return Err(PlanError::DuplicateTask(task.id.to_string()).into());
            }
        }

        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let options = Arc::new(self.options.clone());
        let mut handles = Vec::with_capacity(tasks.len());

        info!(tool = %options.tool.display(), "Dispatching packaging tasks");

        for task in tasks {
            let id = task.id.clone();
            // The semaphore is never closed, so acquiring only waits.
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };

            let options = options.clone();
            let queue = queue.clone();
            let reporter = self.reporter.clone();

            let handle = tokio::spawn(async move {
                let outcome = execute_task(task, &options, &queue, &*reporter).await;
                drop(permit);
                outcome
            });

            handles.push((id, handle));
        }

        let mut report = PackageReport::default();
        for (id, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let error = format!("Task panicked: {}", e);
                    self.reporter.report(&TaskEvent::Failed {
                        id: id.clone(),
                        duration: Duration::ZERO,
                        error: error.clone(),
                    });
                    TaskOutcome::Failed(error)
                }
            };

            match outcome {
                TaskOutcome::Enqueued => report.succeeded.push(id),
                TaskOutcome::Skipped => report.skipped.push(id),
                TaskOutcome::Failed(reason) => report.failures.push(PackageFailure { task_id: id, reason }),
            }
        }

        report.duration = start.elapsed();

        self.reporter.report(&TaskEvent::AllPackaged {
            total: report.total(),
            succeeded: report.succeeded.len(),
            failed: report.failures.len(),
            skipped: report.skipped.len(),
            duration: report.duration,
        });

        Ok(report)
    }
}

/// Package a single task and enqueue the result
async fn execute_task(
    task: PackageTask,
    options: &DispatcherOptions,
    queue: &UploadQueue,
    reporter: &dyn TaskReporter,
) -> TaskOutcome {
    let start = Instant::now();
    let id = task.id.clone();

    reporter.report(&TaskEvent::Started {
        id: id.clone(),
        command: options.command_line(&task),
    });

    if options.dry_run {
        reporter.report(&TaskEvent::Skipped {
            id,
            reason: "dry run".to_string(),
        });
        return TaskOutcome::Skipped;
    }

    let failed = |error: String| {
        reporter.report(&TaskEvent::Failed {
            id: id.clone(),
            duration: start.elapsed(),
            error: error.clone(),
        });
        TaskOutcome::Failed(error)
    };

    let artifact = match package(&task, options, reporter).await {
        Ok(artifact) => artifact,
        Err(error) => return failed(error),
    };

    let duration = start.elapsed();
    reporter.report(&TaskEvent::Packaged {
        id: id.clone(),
        artifact: artifact.path.display().to_string(),
        size: artifact.size,
        duration,
    });

    match queue.enqueue(CompletedItem::new(task, artifact, duration)) {
        Ok(()) => {
            reporter.report(&TaskEvent::Enqueued { id: id.clone() });
            TaskOutcome::Enqueued
        }
        Err(e) => failed(e.to_string()),
    }
}

/// Run the tool for a task and describe the artifact it produced
async fn package(
    task: &PackageTask,
    options: &DispatcherOptions,
    reporter: &dyn TaskReporter,
) -> std::result::Result<Artifact, String> {
    tokio::fs::create_dir_all(&task.dest_dir)
        .await
        .map_err(|e| format!("Failed to create {}: {}", task.dest_dir.display(), e))?;

    let run = run_tool(task, options, reporter);
    match options.timeout {
        Some(limit) => tokio::time::timeout(limit, run)
            .await
            .map_err(|_| format!("Timed out after {}s", limit.as_secs_f64()))??,
        None => run.await?,
    }

    if !task.artifact.exists() {
        return Err(format!(
            "Tool exited successfully but artifact {} is missing",
            task.artifact.display()
        ));
    }

    let path = task.artifact.clone();
    let checksum = options.checksum;
    tokio::task::spawn_blocking(move || {
        let artifact = Artifact::from_path(&path)?;
        if checksum {
            artifact.with_sha256()
        } else {
            Ok(artifact)
        }
    })
    .await
    .map_err(|e| format!("Artifact inspection failed: {}", e))?
    .map_err(|e| format!("Failed to read artifact {}: {}", task.artifact.display(), e))
}

/// Run the packaging tool and stream its output to the reporter
async fn run_tool(
    task: &PackageTask,
    options: &DispatcherOptions,
    reporter: &dyn TaskReporter,
) -> std::result::Result<(), String> {
    debug!(task = %task.id, command = %options.command_line(task), "Spawning packaging tool");

    let mut child = Command::new(&options.tool)
        .args(&task.args)
        .current_dir(&options.source_dir)
        .envs(&options.env)
        .envs(&task.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("Failed to spawn {}: {}", options.tool.display(), e))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // Both pipes are drained together so a chatty stderr cannot block the tool.
    let (_, stderr_tail) = tokio::join!(
        forward_lines(&task.id, stdout, false, reporter),
        forward_lines(&task.id, stderr, true, reporter),
    );

    let status = child
        .wait()
        .await
        .map_err(|e| format!("Failed to wait: {}", e))?;

    if status.success() {
        return Ok(());
    }

    let code = status
        .code()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "none (killed by signal)".to_string());
    if stderr_tail.is_empty() {
        Err(format!("Command exited with code {}", code))
    } else {
        Err(format!("Command exited with code {}: {}", code, stderr_tail.join("\n")))
    }
}

/// Report every line of a child stream and keep the last few
async fn forward_lines<R: AsyncRead + Unpin>(
    id: &TaskId,
    stream: Option<R>,
    is_stderr: bool,
    reporter: &dyn TaskReporter,
) -> Vec<String> {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let Some(stream) = stream else {
        return Vec::new();
    };

    // Read bytes rather than lines: the stream must be drained to EOF even
    // when the tool prints something that is not UTF-8, or its next write
    // would hit a closed pipe.
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(&['\n', '\r'][..])
                    .to_string();
                reporter.report(&TaskEvent::Output {
                    id: id.clone(),
                    line: line.clone(),
                    is_stderr,
                });
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Err(e) => {
                warn!(task = %id, error = %e, "Failed to read tool output, discarding the rest");
                let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
                break;
            }
        }
    }

    tail.into()
}
