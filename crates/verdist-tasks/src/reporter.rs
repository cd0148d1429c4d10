//! Packaging and upload progress reporting

use std::sync::Arc;
use std::time::Duration;

use crate::task::TaskId;

/// Events emitted while packaging and uploading
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// The packaging tool is starting for a task
    Started {
        id: TaskId,
        command: String,
    },
    /// The packaging tool produced output
    Output {
        id: TaskId,
        line: String,
        is_stderr: bool,
    },
    /// Packaging succeeded and produced an artifact
    Packaged {
        id: TaskId,
        artifact: String,
        size: u64,
        duration: Duration,
    },
    /// Packaging failed
    Failed {
        id: TaskId,
        duration: Duration,
        error: String,
    },
    /// A task was not run (dry run)
    Skipped {
        id: TaskId,
        reason: String,
    },
    /// A packaged artifact was handed to the upload queue
    Enqueued {
        id: TaskId,
    },
    /// Every packaging task finished
    AllPackaged {
        total: usize,
        succeeded: usize,
        failed: usize,
        skipped: usize,
        duration: Duration,
    },
    /// An upload worker picked up an item
    UploadStarted {
        id: TaskId,
        sinks: usize,
    },
    /// A sink failed and the upload will be attempted again
    UploadRetry {
        id: TaskId,
        sink: String,
        attempt: u32,
        delay: Duration,
        error: String,
    },
    /// An item reached every sink
    Uploaded {
        id: TaskId,
        locations: Vec<String>,
        skipped: bool,
        duration: Duration,
    },
    /// An item could not be uploaded
    UploadFailed {
        id: TaskId,
        sink: String,
        attempts: u32,
        error: String,
    },
    /// The upload pool stopped
    PoolStopped {
        succeeded: usize,
        failed: usize,
        unprocessed: usize,
        reason: String,
    },
}

/// Trait for reporting packaging and upload progress
pub trait TaskReporter: Send + Sync {
    /// Handle a task event
    fn report(&self, event: &TaskEvent);
}

/// Simple reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl TaskReporter for TracingReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { id, command } => {
                tracing::info!("Packaging {}: {}", id, command);
            }
            TaskEvent::Output { id, line, is_stderr } => {
                if *is_stderr {
                    tracing::warn!("[{}] {}", id, line);
                } else {
                    tracing::debug!("[{}] {}", id, line);
                }
            }
            TaskEvent::Packaged {
                id,
                artifact,
                size,
                duration,
            } => {
                tracing::info!(
                    "{} packaged {} ({} bytes) in {:.1}s",
                    id,
                    artifact,
                    size,
                    duration.as_secs_f64()
                );
            }
            TaskEvent::Failed { id, duration, error } => {
                tracing::error!("{} failed after {:.1}s: {}", id, duration.as_secs_f64(), error);
            }
            TaskEvent::Skipped { id, reason } => {
                tracing::info!("{} skipped: {}", id, reason);
            }
            TaskEvent::Enqueued { id } => {
                tracing::debug!("{} queued for upload", id);
            }
            TaskEvent::AllPackaged {
                total,
                succeeded,
                failed,
                skipped,
                duration,
            } => {
                tracing::info!(
                    "Packaging complete: {}/{} succeeded, {} failed, {} skipped ({:.1}s)",
                    succeeded,
                    total,
                    failed,
                    skipped,
                    duration.as_secs_f64()
                );
            }
            TaskEvent::UploadStarted { id, sinks } => {
                tracing::info!("Uploading {} to {} sink(s)", id, sinks);
            }
            TaskEvent::UploadRetry {
                id,
                sink,
                attempt,
                delay,
                error,
            } => {
                tracing::warn!(
                    "Upload of {} to {} failed (attempt {}), retrying in {:.1}s: {}",
                    id,
                    sink,
                    attempt,
                    delay.as_secs_f64(),
                    error
                );
            }
            TaskEvent::Uploaded {
                id,
                locations,
                skipped,
                duration,
            } => {
                if *skipped {
                    tracing::info!("{} upload skipped (dry run)", id);
                } else {
                    tracing::info!(
                        "{} uploaded in {:.1}s {:?}",
                        id,
                        duration.as_secs_f64(),
                        locations
                    );
                }
            }
            TaskEvent::UploadFailed {
                id,
                sink,
                attempts,
                error,
            } => {
                tracing::error!(
                    "{} upload to {} failed after {} attempt(s): {}",
                    id,
                    sink,
                    attempts,
                    error
                );
            }
            TaskEvent::PoolStopped {
                succeeded,
                failed,
                unprocessed,
                reason,
            } => {
                tracing::info!(
                    "Upload pool stopped ({}): {} uploaded, {} failed, {} unprocessed",
                    reason,
                    succeeded,
                    failed,
                    unprocessed
                );
            }
        }
    }
}

/// Reporter that collects events for later inspection (useful for testing)
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: std::sync::Mutex<Vec<TaskEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl TaskReporter for CollectingReporter {
    fn report(&self, event: &TaskEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Registry of task reporters
pub struct TaskReporterRegistry {
    reporters: Vec<Arc<dyn TaskReporter>>,
}

impl TaskReporterRegistry {
    pub fn new() -> Self {
        Self {
            reporters: vec![Arc::new(TracingReporter)],
        }
    }

    pub fn empty() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    pub fn register<R: TaskReporter + 'static>(&mut self, reporter: R) {
        self.reporters.push(Arc::new(reporter));
    }

    pub fn register_arc(&mut self, reporter: Arc<dyn TaskReporter>) {
        self.reporters.push(reporter);
    }

    pub fn all(&self) -> &[Arc<dyn TaskReporter>] {
        &self.reporters
    }

    /// Broadcast an event to all registered reporters
    pub fn broadcast(&self, event: &TaskEvent) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}

impl Default for TaskReporterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskReporter for TaskReporterRegistry {
    fn report(&self, event: &TaskEvent) {
        self.broadcast(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_collecting_reporter() {
        let reporter = CollectingReporter::default();
        let id = TaskId::new("1.0", "linux");

        reporter.report(&TaskEvent::Started {
            id: id.clone(),
            command: "vermake --version 1.0".to_string(),
        });
        reporter.report(&TaskEvent::Enqueued { id });

        let events = reporter.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], TaskEvent::Enqueued { .. }));
    }

    #[test]
    fn test_tracing_reporter_handles_every_event() {
        let reporter = TracingReporter;
        let id = TaskId::new("1.0", "linux");

        reporter.report(&TaskEvent::Packaged {
            id: id.clone(),
            artifact: "/out/1.0-linux.zip".to_string(),
            size: 10,
            duration: Duration::from_secs(1),
        });
        reporter.report(&TaskEvent::UploadRetry {
            id: id.clone(),
            sink: "archive".to_string(),
            attempt: 1,
            delay: Duration::from_millis(500),
            error: "timeout".to_string(),
        });
        reporter.report(&TaskEvent::PoolStopped {
            succeeded: 1,
            failed: 0,
            unprocessed: 0,
            reason: "queue closed".to_string(),
        });
    }

    #[test]
    fn test_empty_registry() {
        let registry = TaskReporterRegistry::empty();
        assert!(registry.all().is_empty());
    }

    #[test]
    fn test_registry_is_a_reporter() {
        let collecting = Arc::new(CollectingReporter::default());
        let mut registry = TaskReporterRegistry::empty();
        registry.register_arc(collecting.clone());

        let reporter: Arc<dyn TaskReporter> = Arc::new(registry);
        reporter.report(&TaskEvent::Enqueued {
            id: TaskId::new("1.0", "mac"),
        });

        assert_eq!(collecting.events().len(), 1);
    }

    #[test]
    fn test_register() {
        let mut registry = TaskReporterRegistry::new();
        assert_eq!(registry.all().len(), 1);

        registry.register(CollectingReporter::default());
        assert_eq!(registry.all().len(), 2);
    }
}
