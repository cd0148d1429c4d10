//! Upload worker pool
//!
//! A single long-lived dispatcher task takes items off the upload queue and
//! spawns one worker per item, with at most `concurrency` workers uploading at
//! a time. The pool stops when:
//!
//! - [`ShutdownHandle::shutdown`] is called: nothing more is dequeued, items
//!   still waiting in the queue are handed back as `unprocessed`, and
//!   in-flight uploads are allowed to finish
//! - every producer is gone and the queue is empty
//!
//! In both cases [`UploadPoolHandle::join`] resolves only after every spawned
//! worker has finished.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use verdist_core::UploadPoolConfig;
use verdist_stores::{SinkRegistry, UploadResult, UploadStatus};

use crate::error::{Result, TaskError};
use crate::queue::{UploadReceiver, UploadState, UploadTracker};
use crate::reporter::{TaskEvent, TaskReporter};
use crate::retry::RetryPolicy;
use crate::task::{CompletedItem, TaskId};

/// Options for the upload pool
#[derive(Debug, Clone)]
pub struct UploadPoolOptions {
    /// Maximum simultaneous uploads
    pub concurrency: usize,
    /// Retry policy applied per sink
    pub retry: RetryPolicy,
    /// Ask sinks to resolve destinations without transferring anything
    pub dry_run: bool,
}

impl Default for UploadPoolOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            retry: RetryPolicy::default(),
            dry_run: false,
        }
    }
}

impl UploadPoolOptions {
    /// Options from the upload pool configuration
    pub fn from_config(config: &UploadPoolConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            retry: RetryPolicy::from(&config.retry),
            dry_run: false,
        }
    }

    /// Toggle dry run
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// An item delivered to every sink
#[derive(Debug, Clone, Serialize)]
pub struct UploadedItem {
    pub task_id: TaskId,
    pub results: Vec<UploadResult>,
}

/// An item at least one sink rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadFailure {
    pub task_id: TaskId,
    /// Sink that rejected the item
    pub sink: String,
    pub error: String,
    /// Attempts made against that sink
    pub attempts: u32,
}

/// Why the pool stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Shutdown was requested
    Shutdown,
    /// Every producer finished and the queue ran dry
    QueueClosed,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Shutdown => write!(f, "shutdown requested"),
            StopReason::QueueClosed => write!(f, "queue closed"),
        }
    }
}

/// Everything the pool did between start and stop
#[derive(Debug, Clone, Serialize)]
pub struct UploadSummary {
    pub succeeded: Vec<UploadedItem>,
    pub failed: Vec<UploadFailure>,
    /// Items that were still queued when shutdown arrived
    pub unprocessed: Vec<CompletedItem>,
    pub reason: StopReason,
    pub duration: Duration,
}

impl UploadSummary {
    /// Whether nothing failed and nothing was left behind
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.unprocessed.is_empty()
    }

    /// Number of items the pool dequeued or drained
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.unprocessed.len()
    }
}

/// Cloneable trigger for stopping an upload pool
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Ask the pool to stop. Calling this more than once has no further effect.
    pub fn shutdown(&self) {
        let already = self.tx.send_replace(true);
        if !already {
            info!("Upload pool shutdown requested");
        }
    }

    /// Whether shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Handle to a running upload pool
#[derive(Debug)]
pub struct UploadPoolHandle {
    shutdown: ShutdownHandle,
    tracker: UploadTracker,
    join: JoinHandle<UploadSummary>,
}

impl UploadPoolHandle {
    /// Trigger that can be moved to other tasks (signal handlers, ...)
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Ask the pool to stop
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    /// Live upload states
    pub fn tracker(&self) -> &UploadTracker {
        &self.tracker
    }

    /// Wait for the pool to stop and every worker to finish
    pub async fn join(self) -> Result<UploadSummary> {
        self.join
            .await
            .map_err(|e| TaskError::PoolAborted(e.to_string()))
    }

    /// Request shutdown and wait for the pool to stop
    pub async fn shutdown_and_join(self) -> Result<UploadSummary> {
        self.shutdown();
        self.join().await
    }
}

/// Upload worker pool
pub struct UploadPool;

impl UploadPool {
    /// Start draining `receiver` into `sinks`
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        receiver: UploadReceiver,
        sinks: Arc<SinkRegistry>,
        options: UploadPoolOptions,
        reporter: Arc<dyn TaskReporter>,
    ) -> UploadPoolHandle {
        let (tx, rx) = watch::channel(false);
        let tracker = receiver.tracker().clone();

        let join = tokio::spawn(run_pool(receiver, sinks, options, reporter, rx));

        UploadPoolHandle {
            shutdown: ShutdownHandle { tx: Arc::new(tx) },
            tracker,
            join,
        }
    }
}

/// Resolves once shutdown has been requested
///
/// Never resolves if every [`ShutdownHandle`] is dropped without requesting
/// shutdown; the pool then runs until the queue closes.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

type WorkerHandle = JoinHandle<std::result::Result<Vec<UploadResult>, UploadFailure>>;

#[instrument(skip_all, fields(concurrency = options.concurrency, sinks = sinks.len()))]
async fn run_pool(
    mut receiver: UploadReceiver,
    sinks: Arc<SinkRegistry>,
    options: UploadPoolOptions,
    reporter: Arc<dyn TaskReporter>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> UploadSummary {
    let start = Instant::now();
    let tracker = receiver.tracker().clone();
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let options = Arc::new(options);
    let mut handles: Vec<(TaskId, WorkerHandle)> = Vec::new();
    let mut failed = Vec::new();

    info!("Upload pool started");

    let reason = loop {
        // A worker slot is reserved before dequeuing so that an item only
        // leaves the queue when it can start uploading right away.
        let next = async {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                return None;
            };
            Some((permit, receiver.recv().await))
        };

        let next = tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown_rx) => break StopReason::Shutdown,
            next = next => next,
        };

        // The semaphore is never closed; if it were, nothing was dequeued.
        let Some((permit, item)) = next else {
            break StopReason::Shutdown;
        };
        let Some(item) = item else {
            break StopReason::QueueClosed;
        };

        let id = item.id().clone();
        tracker.set(&id, UploadState::Uploading);
        debug!(task = %id, "Dequeued item for upload");

        let handle = tokio::spawn(upload_worker(
            item,
            permit,
            sinks.clone(),
            options.clone(),
            reporter.clone(),
            tracker.clone(),
        ));
        handles.push((id, handle));
    };

    let unprocessed = match reason {
        StopReason::Shutdown => receiver.close_and_drain(),
        StopReason::QueueClosed => Vec::new(),
    };
    if !unprocessed.is_empty() {
        warn!(count = unprocessed.len(), "Items left in queue at shutdown");
    }

    info!(in_flight = handles.len(), reason = %reason, "Upload pool waiting for workers");

    let mut succeeded = Vec::new();
    for (id, handle) in handles {
        match handle.await {
            Ok(Ok(results)) => succeeded.push(UploadedItem { task_id: id, results }),
            Ok(Err(failure)) => failed.push(failure),
            Err(e) => {
                let failure = UploadFailure {
                    task_id: id.clone(),
                    sink: String::new(),
                    error: format!("Upload worker panicked: {}", e),
                    attempts: 0,
                };
                tracker.set(&id, UploadState::Failed);
                reporter.report(&TaskEvent::UploadFailed {
                    id,
                    sink: failure.sink.clone(),
                    attempts: 0,
                    error: failure.error.clone(),
                });
                failed.push(failure);
            }
        }
    }

    reporter.report(&TaskEvent::PoolStopped {
        succeeded: succeeded.len(),
        failed: failed.len(),
        unprocessed: unprocessed.len(),
        reason: reason.to_string(),
    });

    UploadSummary {
        succeeded,
        failed,
        unprocessed,
        reason,
        duration: start.elapsed(),
    }
}

/// Upload one item to every sink, in order
async fn upload_worker(
    item: CompletedItem,
    permit: OwnedSemaphorePermit,
    sinks: Arc<SinkRegistry>,
    options: Arc<UploadPoolOptions>,
    reporter: Arc<dyn TaskReporter>,
    tracker: UploadTracker,
) -> std::result::Result<Vec<UploadResult>, UploadFailure> {
    let start = Instant::now();
    let id = item.id().clone();
    let request = item.upload_request().with_dry_run(options.dry_run);

    reporter.report(&TaskEvent::UploadStarted {
        id: id.clone(),
        sinks: sinks.len(),
    });

    let mut results = Vec::with_capacity(sinks.len());
    for sink in sinks.all() {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match sink.upload(&item.artifact, &request).await {
                Ok(result) => {
                    results.push(result);
                    break;
                }
                Err(e) if e.is_retryable() && options.retry.should_retry(attempts) => {
                    let delay = options.retry.next_delay(attempts);
                    reporter.report(&TaskEvent::UploadRetry {
                        id: id.clone(),
                        sink: sink.name().to_string(),
                        attempt: attempts,
                        delay,
                        error: e.to_string(),
                    });
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    let failure = UploadFailure {
                        task_id: id.clone(),
                        sink: sink.name().to_string(),
                        error: e.to_string(),
                        attempts,
                    };
                    tracker.set(&id, UploadState::Failed);
                    reporter.report(&TaskEvent::UploadFailed {
                        id,
                        sink: failure.sink.clone(),
                        attempts,
                        error: failure.error.clone(),
                    });
                    drop(permit);
                    return Err(failure);
                }
            }
        }
    }

    tracker.set(&id, UploadState::Succeeded);
    reporter.report(&TaskEvent::Uploaded {
        id,
        locations: results.iter().filter_map(|r| r.location.clone()).collect(),
        skipped: results.iter().all(|r| r.status == UploadStatus::Skipped),
        duration: start.elapsed(),
    });
    drop(permit);
    Ok(results)
}
