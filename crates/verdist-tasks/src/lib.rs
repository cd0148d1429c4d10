//! Verdist Tasks - packaging and upload orchestration
//!
//! This crate turns a version plan into packaging tasks, runs the packaging
//! tool for them with bounded parallelism, and drains the resulting
//! artifacts through a pool of upload workers.
//!
//! ```text
//! tasks -> Dispatcher -> UploadQueue -> UploadPool -> sinks
//! ```

pub mod dispatcher;
pub mod error;
pub mod plan;
pub mod pool;
pub mod queue;
pub mod reporter;
pub mod retry;
pub mod task;

pub use dispatcher::{Dispatcher, DispatcherOptions, PackageReport};
pub use error::{Result, TaskError};
pub use plan::{check_variant, check_version, parse, parse_build_date, PlanRequest};
pub use pool::{
    ShutdownHandle, StopReason, UploadFailure, UploadPool, UploadPoolHandle, UploadPoolOptions,
    UploadSummary, UploadedItem,
};
pub use queue::{upload_queue, TrackerCounts, UploadQueue, UploadReceiver, UploadState, UploadTracker};
pub use reporter::{CollectingReporter, TaskEvent, TaskReporter, TaskReporterRegistry, TracingReporter};
pub use retry::RetryPolicy;
pub use task::{CompletedItem, PackageFailure, PackageTask, TaskId};
