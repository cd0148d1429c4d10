//! Task types

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use verdist_stores::{Artifact, UploadRequest};

/// Unique identifier for a packaging task
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId {
    /// Version identifier (e.g., "1.4.0")
    pub version: String,
    /// Variant name (e.g., "linux-x64")
    pub variant: String,
}

impl TaskId {
    /// Create a new task ID
    pub fn new(version: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            variant: variant.into(),
        }
    }

    /// Parse a task ID from "version:variant" format
    pub fn parse(s: &str) -> Option<Self> {
        let (version, variant) = s.split_once(':')?;
        if version.is_empty() || variant.is_empty() {
            return None;
        }
        Some(Self::new(version, variant))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.version, self.variant)
    }
}

/// One unit of packaging work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageTask {
    /// Task identifier
    pub id: TaskId,

    /// Build date the version is packaged for
    pub build_date: NaiveDate,

    /// Directory the packaging tool writes into
    pub dest_dir: PathBuf,

    /// Rendered arguments for the packaging tool
    pub args: Vec<String>,

    /// Extra environment for the packaging tool
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Where the artifact is expected once the tool succeeds
    pub artifact: PathBuf,
}

impl PackageTask {
    /// Upload request describing this task to sinks
    pub fn upload_request(&self) -> UploadRequest {
        UploadRequest::new(&self.id.version, &self.id.variant, self.build_date)
    }
}

/// A task whose packaging step succeeded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedItem {
    /// The task that produced the artifact
    pub task: PackageTask,

    /// The produced artifact
    pub artifact: Artifact,

    /// Time spent packaging
    pub duration: Duration,
}

impl CompletedItem {
    /// Create a completed item
    pub fn new(task: PackageTask, artifact: Artifact, duration: Duration) -> Self {
        Self {
            task,
            artifact,
            duration,
        }
    }

    /// Wrap an artifact that was packaged outside of this run
    pub fn from_artifact(id: TaskId, build_date: NaiveDate, artifact: Artifact) -> Self {
        let dest_dir = artifact
            .path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_default();
        let task = PackageTask {
            id,
            build_date,
            dest_dir,
            args: Vec::new(),
            env: HashMap::new(),
            artifact: artifact.path.clone(),
        };
        Self::new(task, artifact, Duration::ZERO)
    }

    /// Task identifier
    pub fn id(&self) -> &TaskId {
        &self.task.id
    }

    /// Upload request describing this item to sinks
    pub fn upload_request(&self) -> UploadRequest {
        self.task.upload_request()
    }
}

/// A task whose packaging step failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageFailure {
    /// Task identifier
    pub task_id: TaskId,
    /// Why packaging failed
    pub reason: String,
}

impl fmt::Display for PackageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.task_id, self.reason)
    }
}
