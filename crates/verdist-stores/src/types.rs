//! Common types for upload sinks

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use verdist_core::TemplateVars;

/// Sink kind identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Local or mounted directory tree
    Directory,
    /// External upload program
    Command,
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkKind::Directory => write!(f, "directory"),
            SinkKind::Command => write!(f, "command"),
        }
    }
}

/// Shape of an artifact on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// A single file (archive, installer, ...)
    File,
    /// A directory tree
    Directory,
}

/// A packaged artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Path to the artifact
    pub path: PathBuf,

    /// File or directory
    pub kind: ArtifactKind,

    /// Size in bytes (sum of all files for directories)
    pub size: u64,

    /// SHA256 hash (hex encoded), files only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl Artifact {
    /// Describe an existing artifact on disk
    pub fn from_path(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let metadata = std::fs::metadata(&path)?;

        let (kind, size) = if metadata.is_dir() {
            (ArtifactKind::Directory, dir_size(&path))
        } else {
            (ArtifactKind::File, metadata.len())
        };

        Ok(Self {
            path,
            kind,
            size,
            sha256: None,
        })
    }

    /// Compute and set the SHA256 hash
    ///
    /// Directory artifacts are left unchanged.
    pub fn with_sha256(mut self) -> io::Result<Self> {
        if self.kind == ArtifactKind::File {
            self.sha256 = Some(sha256_file(&self.path)?);
        }
        Ok(self)
    }

    /// Get filename
    pub fn filename(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Whether the artifact is a directory tree
    pub fn is_dir(&self) -> bool {
        self.kind == ArtifactKind::Directory
    }
}

fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Hex-encoded SHA256 of a file, streamed from disk
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// What is being uploaded, passed to every sink alongside the artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// Version being distributed
    pub version: String,

    /// Variant of that version
    pub variant: String,

    /// Build date the artifact was packaged for
    pub build_date: NaiveDate,

    /// Resolve destinations but do not transfer anything
    pub dry_run: bool,
}

impl UploadRequest {
    /// Create a request for one version variant
    pub fn new(version: impl Into<String>, variant: impl Into<String>, build_date: NaiveDate) -> Self {
        Self {
            version: version.into(),
            variant: variant.into(),
            build_date,
            dry_run: false,
        }
    }

    /// Toggle dry run
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Display name of the upload, `version:variant`
    pub fn name(&self) -> String {
        format!("{}:{}", self.version, self.variant)
    }

    /// Placeholder values sinks can reference
    pub fn vars(&self) -> TemplateVars {
        TemplateVars::new()
            .with("name", self.name())
            .with("version", self.version.as_str())
            .with("variant", self.variant.as_str())
            .with("date", self.build_date.format("%Y-%m-%d").to_string())
            .with("compact_date", self.build_date.format("%Y%m%d").to_string())
    }
}

/// Upload status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Artifact was delivered
    Uploaded,
    /// Nothing was transferred (dry run)
    Skipped,
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadStatus::Uploaded => write!(f, "uploaded"),
            UploadStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Result of a single sink upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResult {
    /// Sink that handled the upload
    pub sink: String,

    /// Where the artifact ended up, if the sink can tell
    pub location: Option<String>,

    /// Outcome
    pub status: UploadStatus,

    /// Any warnings from the upload
    pub warnings: Vec<String>,

    /// Upload timestamp
    pub uploaded_at: DateTime<Utc>,
}

impl UploadResult {
    /// A completed upload
    pub fn uploaded(sink: impl Into<String>, location: Option<String>) -> Self {
        Self {
            sink: sink.into(),
            location,
            status: UploadStatus::Uploaded,
            warnings: Vec::new(),
            uploaded_at: Utc::now(),
        }
    }

    /// A dry-run result
    pub fn skipped(sink: impl Into<String>, location: Option<String>) -> Self {
        Self {
            status: UploadStatus::Skipped,
            ..Self::uploaded(sink, location)
        }
    }

    /// Attach a warning
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}
