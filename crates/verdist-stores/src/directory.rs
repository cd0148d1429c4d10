//! Directory sink
//!
//! Copies artifacts below a root directory, following a templated layout such
//! as `{version}/{date}`. File artifacts are written under a temporary name and
//! renamed into place so a reader never observes a partial file. Re-uploading
//! the same artifact overwrites the previous copy.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use verdist_core::config::DEFAULT_LAYOUT;

use crate::error::{Result, StoreError};
use crate::traits::UploadSink;
use crate::types::*;

/// Upload sink backed by a directory tree
#[derive(Debug, Clone)]
pub struct DirectorySink {
    name: String,
    root: PathBuf,
    layout: String,
    checksum: bool,
}

impl DirectorySink {
    /// Create a sink rooted at `root`
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            layout: DEFAULT_LAYOUT.to_string(),
            checksum: true,
        }
    }

    /// Set the layout below the root
    pub fn with_layout(mut self, layout: impl Into<String>) -> Self {
        self.layout = layout.into();
        self
    }

    /// Toggle `.sha256` sidecar files
    pub fn with_checksum(mut self, checksum: bool) -> Self {
        self.checksum = checksum;
        self
    }

    /// Directory an upload lands in
    pub fn target_dir(&self, request: &UploadRequest) -> Result<PathBuf> {
        let relative = request.vars().render(&self.layout)?;
        Ok(self.root.join(relative))
    }
}

#[async_trait::async_trait]
impl UploadSink for DirectorySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Directory
    }

    fn is_available(&self) -> bool {
        // The root is created on first upload, so only its parent has to exist.
        self.root.is_dir() || self.root.parent().map(Path::is_dir).unwrap_or(false)
    }

    #[instrument(skip(self, artifact, request), fields(sink = %self.name, upload = %request.name()))]
    async fn upload(&self, artifact: &Artifact, request: &UploadRequest) -> Result<UploadResult> {
        let filename = artifact
            .filename()
            .ok_or_else(|| {
                StoreError::InvalidArtifact(format!("no file name: {}", artifact.path.display()))
            })?
            .to_string();

        let target_dir = self.target_dir(request)?;
        let destination = target_dir.join(&filename);
        let location = Some(destination.display().to_string());

        if request.dry_run {
            info!(destination = %destination.display(), "Dry run, skipping copy");
            return Ok(UploadResult::skipped(&self.name, location));
        }

        if !artifact.path.exists() {
            return Err(StoreError::InvalidArtifact(format!(
                "artifact not found: {}",
                artifact.path.display()
            )));
        }

        let source = artifact.path.clone();
        let known_hash = artifact.sha256.clone();
        let checksum = self.checksum;
        let is_dir = artifact.is_dir();

        tokio::task::spawn_blocking(move || -> io::Result<()> {
            std::fs::create_dir_all(&target_dir)?;
            if is_dir {
                copy_tree(&source, &destination)
            } else {
                copy_file_atomic(&source, &destination)?;
                if checksum {
                    let hash = match known_hash {
                        Some(hash) => hash,
                        None => sha256_file(&destination)?,
                    };
                    write_sidecar(&destination, &hash)?;
                }
                Ok(())
            }
        })
        .await
        .map_err(|e| StoreError::Other(format!("copy task failed: {}", e)))??;

        info!(location = ?location, "Copied artifact");
        Ok(UploadResult::uploaded(&self.name, location))
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{}.partial", name))
}

fn copy_file_atomic(source: &Path, destination: &Path) -> io::Result<()> {
    let partial = partial_path(destination);
    std::fs::copy(source, &partial)?;
    std::fs::rename(&partial, destination)?;
    debug!(from = %source.display(), to = %destination.display(), "Copied file");
    Ok(())
}

fn write_sidecar(destination: &Path, hash: &str) -> io::Result<()> {
    let filename = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sidecar = destination.with_file_name(format!("{}.sha256", filename));
    std::fs::write(sidecar, format!("{}  {}\n", hash, filename))
}

fn copy_tree(source: &Path, destination: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = destination.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    debug!(from = %source.display(), to = %destination.display(), "Copied directory tree");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn request() -> UploadRequest {
        UploadRequest::new("1.2.0", "linux", NaiveDate::from_ymd_opt(2024, 3, 9).unwrap())
    }

    fn write_artifact(dir: &Path, name: &str, content: &[u8]) -> Artifact {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        Artifact::from_path(path).unwrap()
    }

    #[tokio::test]
    async fn test_upload_file_with_sidecar() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let artifact = write_artifact(src.path(), "1.2.0-linux.zip", b"hello");

        let sink = DirectorySink::new("archive", dst.path());
        let result = sink.upload(&artifact, &request()).await.unwrap();

        let copied = dst.path().join("1.2.0/2024-03-09/1.2.0-linux.zip");
        assert_eq!(result.status, UploadStatus::Uploaded);
        assert_eq!(std::fs::read(&copied).unwrap(), b"hello");

        let sidecar = std::fs::read_to_string(dst.path().join("1.2.0/2024-03-09/1.2.0-linux.zip.sha256")).unwrap();
        assert_eq!(
            sidecar,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824  1.2.0-linux.zip\n"
        );
        assert!(!dst.path().join("1.2.0/2024-03-09/.1.2.0-linux.zip.partial").exists());
    }

    #[tokio::test]
    async fn test_upload_without_checksum() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let artifact = write_artifact(src.path(), "a.zip", b"x");

        let sink = DirectorySink::new("archive", dst.path())
            .with_layout("{variant}/{version}")
            .with_checksum(false);
        sink.upload(&artifact, &request()).await.unwrap();

        assert!(dst.path().join("linux/1.2.0/a.zip").exists());
        assert!(!dst.path().join("linux/1.2.0/a.zip.sha256").exists());
    }

    #[tokio::test]
    async fn test_upload_overwrites_previous_copy() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let sink = DirectorySink::new("archive", dst.path()).with_checksum(false);

        let first = write_artifact(src.path(), "a.zip", b"first");
        sink.upload(&first, &request()).await.unwrap();
        let second = write_artifact(src.path(), "a.zip", b"second");
        sink.upload(&second, &request()).await.unwrap();

        let copied = dst.path().join("1.2.0/2024-03-09/a.zip");
        assert_eq!(std::fs::read(copied).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_upload_directory_tree() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let bundle = src.path().join("bundle");
        std::fs::create_dir_all(bundle.join("bin")).unwrap();
        std::fs::write(bundle.join("bin/tool"), b"bin").unwrap();
        std::fs::write(bundle.join("README"), b"doc").unwrap();
        let artifact = Artifact::from_path(&bundle).unwrap();

        let sink = DirectorySink::new("archive", dst.path());
        sink.upload(&artifact, &request()).await.unwrap();

        let root = dst.path().join("1.2.0/2024-03-09/bundle");
        assert_eq!(std::fs::read(root.join("bin/tool")).unwrap(), b"bin");
        assert_eq!(std::fs::read(root.join("README")).unwrap(), b"doc");
    }

    #[tokio::test]
    async fn test_dry_run_copies_nothing() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let artifact = write_artifact(src.path(), "a.zip", b"x");

        let sink = DirectorySink::new("archive", dst.path());
        let result = sink
            .upload(&artifact, &request().with_dry_run(true))
            .await
            .unwrap();

        assert_eq!(result.status, UploadStatus::Skipped);
        assert!(result.location.unwrap().ends_with("a.zip"));
        assert!(!dst.path().join("1.2.0").exists());
    }

    #[tokio::test]
    async fn test_missing_artifact_is_not_retryable() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let artifact = write_artifact(src.path(), "a.zip", b"x");
        std::fs::remove_file(&artifact.path).unwrap();

        let sink = DirectorySink::new("archive", dst.path());
        let err = sink.upload(&artifact, &request()).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArtifact(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_is_available() {
        let dst = TempDir::new().unwrap();
        assert!(DirectorySink::new("a", dst.path()).is_available());
        assert!(DirectorySink::new("a", dst.path().join("new")).is_available());
        assert!(!DirectorySink::new("a", dst.path().join("x/y/z")).is_available());
    }
}
