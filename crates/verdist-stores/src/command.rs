//! Command sink
//!
//! Hands each artifact to an external program (`rsync`, `aws s3 cp`, a site
//! specific script, ...). Arguments are templates; `{artifact}` expands to the
//! artifact path and the remaining placeholders come from the upload request.
//! The last non-empty line the program prints on stdout is reported as the
//! upload location.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::error::{Result, StoreError};
use crate::traits::UploadSink;
use crate::types::*;

/// Number of stderr lines kept in failure messages
const STDERR_TAIL_LINES: usize = 20;

/// Upload sink that runs an external program per artifact
#[derive(Debug, Clone)]
pub struct CommandSink {
    name: String,
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    timeout: Option<Duration>,
}

impl CommandSink {
    /// Create a sink running `command`
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            timeout: None,
        }
    }

    /// Set argument templates
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Set extra environment variables
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Kill the command if it runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Arguments for one upload with all placeholders filled in
    pub fn render_args(&self, artifact: &Artifact, request: &UploadRequest) -> Result<Vec<String>> {
        let vars = request
            .vars()
            .with("artifact", artifact.path.display().to_string());
        Ok(vars.render_all(&self.args)?)
    }

    fn command_line(&self, args: &[String]) -> String {
        std::iter::once(self.command.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait::async_trait]
impl UploadSink for CommandSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Command
    }

    fn is_available(&self) -> bool {
        let path = Path::new(&self.command);
        if path.components().count() > 1 {
            path.is_file()
        } else {
            which::which(&self.command).is_ok()
        }
    }

    #[instrument(skip(self, artifact, request), fields(sink = %self.name, upload = %request.name()))]
    async fn upload(&self, artifact: &Artifact, request: &UploadRequest) -> Result<UploadResult> {
        let args = self.render_args(artifact, request)?;
        let command_line = self.command_line(&args);

        if request.dry_run {
            info!(command = %command_line, "Dry run, not running upload command");
            return Ok(UploadResult::skipped(&self.name, None));
        }

        debug!(command = %command_line, "Running upload command");

        let mut cmd = Command::new(&self.command);
        cmd.args(&args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::ToolNotFound(self.command.clone())
            } else {
                StoreError::Io(e)
            }
        })?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| {
                    StoreError::Timeout(format!("'{}' after {}s", command_line, limit.as_secs()))
                })??,
            None => child.wait_with_output().await?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StoreError::CommandFailed {
                command: command_line,
                exit_code: output.status.code(),
                stderr: tail(&stderr, STDERR_TAIL_LINES),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let location = stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .map(str::to_string);

        info!(location = ?location, "Upload command finished");
        Ok(UploadResult::uploaded(&self.name, location))
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn request() -> UploadRequest {
        UploadRequest::new("1.2.0", "linux", NaiveDate::from_ymd_opt(2024, 3, 9).unwrap())
    }

    fn artifact(dir: &Path) -> Artifact {
        let path = dir.join("1.2.0-linux.zip");
        std::fs::write(&path, b"zip").unwrap();
        Artifact::from_path(path).unwrap()
    }

    fn sh(script: &str) -> CommandSink {
        CommandSink::new("script", "sh").with_args(vec!["-c".to_string(), script.to_string()])
    }

    #[test]
    fn test_render_args() {
        let temp = TempDir::new().unwrap();
        let artifact = artifact(temp.path());
        let sink = CommandSink::new("s3", "aws").with_args(vec![
            "s3".into(),
            "cp".into(),
            "{artifact}".into(),
            "s3://bucket/{version}/{compact_date}/".into(),
        ]);

        let args = sink.render_args(&artifact, &request()).unwrap();
        assert_eq!(args[2], artifact.path.display().to_string());
        assert_eq!(args[3], "s3://bucket/1.2.0/20240309/");
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("a\nb\nc", 2), "b\nc");
        assert_eq!(tail("a", 5), "a");
        assert_eq!(tail("", 5), "");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_upload_reports_location() {
        let temp = TempDir::new().unwrap();
        let artifact = artifact(temp.path());
        let sink = sh("echo uploading; echo https://cdn.example.com/{name}");

        let result = sink.upload(&artifact, &request()).await.unwrap();
        assert_eq!(result.status, UploadStatus::Uploaded);
        assert_eq!(result.location.as_deref(), Some("https://cdn.example.com/1.2.0:linux"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_upload_receives_artifact_path() {
        let temp = TempDir::new().unwrap();
        let artifact = artifact(temp.path());
        let copy = temp.path().join("copied.zip");
        let sink = CommandSink::new("cp", "cp").with_args(vec![
            "{artifact}".to_string(),
            copy.display().to_string(),
        ]);

        sink.upload(&artifact, &request()).await.unwrap();
        assert_eq!(std::fs::read(copy).unwrap(), b"zip");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_upload_failure_carries_stderr() {
        let temp = TempDir::new().unwrap();
        let artifact = artifact(temp.path());
        let sink = sh("echo denied >&2; exit 7");

        let err = sink.upload(&artifact, &request()).await.unwrap_err();
        match err {
            StoreError::CommandFailed { exit_code, stderr, .. } => {
                assert_eq!(exit_code, Some(7));
                assert_eq!(stderr, "denied");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_upload_timeout() {
        let temp = TempDir::new().unwrap();
        let artifact = artifact(temp.path());
        let sink = sh("sleep 5").with_timeout(Duration::from_millis(100));

        let err = sink.upload(&artifact, &request()).await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_command() {
        let temp = TempDir::new().unwrap();
        let artifact = artifact(temp.path());
        let sink = CommandSink::new("nope", "verdist-no-such-uploader");

        assert!(!sink.is_available());
        let err = sink.upload(&artifact, &request()).await.unwrap_err();
        assert!(matches!(err, StoreError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_dry_run_does_not_execute() {
        let temp = TempDir::new().unwrap();
        let artifact = artifact(temp.path());
        let sink = CommandSink::new("nope", "verdist-no-such-uploader");

        let result = sink
            .upload(&artifact, &request().with_dry_run(true))
            .await
            .unwrap();
        assert_eq!(result.status, UploadStatus::Skipped);
    }
}
