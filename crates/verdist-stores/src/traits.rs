//! Upload sink trait

use crate::error::Result;
use crate::types::*;

/// Trait for upload sinks
///
/// Implementations receive an artifact that has already been packaged
/// successfully and deliver it to their destination.
#[async_trait::async_trait]
pub trait UploadSink: Send + Sync {
    /// Get the sink name (unique within a registry)
    fn name(&self) -> &str;

    /// Get the sink kind
    fn kind(&self) -> SinkKind;

    /// Check if the sink is properly configured and reachable
    fn is_available(&self) -> bool;

    /// Upload an artifact
    ///
    /// With `request.dry_run` set the sink resolves its destination but does
    /// not transfer anything, returning [`UploadStatus::Skipped`].
    async fn upload(&self, artifact: &Artifact, request: &UploadRequest) -> Result<UploadResult>;
}
