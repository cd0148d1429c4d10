//! Upload sink registry

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use verdist_core::{SinkConfig, UploadConfig};

use crate::command::CommandSink;
use crate::directory::DirectorySink;
use crate::traits::UploadSink;
use crate::types::SinkKind;

/// Ordered set of upload sinks
///
/// Every artifact is uploaded to each registered sink in registration order.
pub struct SinkRegistry {
    sinks: Vec<Arc<dyn UploadSink>>,
}

impl SinkRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    /// Build sinks from the upload configuration
    pub fn from_config(config: &UploadConfig) -> Self {
        let mut registry = Self::new();

        for sink in &config.sinks {
            match sink {
                SinkConfig::Directory {
                    name,
                    path,
                    layout,
                    checksum,
                } => {
                    registry.register(
                        DirectorySink::new(name.clone(), path.clone())
                            .with_layout(layout.clone())
                            .with_checksum(*checksum),
                    );
                }
                SinkConfig::Command {
                    name,
                    command,
                    args,
                    env,
                    timeout_secs,
                } => {
                    let mut sink = CommandSink::new(name.clone(), command.clone())
                        .with_args(args.clone())
                        .with_env(env.clone());
                    if let Some(secs) = timeout_secs {
                        sink = sink.with_timeout(Duration::from_secs(*secs));
                    }
                    registry.register(sink);
                }
            }
        }

        debug!(sinks = ?registry.names(), "Built sink registry from config");
        registry
    }

    /// Register an upload sink
    pub fn register<S: UploadSink + 'static>(&mut self, sink: S) {
        self.sinks.push(Arc::new(sink));
    }

    /// Register a pre-built upload sink
    pub fn register_arc(&mut self, sink: Arc<dyn UploadSink>) {
        self.sinks.push(sink);
    }

    /// Get upload sink by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn UploadSink>> {
        let result = self.sinks.iter().find(|s| s.name() == name).cloned();
        debug!(sink = name, found = result.is_some(), "Looking up upload sink");
        result
    }

    /// Get all sinks of a given kind
    pub fn get_by_kind(&self, kind: SinkKind) -> Vec<Arc<dyn UploadSink>> {
        self.sinks.iter().filter(|s| s.kind() == kind).cloned().collect()
    }

    /// Get all registered sinks
    pub fn all(&self) -> &[Arc<dyn UploadSink>] {
        &self.sinks
    }

    /// Get names of all registered sinks
    pub fn names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name().to_string()).collect()
    }

    /// Get only sinks that are currently available
    pub fn available(&self) -> Vec<Arc<dyn UploadSink>> {
        let available: Vec<_> = self.sinks.iter().filter(|s| s.is_available()).cloned().collect();
        let names: Vec<_> = available.iter().map(|s| s.name()).collect();
        debug!(count = available.len(), sinks = ?names, "Queried available upload sinks");
        available
    }

    /// Names of sinks that are not currently available
    pub fn unavailable(&self) -> Vec<String> {
        self.sinks
            .iter()
            .filter(|s| !s.is_available())
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Number of registered sinks
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether no sinks are registered
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Default for SinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::types::{Artifact, UploadRequest, UploadResult};
    use std::path::PathBuf;

    struct MockSink {
        name: String,
        available: bool,
    }

    #[async_trait::async_trait]
    impl UploadSink for MockSink {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> SinkKind {
            SinkKind::Command
        }

        fn is_available(&self) -> bool {
            self.available
        }

        async fn upload(&self, _artifact: &Artifact, _request: &UploadRequest) -> Result<UploadResult> {
            Ok(UploadResult::uploaded(&self.name, None))
        }
    }

    fn mock(name: &str, available: bool) -> MockSink {
        MockSink {
            name: name.to_string(),
            available,
        }
    }

    #[test]
    fn test_registry_new_is_empty() {
        let registry = SinkRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.names().is_empty());
    }

    #[test]
    fn test_registry_keeps_order() {
        let mut registry = SinkRegistry::new();
        registry.register(mock("b", true));
        registry.register(mock("a", true));
        assert_eq!(registry.names(), vec!["b", "a"]);
    }

    #[test]
    fn test_registry_get() {
        let mut registry = SinkRegistry::new();
        registry.register(mock("archive", true));
        assert!(registry.get("archive").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_registry_available() {
        let mut registry = SinkRegistry::new();
        registry.register(mock("up", true));
        registry.register(mock("down", false));
        assert_eq!(registry.available().len(), 1);
        assert_eq!(registry.unavailable(), vec!["down"]);
    }

    #[test]
    fn test_registry_from_config() {
        let config = UploadConfig {
            sinks: vec![
                SinkConfig::Directory {
                    name: "archive".to_string(),
                    path: PathBuf::from("/srv/releases"),
                    layout: "{version}/{date}".to_string(),
                    checksum: true,
                },
                SinkConfig::Command {
                    name: "mirror".to_string(),
                    command: "rsync".to_string(),
                    args: vec!["{artifact}".to_string()],
                    env: Default::default(),
                    timeout_secs: Some(30),
                },
            ],
        };

        let registry = SinkRegistry::from_config(&config);
        assert_eq!(registry.names(), vec!["archive", "mirror"]);
        assert_eq!(registry.get_by_kind(SinkKind::Directory).len(), 1);
        assert_eq!(registry.get_by_kind(SinkKind::Command).len(), 1);
    }
}
