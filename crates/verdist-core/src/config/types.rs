//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::ConfigError;

/// Main configuration for Verdist
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Version of the config schema
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Project name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Packaging configuration
    pub packaging: PackagingConfig,

    /// Upload pool configuration
    pub upload: UploadPoolConfig,
}

/// Packaging (dispatcher) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagingConfig {
    /// Path or name of the packaging tool (vermake)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<PathBuf>,

    /// Source directory the tool runs in
    pub source_dir: PathBuf,

    /// Path to the version plan (variants to package per version)
    pub version_config: PathBuf,

    /// Root directory packaged artifacts are written below
    pub output_dir: PathBuf,

    /// Maximum concurrent packaging processes
    pub concurrency: usize,

    /// Per-task timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Whether to compute SHA-256 checksums of produced artifacts
    pub checksum: bool,

    /// Per-task destination layout below the destination directory
    pub layout: String,

    /// Environment variables passed to every packaging process
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

impl Default for PackagingConfig {
    fn default() -> Self {
        Self {
            tool: None,
            source_dir: PathBuf::from("."),
            version_config: PathBuf::from(super::defaults::DEFAULT_VERSION_CONFIG),
            output_dir: PathBuf::from(super::defaults::DEFAULT_OUTPUT_DIR),
            concurrency: default_concurrency(),
            timeout_secs: None,
            checksum: true,
            layout: super::defaults::DEFAULT_LAYOUT.to_string(),
            env: HashMap::new(),
        }
    }
}

impl PackagingConfig {
    /// Locate the packaging tool.
    ///
    /// Bare names are searched on `PATH`; anything else must be an existing file.
    pub fn resolve_tool(&self) -> Result<PathBuf, ConfigError> {
        let tool = self
            .tool
            .as_ref()
            .ok_or_else(|| ConfigError::MissingField("packaging.tool".to_string()))?;

        if tool.is_absolute() || tool.components().count() > 1 {
            if tool.is_file() {
                Ok(tool.clone())
            } else {
                Err(ConfigError::ToolNotFound(tool.display().to_string()))
            }
        } else {
            which::which(tool)
                .map_err(|e| ConfigError::ToolNotFound(format!("{} ({})", tool.display(), e)))
        }
    }
}

/// Upload pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadPoolConfig {
    /// Path to the upload sink definitions
    pub config: PathBuf,

    /// Maximum concurrent uploads
    pub concurrency: usize,

    /// Retry behaviour for failed uploads
    pub retry: RetryConfig,
}

impl Default for UploadPoolConfig {
    fn default() -> Self {
        Self {
            config: PathBuf::from(super::defaults::DEFAULT_UPLOAD_CONFIG),
            concurrency: 4,
            retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per sink, including the first
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,

    /// Growth factor between retries
    pub multiplier: f64,

    /// Upper bound on a single delay, in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 60_000,
        }
    }
}

/// Version plan: what gets packaged for every requested version
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionPlanConfig {
    /// Default artifact name template for variants that don't set one
    pub artifact: String,

    /// Arguments prepended to every variant's arguments
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub common_args: Vec<String>,

    /// Variants packaged for each version
    pub variants: Vec<VariantConfig>,
}

impl Default for VersionPlanConfig {
    fn default() -> Self {
        Self {
            artifact: super::defaults::DEFAULT_ARTIFACT.to_string(),
            common_args: Vec::new(),
            variants: Vec::new(),
        }
    }
}

impl VersionPlanConfig {
    /// Variants that are switched on
    pub fn enabled_variants(&self) -> impl Iterator<Item = &VariantConfig> {
        self.variants.iter().filter(|v| v.enabled)
    }

    /// Artifact template for a variant
    pub fn artifact_template<'a>(&'a self, variant: &'a VariantConfig) -> &'a str {
        variant.artifact.as_deref().unwrap_or(&self.artifact)
    }
}

/// One packaging variant (platform, edition, flavour, ...)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantConfig {
    /// Variant name, unique within the plan
    pub name: String,

    /// Tool arguments (templates)
    #[serde(default)]
    pub args: Vec<String>,

    /// Artifact name template overriding the plan default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,

    /// Extra environment for this variant
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Whether the variant is packaged
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl VariantConfig {
    /// Create an enabled variant with no arguments
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            artifact: None,
            env: HashMap::new(),
            enabled: true,
        }
    }

    /// Set the arguments
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the artifact name template
    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }
}

/// Upload sink definitions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Sinks every artifact is uploaded to, in order
    pub sinks: Vec<SinkConfig>,
}

/// One upload sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    /// Copy artifacts into a directory tree
    Directory {
        /// Sink name
        name: String,
        /// Root directory
        path: PathBuf,
        /// Layout below the root
        #[serde(default = "default_layout")]
        layout: String,
        /// Write a `.sha256` sidecar next to each file
        #[serde(default = "default_true")]
        checksum: bool,
    },

    /// Hand artifacts to an external upload command
    Command {
        /// Sink name
        name: String,
        /// Program to run
        command: String,
        /// Arguments (templates)
        #[serde(default)]
        args: Vec<String>,
        /// Extra environment
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        env: HashMap<String, String>,
        /// Timeout in seconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_secs: Option<u64>,
    },
}

impl SinkConfig {
    /// Sink name
    pub fn name(&self) -> &str {
        match self {
            SinkConfig::Directory { name, .. } | SinkConfig::Command { name, .. } => name,
        }
    }

    /// Sink kind as written in config
    pub fn kind(&self) -> &'static str {
        match self {
            SinkConfig::Directory { .. } => "directory",
            SinkConfig::Command { .. } => "command",
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_layout() -> String {
    super::defaults::DEFAULT_LAYOUT.to_string()
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();
        assert!(config.packaging.tool.is_none());
        assert!(config.packaging.concurrency > 0);
        assert!(config.packaging.checksum);
        assert_eq!(config.packaging.layout, "{version}/{date}");
        assert_eq!(config.upload.retry.max_attempts, 3);
    }

    #[test]
    fn test_resolve_tool_requires_tool() {
        let config = PackagingConfig::default();
        assert!(matches!(
            config.resolve_tool(),
            Err(ConfigError::MissingField(_))
        ));
    }

    #[test]
    fn test_resolve_tool_missing_path() {
        let config = PackagingConfig {
            tool: Some(PathBuf::from("/nonexistent/bin/vermake")),
            ..Default::default()
        };
        assert!(matches!(
            config.resolve_tool(),
            Err(ConfigError::ToolNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_tool_existing_path() {
        let temp = tempfile::TempDir::new().unwrap();
        let tool = temp.path().join("vermake");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();
        let config = PackagingConfig {
            tool: Some(tool.clone()),
            ..Default::default()
        };
        assert_eq!(config.resolve_tool().unwrap(), tool);
    }

    #[test]
    fn test_sink_config_tagged_by_kind() {
        let yaml = r#"
sinks:
  - kind: directory
    name: mirror
    path: /srv/releases
  - kind: command
    name: s3
    command: aws
    args: ["s3", "cp", "{artifact}", "s3://bucket/{version}/"]
"#;
        let config: UploadConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.sinks.len(), 2);
        assert_eq!(config.sinks[0].name(), "mirror");
        assert_eq!(config.sinks[0].kind(), "directory");
        match &config.sinks[0] {
            SinkConfig::Directory { layout, checksum, .. } => {
                assert_eq!(layout, "{version}/{date}");
                assert!(checksum);
            }
            other => panic!("expected directory sink, got {:?}", other),
        }
        assert_eq!(config.sinks[1].kind(), "command");
    }

    #[test]
    fn test_variant_enabled_by_default() {
        let plan: VersionPlanConfig = toml::from_str(
            r#"
artifact = "{version}-{variant}.zip"

[[variants]]
name = "linux"
args = ["--os", "linux"]

[[variants]]
name = "legacy"
enabled = false
"#,
        )
        .unwrap();

        let names: Vec<_> = plan.enabled_variants().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["linux"]);
        assert_eq!(plan.artifact_template(&plan.variants[0]), "{version}-{variant}.zip");
    }

    #[test]
    fn test_variant_artifact_override() {
        let plan = VersionPlanConfig {
            artifact: "{version}.zip".to_string(),
            common_args: Vec::new(),
            variants: vec![VariantConfig::new("win").with_artifact("{version}.msi")],
        };
        assert_eq!(plan.artifact_template(&plan.variants[0]), "{version}.msi");
    }
}
