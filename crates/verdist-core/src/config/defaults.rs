//! Default configuration values

use super::types::Config;

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "verdist.yaml";

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "verdist.toml";

/// Alternative configuration file name
pub const ALT_CONFIG_FILE: &str = ".verdist.yaml";

/// Default version plan file name
pub const DEFAULT_VERSION_CONFIG: &str = "versions.yaml";

/// Default upload sink file name
pub const DEFAULT_UPLOAD_CONFIG: &str = "upload.yaml";

/// Default root for packaged artifacts
pub const DEFAULT_OUTPUT_DIR: &str = "dist";

/// Default per-task destination layout
pub const DEFAULT_LAYOUT: &str = "{version}/{date}";

/// Default artifact name template
pub const DEFAULT_ARTIFACT: &str = "{version}-{variant}.zip";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_YAML,
        DEFAULT_CONFIG_TOML,
        ALT_CONFIG_FILE,
        ".verdist.toml",
    ]
}

/// Generate default configuration YAML
pub fn default_config_yaml() -> String {
    let config = Config::default();
    serde_yaml::to_string(&config).unwrap_or_else(|_| DEFAULT_CONFIG_TEMPLATE.to_string())
}

/// Default configuration template
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Verdist Configuration

packaging:
  # Path to the packaging tool, or a name looked up on PATH
  tool: vermake
  source_dir: .
  version_config: versions.yaml
  output_dir: dist
  concurrency: 4
  checksum: true
  layout: "{version}/{date}"

upload:
  config: upload.yaml
  concurrency: 4
  retry:
    max_attempts: 3
    base_delay_ms: 1000
    multiplier: 2.0
    max_delay_ms: 60000
"#;

/// Default version plan template
pub const DEFAULT_VERSION_PLAN_TEMPLATE: &str = r#"# Variants packaged for every version.
# Placeholders: {version} {variant} {date} {compact_date} {dest} {source}

artifact: "{version}-{variant}.zip"

common_args:
  - "--source={source}"
  - "--version={version}"
  - "--date={date}"

variants:
  - name: linux-x64
    args: ["--target=linux-x64", "--out={dest}/{version}-{variant}.zip"]
  - name: windows-x64
    args: ["--target=windows-x64", "--out={dest}/{version}-{variant}.zip"]
"#;

/// Default upload sink template
pub const DEFAULT_UPLOAD_TEMPLATE: &str = r#"# Sinks every packaged artifact is uploaded to.

sinks:
  - kind: directory
    name: archive
    path: ./releases
    layout: "{version}/{date}"
    checksum: true
"#;
