//! Configuration loading

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, Result};

use super::defaults::config_file_names;
use super::types::{Config, SinkConfig, UploadConfig, VersionPlanConfig};
use super::validation::{validate_config, validate_upload_config, validate_version_plan};

/// Supported configuration formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Toml,
    Json,
}

impl Format {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Format::Toml,
            Some("json") => Format::Json,
            _ => Format::Yaml,
        }
    }
}

/// Read and deserialize a YAML, TOML or JSON file (by extension)
fn read_structured<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()).into());
    }

    let format = Format::from_path(path);
    debug!(path = %path.display(), ?format, "reading structured file");
    let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

    let value = match format {
        Format::Toml => toml::from_str(&content).map_err(ConfigError::TomlError)?,
        Format::Json => serde_json::from_str(&content).map_err(ConfigError::JsonError)?,
        Format::Yaml => serde_yaml::from_str(&content).map_err(ConfigError::YamlError)?,
    };
    Ok(value)
}

/// Load configuration from a file
///
/// Relative paths inside the file are resolved against the file's directory.
pub fn load_config(path: &Path) -> Result<Config> {
    info!(path = %path.display(), "loading config");

    let mut config: Config = read_structured(path)?;
    if let Some(base) = path.parent() {
        resolve_paths(&mut config, base);
    }

    validate_config(&config)?;
    debug!(path = %path.display(), "config loaded and validated");
    Ok(config)
}

/// Make relative paths in the config absolute against `base`
pub fn resolve_paths(config: &mut Config, base: &Path) {
    config.packaging.source_dir = join_relative(base, &config.packaging.source_dir);
    config.packaging.version_config = join_relative(base, &config.packaging.version_config);
    config.packaging.output_dir = join_relative(base, &config.packaging.output_dir);
    config.upload.config = join_relative(base, &config.upload.config);

    // Bare tool names are looked up on PATH, anything with a separator is a path.
    if let Some(tool) = &config.packaging.tool {
        if tool.components().count() > 1 {
            config.packaging.tool = Some(join_relative(base, tool));
        }
    }
}

fn join_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() || base.as_os_str().is_empty() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Find configuration file in directory or parent directories.
///
/// The first of [`config_file_names`] present in a directory wins. Parents
/// are walked until the filesystem root.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    debug!(start_dir = %start_dir.display(), "searching for config file");
    let mut current = start_dir.to_path_buf();

    loop {
        for name in config_file_names() {
            let config_path = current.join(name);
            if config_path.exists() {
                info!(path = %config_path.display(), "found config file");
                return Some(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    debug!("no config file found");
    None
}

/// Load configuration from directory (searching parent directories)
pub fn load_config_from_dir(dir: &Path) -> Result<(Config, PathBuf)> {
    let config_path = find_config(dir).ok_or_else(|| ConfigError::NotFound(dir.to_path_buf()))?;

    let config = load_config(&config_path)?;
    Ok((config, config_path))
}

/// Load configuration or use defaults
///
/// A config file that exists but fails to parse or validate is still an
/// error; only a missing file falls back to defaults.
pub fn load_config_or_default(dir: &Path) -> Result<(Config, Option<PathBuf>)> {
    match find_config(dir) {
        Some(path) => Ok((load_config(&path)?, Some(path))),
        None => {
            warn!(dir = %dir.display(), "no config found, using defaults");
            let mut config = Config::default();
            resolve_paths(&mut config, dir);
            Ok((config, None))
        }
    }
}

/// Load the version plan
pub fn load_version_plan(path: &Path) -> Result<VersionPlanConfig> {
    info!(path = %path.display(), "loading version plan");
    let plan: VersionPlanConfig = read_structured(path)?;
    validate_version_plan(&plan)?;
    debug!(variants = plan.variants.len(), "version plan loaded");
    Ok(plan)
}

/// Load the upload sink definitions
///
/// Relative directory sink roots are resolved against the file's directory.
pub fn load_upload_config(path: &Path) -> Result<UploadConfig> {
    info!(path = %path.display(), "loading upload config");
    let mut upload: UploadConfig = read_structured(path)?;
    if let Some(base) = path.parent() {
        for sink in &mut upload.sinks {
            if let SinkConfig::Directory { path: root, .. } = sink {
                *root = join_relative(base, root);
            }
        }
    }
    validate_upload_config(&upload)?;
    debug!(sinks = upload.sinks.len(), "upload config loaded");
    Ok(upload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VerdistError;
    use tempfile::TempDir;

    #[test]
    fn test_find_config_yaml() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("verdist.yaml");
        std::fs::write(&config_path, "packaging:\n  tool: vermake\n").unwrap();

        let found = find_config(temp.path());
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_config_prefers_yaml_over_toml() {
        let temp = TempDir::new().unwrap();
        let yaml_path = temp.path().join("verdist.yaml");
        let toml_path = temp.path().join("verdist.toml");
        std::fs::write(&yaml_path, "packaging:\n  tool: vermake\n").unwrap();
        std::fs::write(&toml_path, "[packaging]\ntool = \"vermake\"\n").unwrap();

        assert_eq!(find_config(temp.path()).unwrap(), yaml_path);
    }

    #[test]
    fn test_find_config_walks_parents() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        let config_path = temp.path().join(".verdist.toml");
        std::fs::write(&config_path, "[packaging]\ntool = \"vermake\"\n").unwrap();

        assert_eq!(find_config(&nested).unwrap(), config_path);
    }

    #[test]
    fn test_load_config_resolves_relative_paths() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("verdist.toml");
        std::fs::write(
            &config_path,
            "[packaging]\ntool = \"bin/vermake\"\nsource_dir = \"src\"\nversion_config = \"plan.toml\"\n\n[upload]\nconfig = \"/etc/verdist/upload.yaml\"\n",
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();
        assert_eq!(config.packaging.source_dir, temp.path().join("src"));
        assert_eq!(config.packaging.version_config, temp.path().join("plan.toml"));
        assert_eq!(
            config.packaging.tool,
            Some(temp.path().join("bin").join("vermake"))
        );
        assert_eq!(config.upload.config, PathBuf::from("/etc/verdist/upload.yaml"));
    }

    #[test]
    fn test_load_config_keeps_bare_tool_name() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("verdist.yaml");
        std::fs::write(&config_path, "packaging:\n  tool: vermake\n").unwrap();

        let config = load_config(&config_path).unwrap();
        assert_eq!(config.packaging.tool, Some(PathBuf::from("vermake")));
    }

    #[test]
    fn test_load_config_json() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.json");
        std::fs::write(
            &config_path,
            r#"{"packaging": {"tool": "vermake", "concurrency": 2}}"#,
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();
        assert_eq!(config.packaging.concurrency, 2);
    }

    #[test]
    fn test_load_config_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = load_config(&temp.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, VerdistError::Config(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_config_or_default_without_file() {
        let temp = TempDir::new().unwrap();
        let (config, path) = load_config_or_default(temp.path()).unwrap();
        assert!(path.is_none());
        assert_eq!(config.upload.config, temp.path().join("upload.yaml"));
    }

    #[test]
    fn test_load_config_or_default_reports_invalid_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("verdist.yaml"),
            "packaging:\n  concurrency: 0\n",
        )
        .unwrap();

        assert!(load_config_or_default(temp.path()).is_err());
    }

    #[test]
    fn test_load_version_plan_and_upload_config() {
        let temp = TempDir::new().unwrap();
        let plan_path = temp.path().join("versions.yaml");
        std::fs::write(
            &plan_path,
            "variants:\n  - name: linux\n    args: [\"--os=linux\"]\n",
        )
        .unwrap();
        let upload_path = temp.path().join("upload.toml");
        std::fs::write(
            &upload_path,
            "[[sinks]]\nkind = \"directory\"\nname = \"archive\"\npath = \"/srv/archive\"\n",
        )
        .unwrap();

        let plan = load_version_plan(&plan_path).unwrap();
        assert_eq!(plan.variants.len(), 1);
        assert_eq!(plan.artifact, "{version}-{variant}.zip");

        let upload = load_upload_config(&upload_path).unwrap();
        assert_eq!(upload.sinks[0].name(), "archive");
    }

    #[test]
    fn test_upload_sink_roots_resolved() {
        let temp = TempDir::new().unwrap();
        let upload_path = temp.path().join("upload.yaml");
        std::fs::write(
            &upload_path,
            "sinks:\n  - kind: directory\n    name: archive\n    path: releases\n",
        )
        .unwrap();

        let upload = load_upload_config(&upload_path).unwrap();
        match &upload.sinks[0] {
            SinkConfig::Directory { path, .. } => assert_eq!(path, &temp.path().join("releases")),
            other => panic!("unexpected sink: {other:?}"),
        }
    }
}
