//! Version plan expansion
//!
//! A version plan lists the variants a product is packaged in. Expanding it
//! for a set of requested versions yields one [`PackageTask`] per
//! version and enabled variant, with every argument template rendered.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::NaiveDate;
use tracing::debug;

use verdist_core::config::DEFAULT_LAYOUT;
use verdist_core::{PlanError, TemplateVars, VersionPlanConfig};

use crate::error::Result;
use crate::task::{PackageTask, TaskId};

/// What to expand the version plan for
#[derive(Debug, Clone)]
pub struct PlanRequest {
    /// Version identifiers to package
    pub versions: Vec<String>,
    /// Build date stamped into destinations and arguments
    pub build_date: NaiveDate,
    /// Root output directory
    pub dest_dir: PathBuf,
    /// Source tree the packaging tool runs in
    pub source_dir: PathBuf,
    /// Per-task directory below `dest_dir`
    pub layout: String,
}

impl PlanRequest {
    /// Create a request with the default layout
    pub fn new(versions: Vec<String>, build_date: NaiveDate, dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            versions,
            build_date,
            dest_dir: dest_dir.into(),
            source_dir: PathBuf::from("."),
            layout: DEFAULT_LAYOUT.to_string(),
        }
    }

    /// Set the source directory
    pub fn with_source_dir(mut self, source_dir: impl Into<PathBuf>) -> Self {
        self.source_dir = source_dir.into();
        self
    }

    /// Set the destination layout
    pub fn with_layout(mut self, layout: impl Into<String>) -> Self {
        self.layout = layout.into();
        self
    }
}

/// Parse a `YYYY-MM-DD` build date
pub fn parse_build_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| PlanError::InvalidDate(s.to_string()).into())
}

/// Why `value` cannot be used as one path component, if it can't
fn component_problem(value: &str) -> Option<&'static str> {
    if value.trim().is_empty() {
        Some("cannot be empty")
    } else if value.contains(':') || value.contains('/') || value.contains('\\') {
        Some("cannot contain ':', '/' or '\\'")
    } else if value.chars().any(char::is_whitespace) {
        Some("cannot contain whitespace")
    } else if value == "." || value == ".." {
        Some("cannot be a relative path component")
    } else {
        None
    }
}

/// Check that a version identifier is safe to use in task ids and paths
pub fn check_version(version: &str) -> Result<()> {
    match component_problem(version) {
        Some(reason) => Err(PlanError::InvalidVersion(version.to_string(), reason.to_string()).into()),
        None => Ok(()),
    }
}

/// Check that a variant name is safe to use in task ids and paths
pub fn check_variant(variant: &str) -> Result<()> {
    match component_problem(variant) {
        Some(reason) => Err(PlanError::InvalidVariant(variant.to_string(), reason.to_string()).into()),
        None => Ok(()),
    }
}

/// Expand a version plan into packaging tasks
///
/// Tasks are ordered by requested version, then by variant in plan order.
pub fn parse(plan: &VersionPlanConfig, request: &PlanRequest) -> Result<Vec<PackageTask>> {
    if request.versions.is_empty() {
        return Err(PlanError::NoVersions.into());
    }

    let date = request.build_date.format("%Y-%m-%d").to_string();
    let compact_date = request.build_date.format("%Y%m%d").to_string();
    let source = request.source_dir.display().to_string();

    let mut seen = HashSet::new();
    let mut tasks = Vec::new();

    for version in &request.versions {
        check_version(version)?;

        for variant in plan.enabled_variants() {
            let id = TaskId::new(version.as_str(), variant.name.as_str());
            if !seen.insert(id.clone()) {
                return Err(PlanError::DuplicateTask(id.to_string()).into());
            }

            let mut vars = TemplateVars::new()
                .with("version", version.as_str())
                .with("variant", variant.name.as_str())
                .with("date", date.as_str())
                .with("compact_date", compact_date.as_str());

            let dest_dir = request.dest_dir.join(vars.render(&request.layout)?);
            vars.set("dest", dest_dir.display().to_string());
            vars.set("source", source.as_str());

            let mut args = vars.render_all(&plan.common_args)?;
            args.extend(vars.render_all(&variant.args)?);

            let artifact = dest_dir.join(vars.render(plan.artifact_template(variant))?);

            tasks.push(PackageTask {
                id,
                build_date: request.build_date,
                dest_dir,
                args,
                env: variant.env.clone(),
                artifact,
            });
        }
    }

    if tasks.is_empty() {
        return Err(PlanError::EmptyPlan.into());
    }

    debug!(count = tasks.len(), "Expanded version plan");
    Ok(tasks)
}
