//! Placeholder templating
//!
//! Tool arguments, artifact names, destination layouts and upload commands
//! are written with `{name}` placeholders, e.g. `--out={dest}/{version}.zip`.
//! Rendering is strict: a placeholder without a value is an error rather
//! than being passed through to the external tool verbatim.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::error::TemplateError;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").unwrap())
}

/// Values available to a template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVars {
    values: BTreeMap<String, String>,
}

impl TemplateVars {
    /// Create an empty set of values
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value (builder style)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Add or replace a value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Look up a value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Render a single template
    pub fn render(&self, template: &str) -> Result<String, TemplateError> {
        let mut missing = None;
        let rendered = placeholder_pattern().replace_all(template, |caps: &Captures| {
            let key = &caps[1];
            match self.values.get(key) {
                Some(value) => value.clone(),
                None => {
                    missing.get_or_insert_with(|| key.to_string());
                    String::new()
                }
            }
        });

        match missing {
            Some(placeholder) => Err(TemplateError::UnknownPlaceholder {
                placeholder,
                template: template.to_string(),
            }),
            None => Ok(rendered.into_owned()),
        }
    }

    /// Render every template in order
    pub fn render_all(&self, templates: &[String]) -> Result<Vec<String>, TemplateError> {
        templates.iter().map(|t| self.render(t)).collect()
    }
}

/// Placeholder names referenced by a template, in order of appearance
pub fn placeholders(template: &str) -> Vec<String> {
    placeholder_pattern()
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}
