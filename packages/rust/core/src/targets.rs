//! Target resolution: configured names → [`BuildTarget`]s.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use pipewright_shared::{BuildTarget, PipewrightError, Result};

/// Target names become directory names and part of the bundle's global name.
static TARGET_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_-]*$").expect("valid regex"));

/// Where target sources live and where bundles go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    pub source_root: PathBuf,
    pub output_root: PathBuf,
}

impl ProjectLayout {
    pub fn new(source_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            output_root: output_root.into(),
        }
    }
}

/// Check a single name in isolation.
pub fn validate_target_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(PipewrightError::config("target name must not be empty"));
    }
    if !TARGET_NAME.is_match(name) {
        return Err(PipewrightError::config(format!(
            "invalid target name '{name}': use letters, digits, '_' or '-'"
        )));
    }
    Ok(())
}

/// Resolve target names into build targets, preserving input order.
///
/// The position of each target matters downstream: index 0 owns the dev
/// server. Empty input yields an empty list.
pub fn resolve(names: &[String], layout: &ProjectLayout) -> Result<Vec<BuildTarget>> {
    let mut seen = HashSet::with_capacity(names.len());
    let mut targets = Vec::with_capacity(names.len());

    for name in names {
        validate_target_name(name)?;
        if !seen.insert(name.as_str()) {
            return Err(PipewrightError::config(format!(
                "duplicate target name '{name}'"
            )));
        }
        targets.push(BuildTarget::new(
            name.as_str(),
            &layout.source_root,
            &layout.output_root,
        ));
    }

    debug!(count = targets.len(), "targets resolved");
    Ok(targets)
}
