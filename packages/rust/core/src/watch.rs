//! Rebuild triggers for development mode.
//!
//! Source files under the source root always trigger a rebuild; files in the
//! project root trigger one only when they match a watch-trigger glob.
//! Anything under the output root is ignored so emitted bundles never loop
//! back into the watcher.

use std::path::{Path, PathBuf};
use std::time::Duration;

use glob::Pattern;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{DebounceEventResult, DebouncedEventKind, Debouncer, new_debouncer};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tracing::{debug, warn};

use pipewright_shared::{PipewrightError, Result};

/// Decides which changed paths are worth a rebuild.
#[derive(Debug, Clone)]
pub struct WatchSet {
    project_root: PathBuf,
    source_root: PathBuf,
    output_root: PathBuf,
    patterns: Vec<Pattern>,
}

impl WatchSet {
    /// Invalid globs are configuration errors. A leading `./` is ignored.
    pub fn new(
        project_root: &Path,
        source_root: &Path,
        output_root: &Path,
        globs: &[String],
    ) -> Result<Self> {
        let patterns = globs
            .iter()
            .map(|g| {
                let trimmed = g.strip_prefix("./").unwrap_or(g.as_str());
                Pattern::new(trimmed).map_err(|e| {
                    PipewrightError::config(format!("invalid watch glob '{g}': {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            project_root: absolute(project_root),
            source_root: absolute(source_root),
            output_root: absolute(output_root),
            patterns,
        })
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn is_relevant(&self, path: &Path) -> bool {
        let path = absolute(path);
        if path.starts_with(&self.output_root) {
            return false;
        }
        if path.starts_with(&self.source_root) {
            return true;
        }
        match path.strip_prefix(&self.project_root) {
            Ok(rel) => self.patterns.iter().any(|p| p.matches_path(rel)),
            Err(_) => false,
        }
    }
}

/// Canonical form when the path (or its parent, for deleted files) exists,
/// lexically absolute otherwise.
fn absolute(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        if let Ok(parent) = std::fs::canonicalize(parent) {
            return parent.join(name);
        }
    }
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// A running debounced watcher delivering batches of relevant paths.
pub struct RebuildWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    rx: UnboundedReceiver<Vec<PathBuf>>,
}

impl RebuildWatcher {
    /// Watch the source root recursively and the project root (top level
    /// only, where the config files live).
    pub fn spawn(set: WatchSet, debounce: Duration) -> Result<Self> {
        if !set.source_root.is_dir() {
            return Err(PipewrightError::Watch(format!(
                "source root {} does not exist",
                set.source_root.display()
            )));
        }

        let (tx, rx) = unbounded_channel();
        let filter = set.clone();

        let mut debouncer = new_debouncer(debounce, move |res: DebounceEventResult| match res {
            Ok(events) => {
                let changed: Vec<PathBuf> = events
                    .into_iter()
                    .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
                    .map(|e| e.path)
                    .filter(|p| filter.is_relevant(p))
                    .collect();
                if !changed.is_empty() {
                    let _ = tx.send(changed);
                }
            }
            Err(e) => warn!(error = ?e, "watch error, continuing"),
        })
        .map_err(|e| PipewrightError::Watch(format!("failed to initialize watcher: {e}")))?;

        debouncer
            .watcher()
            .watch(&set.source_root, RecursiveMode::Recursive)
            .map_err(|e| PipewrightError::Watch(format!("{}: {e}", set.source_root.display())))?;
        debouncer
            .watcher()
            .watch(&set.project_root, RecursiveMode::NonRecursive)
            .map_err(|e| PipewrightError::Watch(format!("{}: {e}", set.project_root.display())))?;

        debug!(
            source_root = %set.source_root.display(),
            project_root = %set.project_root.display(),
            "watching for changes"
        );

        Ok(Self {
            _debouncer: debouncer,
            rx,
        })
    }

    /// Next batch of changed paths; `None` once the watcher is gone.
    pub async fn next_batch(&mut self) -> Option<Vec<PathBuf>> {
        self.rx.recv().await
    }
}
