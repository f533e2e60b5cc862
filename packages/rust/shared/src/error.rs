//! Error types for pipewright.
//!
//! Library crates use [`PipewrightError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all pipewright operations.
#[derive(Debug, thiserror::Error)]
pub enum PipewrightError {
    /// Malformed or contradictory input: empty/duplicate target names,
    /// duplicate plugin ids, unparsable config. Always fatal.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The dev server executable could not be launched.
    #[error("failed to spawn `{command}`: {source}")]
    ProcessSpawn {
        command: String,
        source: std::io::Error,
    },

    /// Tearing down the dev server failed. Only ever logged.
    #[error("shutdown error: {0}")]
    Shutdown(String),

    /// The external build engine failed for a target.
    #[error("build error: {0}")]
    Build(String),

    /// File watcher setup or delivery failed.
    #[error("watch error: {0}")]
    Watch(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PipewrightError>;

impl PipewrightError {
    /// Create a configuration error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Wrap a spawn failure with the command that was attempted.
    pub fn spawn(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::ProcessSpawn {
            command: command.into(),
            source,
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error aborts configuration generation.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = PipewrightError::config("duplicate target name `admin`");
        assert_eq!(
            err.to_string(),
            "configuration error: duplicate target name `admin`"
        );
        assert!(err.is_configuration());

        let err = PipewrightError::spawn(
            "flask run --debug",
            std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        );
        assert!(err.to_string().contains("flask run --debug"));
        assert!(!err.is_configuration());
    }
}
