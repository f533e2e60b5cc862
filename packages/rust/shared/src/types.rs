//! Core domain types shared by the orchestrator and its collaborators.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipewrightError, Result};

/// Environment variable consulted when no mode is given explicitly.
pub const MODE_ENV_VAR: &str = "PIPEWRIGHT_MODE";

/// File extension of emitted bundles.
pub const BUNDLE_EXT: &str = "js";

/// File name of each target's entry module inside its source directory.
pub const ENTRY_FILE: &str = "main.js";

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Build mode. Decided once at startup and fixed for the process lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl Mode {
    /// Resolve the mode from an optional environment value.
    ///
    /// An absent or blank value means development.
    pub fn from_env_value(value: Option<&str>) -> Result<Self> {
        match value.map(str::trim) {
            None | Some("") => Ok(Self::Development),
            Some(raw) => raw.parse(),
        }
    }

    /// Resolve the mode from [`MODE_ENV_VAR`].
    pub fn from_env() -> Result<Self> {
        let value = std::env::var(MODE_ENV_VAR).ok();
        Self::from_env_value(value.as_deref())
    }

    pub fn is_development(self) -> bool {
        self == Self::Development
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = PipewrightError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(PipewrightError::config(format!(
                "unknown mode '{other}': expected 'development' or 'production'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// BuildTarget
// ---------------------------------------------------------------------------

/// One named output bundle with its own entry point and output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTarget {
    /// Unique target name; also the per-target directory name.
    pub name: String,
    /// `{source_root}/{name}/main.js`
    pub entry_path: PathBuf,
    /// `{output_root}/{name}/index.js`
    pub output_path: PathBuf,
}

impl BuildTarget {
    /// Derive a target's paths from the project roots.
    pub fn new(name: impl Into<String>, source_root: &Path, output_root: &Path) -> Self {
        let name = name.into();
        Self {
            entry_path: source_root.join(&name).join(ENTRY_FILE),
            output_path: output_root.join(&name).join(format!("index.{BUNDLE_EXT}")),
            name,
        }
    }

    /// Directory that receives this target's bundle and extracted CSS.
    pub fn output_dir(&self) -> &Path {
        self.output_path.parent().unwrap_or(Path::new(""))
    }

    /// Global name the bundle is exposed under (`{name}App`).
    pub fn bundle_name(&self) -> String {
        format!("{}App", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_defaults_to_development_when_unset() {
        assert_eq!(Mode::from_env_value(None).unwrap(), Mode::Development);
        assert_eq!(Mode::from_env_value(Some("  ")).unwrap(), Mode::Development);
    }

    #[test]
    fn mode_parses_aliases() {
        assert_eq!("production".parse::<Mode>().unwrap(), Mode::Production);
        assert_eq!("PROD".parse::<Mode>().unwrap(), Mode::Production);
        assert_eq!("dev".parse::<Mode>().unwrap(), Mode::Development);
        assert!("staging".parse::<Mode>().unwrap_err().is_configuration());
    }

    #[test]
    fn mode_serializes_lowercase() {
        let json = serde_json::to_string(&Mode::Production).expect("serialize");
        assert_eq!(json, "\"production\"");
    }

    #[test]
    fn build_target_paths() {
        let target = BuildTarget::new(
            "admin",
            Path::new("app/svelte"),
            Path::new("app/static/svelte"),
        );
        assert_eq!(target.entry_path, PathBuf::from("app/svelte/admin/main.js"));
        assert_eq!(
            target.output_path,
            PathBuf::from("app/static/svelte/admin/index.js")
        );
        assert_eq!(target.output_dir(), Path::new("app/static/svelte/admin"));
        assert_eq!(target.bundle_name(), "adminApp");
    }
}
