//! Project configuration for pipewright.
//!
//! The config lives at `pipewright.toml` in the project root. Relative paths
//! inside it are resolved against the directory containing the file.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipewrightError, Result};
use crate::types::Mode;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "pipewright.toml";

// ---------------------------------------------------------------------------
// Config structs (matching pipewright.toml schema)
// ---------------------------------------------------------------------------

/// Top-level project config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Targets and directory layout.
    #[serde(default)]
    pub project: ProjectConfig,

    /// Styling framework collaborator settings.
    #[serde(default)]
    pub styling: StylingConfig,

    /// Live-reload stage settings.
    #[serde(default)]
    pub live_reload: LiveReloadConfig,

    /// Supervised development server.
    #[serde(default)]
    pub dev_server: DevServerConfig,

    /// Watch-trigger stage and rebuild watcher.
    #[serde(default)]
    pub watch: WatchConfig,

    /// External build engine invocation.
    #[serde(default)]
    pub engine: EngineConfig,
}

/// `[project]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Directory holding one source folder per target.
    #[serde(default = "default_source_root")]
    pub source_root: String,

    /// Directory receiving one output folder per target.
    #[serde(default = "default_output_root")]
    pub output_root: String,

    /// Server-side page templates, one `<target>.html` per target.
    #[serde(default = "default_templates_root")]
    pub templates_root: String,

    /// Target names, in build order. The first one owns the dev server.
    #[serde(default)]
    pub targets: Vec<String>,

    /// Fixed build mode. Falls back to the environment when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            source_root: default_source_root(),
            output_root: default_output_root(),
            templates_root: default_templates_root(),
            targets: Vec::new(),
            mode: None,
        }
    }
}

fn default_source_root() -> String {
    "app/svelte".into()
}
fn default_output_root() -> String {
    "app/static/svelte".into()
}
fn default_templates_root() -> String {
    "app/templates".into()
}

/// `[styling]` section. Passed through to the compile stage untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StylingConfig {
    /// Content-scan globs for the styling framework.
    #[serde(default = "default_content_globs")]
    pub content: Vec<String>,

    /// PostCSS plugins applied during component preprocessing.
    #[serde(default = "default_postcss_plugins")]
    pub postcss_plugins: Vec<String>,
}

impl Default for StylingConfig {
    fn default() -> Self {
        Self {
            content: default_content_globs(),
            postcss_plugins: default_postcss_plugins(),
        }
    }
}

fn default_content_globs() -> Vec<String> {
    vec![
        "./app/svelte/**/*.svelte".into(),
        "./app/svelte/**/*.js".into(),
        "./app/templates/**/*.html".into(),
    ]
}
fn default_postcss_plugins() -> Vec<String> {
    vec!["tailwindcss".into(), "autoprefixer".into()]
}

/// `[live_reload]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveReloadConfig {
    /// Directory the live-reload client watches.
    #[serde(default = "default_live_reload_dir")]
    pub dir: String,
}

impl Default for LiveReloadConfig {
    fn default() -> Self {
        Self {
            dir: default_live_reload_dir(),
        }
    }
}

fn default_live_reload_dir() -> String {
    "app/".into()
}

/// `[dev_server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevServerConfig {
    /// Executable to launch.
    #[serde(default = "default_server_command")]
    pub command: String,

    /// Fixed argument list.
    #[serde(default = "default_server_args")]
    pub args: Vec<String>,

    /// Run through the platform shell instead of executing directly.
    #[serde(default)]
    pub shell: bool,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            command: default_server_command(),
            args: default_server_args(),
            shell: false,
        }
    }
}

fn default_server_command() -> String {
    "flask".into()
}
fn default_server_args() -> Vec<String> {
    vec!["run".into(), "--debug".into()]
}

/// `[watch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Extra files whose change triggers a rebuild.
    #[serde(default = "default_watch_globs")]
    pub globs: Vec<String>,

    /// Debounce window for file events.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Clear the terminal before each rebuild.
    #[serde(default)]
    pub clear_screen: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            globs: default_watch_globs(),
            debounce_ms: default_debounce_ms(),
            clear_screen: false,
        }
    }
}

fn default_watch_globs() -> Vec<String> {
    vec!["./pipewright.toml".into(), "./tailwind.config.js".into()]
}
fn default_debounce_ms() -> u64 {
    200
}

/// `[engine]` section.
///
/// Arguments may contain `{config}`, `{target}`, `{entry}`, `{output}` and
/// `{mode}` placeholders, substituted per target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_engine_command")]
    pub command: String,

    #[serde(default = "default_engine_args")]
    pub args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: default_engine_command(),
            args: default_engine_args(),
        }
    }
}

fn default_engine_command() -> String {
    "rollup".into()
}
fn default_engine_args() -> Vec<String> {
    vec![
        "--config".into(),
        "{config}".into(),
        "--environment".into(),
        "PIPEWRIGHT_TARGET:{target}".into(),
    ]
}

impl AppConfig {
    /// Resolve the build mode: explicit override, then the config file,
    /// then the environment.
    pub fn resolve_mode(&self, cli_override: Option<Mode>) -> Result<Mode> {
        match cli_override.or(self.project.mode) {
            Some(mode) => Ok(mode),
            None => Mode::from_env(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Directory that relative config paths are resolved against.
pub fn project_root(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Load the project config from a specific file path.
///
/// A missing file is a configuration error: every command except `init`
/// needs a project.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Err(PipewrightError::config(format!(
            "no {} found at {} (run `pipewright init` first)",
            CONFIG_FILE_NAME,
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path).map_err(|e| PipewrightError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        PipewrightError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Write the config back to disk.
pub fn save_config(path: &Path, config: &AppConfig) -> Result<()> {
    let content =
        toml::to_string_pretty(config).map_err(|e| PipewrightError::config(e.to_string()))?;
    std::fs::write(path, content).map_err(|e| PipewrightError::io(path, e))?;
    tracing::debug!(?path, "config written");
    Ok(())
}

/// Write a default config file. Refuses to overwrite unless `force` is set.
pub fn init_config(path: &Path, force: bool) -> Result<AppConfig> {
    if path.exists() && !force {
        return Err(PipewrightError::config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }

    let config = AppConfig::default();
    save_config(path, &config)?;
    tracing::info!(?path, "created default config file");

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("source_root"));
        assert!(toml_str.contains("flask"));
        assert!(!toml_str.contains("mode"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.project.output_root, "app/static/svelte");
        assert_eq!(parsed.dev_server.args, vec!["run", "--debug"]);
        assert_eq!(parsed.watch.debounce_ms, 200);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[project]
targets = ["index", "admin"]
mode = "production"

[dev_server]
command = "python"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.project.targets, vec!["index", "admin"]);
        assert_eq!(config.project.mode, Some(Mode::Production));
        assert_eq!(config.project.source_root, "app/svelte");
        assert_eq!(config.project.templates_root, "app/templates");
        assert_eq!(config.dev_server.command, "python");
        assert_eq!(config.dev_server.args, vec!["run", "--debug"]);
        assert_eq!(config.styling.postcss_plugins.len(), 2);
    }

    #[test]
    fn cli_mode_overrides_config() {
        let mut config = AppConfig::default();
        config.project.mode = Some(Mode::Development);
        let mode = config.resolve_mode(Some(Mode::Production)).expect("mode");
        assert_eq!(mode, Mode::Production);
        assert_eq!(config.resolve_mode(None).expect("mode"), Mode::Development);
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_config_from(&dir.path().join(CONFIG_FILE_NAME)).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("pipewright init"));
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);

        init_config(&path, false).expect("first init");
        assert!(init_config(&path, false).is_err());
        init_config(&path, true).expect("forced init");

        let loaded = load_config_from(&path).expect("load");
        assert!(loaded.project.targets.is_empty());
    }

    #[test]
    fn project_root_of_bare_file_name_is_cwd() {
        assert_eq!(project_root(Path::new("pipewright.toml")), PathBuf::from("."));
        assert_eq!(
            project_root(Path::new("site/pipewright.toml")),
            PathBuf::from("site")
        );
    }
}
