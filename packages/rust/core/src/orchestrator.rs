//! Orchestration: targets → pipelines → emitted build configurations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument};

use pipewright_shared::{AppConfig, BuildTarget, Mode, PipewrightError, Result};
use pipewright_supervisor::DevServerSupervisor;

use crate::pipeline::{CSS_OUTPUT, Pipeline, PipelineBuilder};
use crate::targets::{self, ProjectLayout};

/// Bundle format handed to the engine.
pub const BUNDLE_FORMAT: &str = "iife";

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Runtime generation settings, merged from the config file and CLI flags.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub target_names: Vec<String>,
    pub mode: Mode,
    pub layout: ProjectLayout,
    /// Treat an empty target list as an error instead of an empty result.
    pub require_targets: bool,
    pub clear_screen: bool,
}

impl OrchestratorConfig {
    /// Build from a loaded config; relative roots are joined onto `project_root`.
    pub fn from_app_config(config: &AppConfig, project_root: &Path, mode: Mode) -> Self {
        Self {
            target_names: config.project.targets.clone(),
            mode,
            layout: ProjectLayout::new(
                project_root.join(&config.project.source_root),
                project_root.join(&config.project.output_root),
            ),
            require_targets: false,
            clear_screen: config.watch.clear_screen,
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Where and how the engine writes a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputOptions {
    pub file: PathBuf,
    pub css_file: PathBuf,
    pub format: String,
    /// Global name the bundle is exposed under.
    pub name: String,
    pub sourcemap: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchOptions {
    pub clear_screen: bool,
}

/// One target's complete build configuration.
#[derive(Debug, Clone, Serialize)]
pub struct EmittedBuildConfig {
    pub target: BuildTarget,
    pub mode: Mode,
    pub pipeline: Pipeline,
    pub watch_enabled: bool,
    pub output: OutputOptions,
    pub watch: WatchOptions,
    /// Activated when this target finishes a build pass.
    #[serde(skip)]
    dev_server: Option<Arc<DevServerSupervisor>>,
}

impl EmittedBuildConfig {
    /// Whether a build-complete on this config starts the dev server.
    pub fn starts_dev_server(&self) -> bool {
        self.dev_server.is_some()
    }

    /// Fire the build-complete event for this target.
    ///
    /// Safe to call after every rebuild: activation is idempotent, so the dev
    /// server is launched at most once. A spawn failure is returned for the
    /// caller to report; it never invalidates the config itself.
    pub fn build_complete(&self) -> Result<()> {
        match &self.dev_server {
            Some(supervisor) => supervisor.activate(),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Ties the resolver, the pipeline builder and the dev server together.
#[derive(Debug)]
pub struct Orchestrator {
    builder: PipelineBuilder,
    dev_server: Option<Arc<DevServerSupervisor>>,
}

impl Orchestrator {
    pub fn new(builder: PipelineBuilder) -> Self {
        Self {
            builder,
            dev_server: None,
        }
    }

    /// Attach the process-wide dev server. Only bound in development mode,
    /// and only to the first target.
    pub fn with_dev_server(mut self, supervisor: Arc<DevServerSupervisor>) -> Self {
        self.dev_server = Some(supervisor);
        self
    }

    pub fn dev_server(&self) -> Option<&Arc<DevServerSupervisor>> {
        self.dev_server.as_ref()
    }

    /// Produce one build configuration per target, in target order.
    ///
    /// All-or-nothing: a configuration error means nothing is emitted.
    #[instrument(skip_all, fields(mode = %config.mode, targets = config.target_names.len()))]
    pub fn generate(&self, config: &OrchestratorConfig) -> Result<Vec<EmittedBuildConfig>> {
        if config.target_names.is_empty() && config.require_targets {
            return Err(PipewrightError::config(
                "no build targets configured (add one with `pipewright add-target <name>`)",
            ));
        }

        let targets = targets::resolve(&config.target_names, &config.layout)?;
        let watch_enabled = config.mode.is_development();

        let emitted: Vec<EmittedBuildConfig> = targets
            .into_iter()
            .enumerate()
            .map(|(index, target)| {
                let pipeline = self.builder.build(&target, config.mode, index);
                let dev_server = if index == 0 && config.mode.is_development() {
                    self.dev_server.clone()
                } else {
                    None
                };
                if dev_server.is_some() {
                    debug!(target = %target.name, "dev server bound to build-complete");
                }

                EmittedBuildConfig {
                    output: OutputOptions {
                        file: target.output_path.clone(),
                        css_file: target.output_dir().join(CSS_OUTPUT),
                        format: BUNDLE_FORMAT.to_string(),
                        name: target.bundle_name(),
                        sourcemap: true,
                    },
                    watch: WatchOptions {
                        clear_screen: config.clear_screen,
                    },
                    target,
                    mode: config.mode,
                    pipeline,
                    watch_enabled,
                    dev_server,
                }
            })
            .collect();

        info!(count = emitted.len(), "build configurations generated");
        Ok(emitted)
    }
}

/// Serialize emitted configs as a pretty JSON array.
pub fn to_json(configs: &[EmittedBuildConfig]) -> Result<String> {
    serde_json::to_string_pretty(configs)
        .map_err(|e| PipewrightError::config(format!("failed to serialize build config: {e}")))
}

/// Write emitted configs to `path`, creating parent directories.
pub fn write_emitted(configs: &[EmittedBuildConfig], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PipewrightError::io(parent, e))?;
    }
    let json = to_json(configs)?;
    std::fs::write(path, json).map_err(|e| PipewrightError::io(path, e))?;
    debug!(?path, "build configuration written");
    Ok(())
}
