//! Running the external build engine over emitted configurations.
//!
//! The engine is opaque: one command per target, with the emitted config
//! path and target details substituted into its arguments. A successful run
//! fires the target's build-complete event.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use pipewright_shared::{EngineConfig, MODE_ENV_VAR, PipewrightError, Result};

use crate::orchestrator::EmittedBuildConfig;

/// Env var carrying the current target name into the engine process.
pub const TARGET_ENV_VAR: &str = "PIPEWRIGHT_TARGET";

/// Something that can build one target from its emitted configuration.
pub trait BuildEngine {
    /// Build `config`. `config_path` is the JSON file holding every emitted
    /// configuration of this pass.
    fn run(&self, config: &EmittedBuildConfig, config_path: &Path) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Command engine
// ---------------------------------------------------------------------------

/// Runs a configured external command once per target.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    command: String,
    args: Vec<String>,
    working_dir: PathBuf,
}

impl CommandEngine {
    pub fn new(command: impl Into<String>, args: Vec<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args,
            working_dir: working_dir.into(),
        }
    }

    pub fn from_config(config: &EngineConfig, working_dir: impl Into<PathBuf>) -> Self {
        Self::new(config.command.as_str(), config.args.clone(), working_dir)
    }

    /// Substitute `{config}`, `{target}`, `{entry}`, `{output}`, `{mode}`.
    pub fn expand_args(&self, config: &EmittedBuildConfig, config_path: &Path) -> Vec<String> {
        let config_path = config_path.display().to_string();
        let entry = config.target.entry_path.display().to_string();
        let output = config.target.output_path.display().to_string();

        self.args
            .iter()
            .map(|arg| {
                arg.replace("{config}", &config_path)
                    .replace("{target}", &config.target.name)
                    .replace("{entry}", &entry)
                    .replace("{output}", &output)
                    .replace("{mode}", config.mode.as_str())
            })
            .collect()
    }
}

impl BuildEngine for CommandEngine {
    #[instrument(skip_all, fields(target = %config.target.name, command = %self.command))]
    fn run(&self, config: &EmittedBuildConfig, config_path: &Path) -> Result<()> {
        let args = self.expand_args(config, config_path);

        let status = Command::new(&self.command)
            .args(&args)
            .current_dir(&self.working_dir)
            .env(MODE_ENV_VAR, config.mode.as_str())
            .env(TARGET_ENV_VAR, &config.target.name)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| {
                PipewrightError::Build(format!(
                    "failed to run `{}`: {e}. Is it installed?",
                    self.command
                ))
            })?;

        if !status.success() {
            return Err(PipewrightError::Build(format!(
                "`{}` exited with status {} for target '{}'",
                self.command,
                status.code().unwrap_or(-1),
                config.target.name
            )));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Build pass
// ---------------------------------------------------------------------------

/// Progress callback for reporting build pass status.
pub trait PassProgress {
    /// Called before each target is handed to the engine.
    fn target_started(&self, name: &str, current: usize, total: usize);
    /// Called once the whole pass finishes.
    fn done(&self, report: &BuildPassReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl PassProgress for SilentProgress {
    fn target_started(&self, _name: &str, _current: usize, _total: usize) {}
    fn done(&self, _report: &BuildPassReport) {}
}

/// A target the engine failed to build.
#[derive(Debug, Clone)]
pub struct TargetFailure {
    pub target: String,
    pub error: String,
}

/// Outcome of one pass over every emitted configuration.
#[derive(Debug, Clone)]
pub struct BuildPassReport {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub succeeded: Vec<String>,
    pub failed: Vec<TargetFailure>,
    /// Set when the dev server could not be started after a build.
    pub dev_server_error: Option<String>,
    /// The pass was stopped early; targets after the last one listed were
    /// never handed to the engine.
    pub cancelled: bool,
}

impl BuildPassReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Build every config in order.
///
/// A failing target does not stop the others. Build-complete fires only for
/// targets the engine built successfully; a dev server spawn failure is
/// recorded in the report and logged, never turned into a build failure.
pub fn run_build_pass(
    engine: &dyn BuildEngine,
    configs: &[EmittedBuildConfig],
    config_path: &Path,
    progress: &dyn PassProgress,
) -> BuildPassReport {
    run_build_pass_until(engine, configs, config_path, progress, &AtomicBool::new(false))
}

/// [`run_build_pass`] that checks `stop` before each target.
///
/// Once `stop` is set no further target is started and no further
/// build-complete event fires; a target already inside the engine runs to
/// completion.
#[instrument(skip_all, fields(targets = configs.len()))]
pub fn run_build_pass_until(
    engine: &dyn BuildEngine,
    configs: &[EmittedBuildConfig],
    config_path: &Path,
    progress: &dyn PassProgress,
    stop: &AtomicBool,
) -> BuildPassReport {
    let started_at = Utc::now();
    let start = Instant::now();
    let total = configs.len();

    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    let mut dev_server_error = None;
    let mut cancelled = false;

    for (i, config) in configs.iter().enumerate() {
        if stop.load(Ordering::SeqCst) {
            cancelled = true;
            break;
        }

        let name = config.target.name.clone();
        progress.target_started(&name, i + 1, total);

        match engine.run(config, config_path) {
            Ok(()) => {
                if stop.load(Ordering::SeqCst) {
                    cancelled = true;
                    succeeded.push(name);
                    break;
                }
                if let Err(e) = config.build_complete() {
                    warn!(target = %name, error = %e, "dev server unavailable for this run");
                    dev_server_error = Some(e.to_string());
                }
                succeeded.push(name);
            }
            Err(e) => {
                warn!(target = %name, error = %e, "target build failed");
                failed.push(TargetFailure {
                    target: name,
                    error: e.to_string(),
                });
            }
        }
    }

    let report = BuildPassReport {
        started_at,
        elapsed: start.elapsed(),
        succeeded,
        failed,
        dev_server_error,
        cancelled,
    };

    progress.done(&report);

    info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        cancelled = report.cancelled,
        elapsed_ms = report.elapsed.as_millis(),
        "build pass complete"
    );

    report
}
