//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use pipewright_core::dev::{DevHooks, PassPlan, run_dev_session};
use pipewright_core::engine::{BuildPassReport, CommandEngine, PassProgress, run_build_pass};
use pipewright_core::orchestrator::{self, EmittedBuildConfig, Orchestrator, OrchestratorConfig};
use pipewright_core::pipeline::{PipelineBuilder, StageSettings};
use pipewright_core::scaffold;
use pipewright_core::watch::{RebuildWatcher, WatchSet};
use pipewright_shared::{AppConfig, CONFIG_FILE_NAME, Mode, load_config_from, project_root};
use pipewright_supervisor::DevServerSupervisor;

/// Where `build` and `dev` write the emitted configuration, under the output root.
const EMITTED_CONFIG: &str = ".pipewright/build.json";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// pipewright — compose, build and serve front-end bundles.
#[derive(Parser)]
#[command(
    name = "pipewright",
    version,
    about = "Compose per-target bundle pipelines and supervise the dev server.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Path to the project config file.
    #[arg(long, default_value = CONFIG_FILE_NAME, global = true)]
    pub config: PathBuf,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Create a default config and the source/output directories.
    Init {
        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },

    /// Register a new build target and create its directories.
    AddTarget {
        /// Target name (letters, digits, '_' or '-').
        name: String,
    },

    /// Print the emitted build configuration as JSON.
    Generate {
        /// development or production (defaults to config, then PIPEWRIGHT_MODE).
        #[arg(short, long)]
        mode: Option<Mode>,

        /// Write to this file instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Fail when no targets are configured.
        #[arg(long)]
        require_targets: bool,
    },

    /// Run one build pass over every target. Never starts the dev server.
    Build {
        /// development or production (defaults to config, then PIPEWRIGHT_MODE).
        #[arg(short, long)]
        mode: Option<Mode>,
    },

    /// Build in development mode, rebuild on change, and run the dev server.
    Dev,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "pipewright=info",
        1 => "pipewright=debug",
        _ => "pipewright=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Init { force } => cmd_init(&config_path, force),
        Command::AddTarget { name } => cmd_add_target(&config_path, &name),
        Command::Generate {
            mode,
            out,
            require_targets,
        } => cmd_generate(&config_path, mode, out.as_deref(), require_targets),
        Command::Build { mode } => cmd_build(&config_path, mode),
        Command::Dev => cmd_dev(&config_path).await,
        Command::Config { action } => match action {
            ConfigAction::Show => cmd_config_show(&config_path),
        },
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Load the config and resolve its mode and orchestrator settings.
fn load(config_path: &Path, mode: Option<Mode>) -> Result<(AppConfig, OrchestratorConfig)> {
    let config = load_config_from(config_path)?;
    let mode = config.resolve_mode(mode)?;
    let orch = OrchestratorConfig::from_app_config(&config, &project_root(config_path), mode);
    Ok((config, orch))
}

fn emitted_path(orch: &OrchestratorConfig) -> PathBuf {
    orch.layout.output_root.join(EMITTED_CONFIG)
}

fn print_report(report: &BuildPassReport) {
    for failure in &report.failed {
        eprintln!("  ✗ {}: {}", failure.target, failure.error);
    }
    if let Some(err) = &report.dev_server_error {
        eprintln!("  ! dev server unavailable: {err}");
    }
    println!(
        "  [{}] Built {}/{} target(s) in {:.1}s",
        report.started_at.format("%H:%M:%S"),
        report.succeeded.len(),
        report.succeeded.len() + report.failed.len(),
        report.elapsed.as_secs_f64()
    );
    if report.cancelled {
        println!("  Build pass cancelled");
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_init(config_path: &Path, force: bool) -> Result<()> {
    let config = scaffold::init_project(config_path, force)?;
    println!("Project initialized at: {}", config_path.display());
    println!("  Targets: {}", config.project.targets.join(", "));
    println!("Add another with: pipewright add-target <name>");
    Ok(())
}

fn cmd_add_target(config_path: &Path, name: &str) -> Result<()> {
    let target = scaffold::add_target(config_path, name)?;
    println!("Added target: {}", target.name);
    println!("  Entry:  {}", target.entry_path.display());
    println!("  Output: {}", target.output_path.display());
    Ok(())
}

fn cmd_generate(
    config_path: &Path,
    mode: Option<Mode>,
    out: Option<&Path>,
    require_targets: bool,
) -> Result<()> {
    let (config, mut orch) = load(config_path, mode)?;
    orch.require_targets = require_targets;

    let orchestrator = Orchestrator::new(PipelineBuilder::builtin(StageSettings::from(&config)));
    let emitted = orchestrator.generate(&orch)?;

    match out {
        Some(path) => {
            orchestrator::write_emitted(&emitted, path)?;
            info!(path = %path.display(), count = emitted.len(), "build configuration written");
        }
        None => println!("{}", orchestrator::to_json(&emitted)?),
    }
    Ok(())
}

fn cmd_build(config_path: &Path, mode: Option<Mode>) -> Result<()> {
    let (config, mut orch) = load(config_path, mode)?;
    orch.require_targets = true;

    let orchestrator = Orchestrator::new(PipelineBuilder::builtin(StageSettings::from(&config)));
    let emitted = orchestrator.generate(&orch)?;
    let json_path = emitted_path(&orch);
    orchestrator::write_emitted(&emitted, &json_path)?;

    info!(mode = %orch.mode, targets = emitted.len(), "building");

    let engine = CommandEngine::from_config(&config.engine, project_root(config_path));
    let report = run_build_pass(&engine, &emitted, &json_path, &CliProgress::new());
    print_report(&report);

    if !report.is_success() {
        return Err(eyre!("{} target(s) failed to build", report.failed.len()));
    }
    Ok(())
}

/// Generate development configs bound to the shared dev server.
fn generate_dev(
    config: &AppConfig,
    config_path: &Path,
    supervisor: &Arc<DevServerSupervisor>,
) -> pipewright_shared::Result<(OrchestratorConfig, Vec<EmittedBuildConfig>)> {
    let mut orch =
        OrchestratorConfig::from_app_config(config, &project_root(config_path), Mode::Development);
    orch.require_targets = true;

    let orchestrator = Orchestrator::new(PipelineBuilder::builtin(StageSettings::from(config)))
        .with_dev_server(supervisor.clone());
    let emitted = orchestrator.generate(&orch)?;
    orchestrator::write_emitted(&emitted, &emitted_path(&orch))?;
    Ok((orch, emitted))
}

/// `dev` session hooks: reload the config on every plan, report to the terminal.
struct DevCli {
    config_path: PathBuf,
    root: PathBuf,
    supervisor: Arc<DevServerSupervisor>,
    clear_screen: bool,
}

impl DevHooks for DevCli {
    fn plan(&mut self) -> pipewright_shared::Result<PassPlan> {
        let config = load_config_from(&self.config_path)?;
        let (orch, configs) = generate_dev(&config, &self.config_path, &self.supervisor)?;
        self.clear_screen = config.watch.clear_screen;
        Ok(PassPlan {
            engine: Arc::new(CommandEngine::from_config(&config.engine, &self.root)),
            configs,
            config_path: emitted_path(&orch),
        })
    }

    fn progress(&self) -> Box<dyn PassProgress + Send> {
        Box::new(CliProgress::new())
    }

    fn before_rebuild(&mut self) {
        if self.clear_screen {
            clear_screen();
        }
    }

    fn pass_finished(&mut self, report: &BuildPassReport) {
        print_report(report);
    }
}

async fn cmd_dev(config_path: &Path) -> Result<()> {
    let config = load_config_from(config_path)?;
    let root = project_root(config_path);

    // Installed before anything is spawned so no signal slips past teardown.
    let mut signals = TerminationSignals::install()?;

    let supervisor = Arc::new(DevServerSupervisor::new(
        StageSettings::from(&config).dev_server,
    ));
    let orch = OrchestratorConfig::from_app_config(&config, &root, Mode::Development);

    let watch_set = WatchSet::new(
        &root,
        &orch.layout.source_root,
        &orch.layout.output_root,
        &config.watch.globs,
    )?;
    let mut watcher =
        RebuildWatcher::spawn(watch_set, Duration::from_millis(config.watch.debounce_ms))?;

    println!(
        "  Watching {} for changes (Ctrl-C to stop)...",
        orch.layout.source_root.display()
    );

    let mut hooks = DevCli {
        config_path: config_path.to_path_buf(),
        root,
        supervisor: supervisor.clone(),
        clear_screen: config.watch.clear_screen,
    };
    let shutdown = async move {
        signals.recv().await;
        info!("termination signal received");
    };

    run_dev_session(&supervisor, &mut hooks, &mut watcher, shutdown).await?;
    Ok(())
}

fn cmd_config_show(config_path: &Path) -> Result<()> {
    let config = load_config_from(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn clear_screen() {
    print!("\x1B[2J\x1B[1;1H");
}

// ---------------------------------------------------------------------------
// Termination signals
// ---------------------------------------------------------------------------

/// Ctrl-C and (on unix) SIGTERM, registered eagerly.
struct TerminationSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl TerminationSignals {
    fn install() -> Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    async fn recv(&mut self) {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.interrupt.recv() => {}
                _ = self.terminate.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl PassProgress for CliProgress {
    fn target_started(&self, name: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Building [{current}/{total}] {name}"));
    }

    fn done(&self, _report: &BuildPassReport) {
        self.spinner.finish_and_clear();
    }
}
