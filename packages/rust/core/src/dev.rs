//! Development session: build, wait for changes, rebuild, until told to stop.
//!
//! Each pass runs on a blocking thread so a termination request is acted on
//! immediately, even mid-pass: the supervisor is shut down first and the
//! pass is told to start no further target. Whatever ends the session, the
//! supervisor is `Stopped` when [`run_dev_session`] returns.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use pipewright_shared::{PipewrightError, Result};
use pipewright_supervisor::DevServerSupervisor;

use crate::engine::{BuildEngine, BuildPassReport, PassProgress, run_build_pass_until};
use crate::orchestrator::EmittedBuildConfig;
use crate::watch::RebuildWatcher;

/// Everything one build pass needs.
pub struct PassPlan {
    pub engine: Arc<dyn BuildEngine + Send + Sync>,
    pub configs: Vec<EmittedBuildConfig>,
    /// File holding the emitted configurations, handed to the engine.
    pub config_path: PathBuf,
}

/// Source of changed-path batches. `None` means no more changes will come.
pub trait ChangeFeed {
    fn next_batch(&mut self) -> impl Future<Output = Option<Vec<PathBuf>>> + Send;
}

impl ChangeFeed for RebuildWatcher {
    fn next_batch(&mut self) -> impl Future<Output = Option<Vec<PathBuf>>> + Send {
        RebuildWatcher::next_batch(self)
    }
}

impl ChangeFeed for UnboundedReceiver<Vec<PathBuf>> {
    fn next_batch(&mut self) -> impl Future<Output = Option<Vec<PathBuf>>> + Send {
        self.recv()
    }
}

/// Host-side behaviour of a session.
pub trait DevHooks {
    /// Plan for the current project state. Called at start, where an error
    /// ends the session, and after every change, where an error keeps the
    /// previous plan.
    fn plan(&mut self) -> Result<PassPlan>;

    /// Fresh progress reporter for one pass.
    fn progress(&self) -> Box<dyn PassProgress + Send>;

    /// Called after a change was picked up, before the rebuild starts.
    fn before_rebuild(&mut self) {}

    /// Called with every finished pass.
    fn pass_finished(&mut self, _report: &BuildPassReport) {}
}

/// Run passes until `shutdown` resolves or `changes` runs dry, then shut the
/// supervisor down.
pub async fn run_dev_session<H, C, S>(
    supervisor: &DevServerSupervisor,
    hooks: &mut H,
    changes: &mut C,
    shutdown: S,
) -> Result<()>
where
    H: DevHooks,
    C: ChangeFeed,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let outcome = session_loop(hooks, changes, &mut shutdown).await;
    supervisor.shutdown();
    outcome
}

async fn session_loop<H, C, S>(hooks: &mut H, changes: &mut C, shutdown: &mut S) -> Result<()>
where
    H: DevHooks,
    C: ChangeFeed,
    S: Future<Output = ()> + Unpin,
{
    let mut plan = Arc::new(hooks.plan()?);

    loop {
        let stop = Arc::new(AtomicBool::new(false));
        let mut pass = spawn_pass(plan.clone(), hooks.progress(), stop.clone());

        tokio::select! {
            _ = &mut *shutdown => {
                stop.store(true, Ordering::SeqCst);
                info!("termination requested during build pass");
                return Ok(());
            }
            joined = &mut pass => {
                let report = joined
                    .map_err(|e| PipewrightError::Build(format!("build pass aborted: {e}")))?;
                hooks.pass_finished(&report);
            }
        }

        tokio::select! {
            _ = &mut *shutdown => {
                info!("termination requested");
                return Ok(());
            }
            batch = changes.next_batch() => {
                let Some(changed) = batch else {
                    warn!("watcher stopped");
                    return Ok(());
                };
                info!(files = changed.len(), "change detected, rebuilding");

                match hooks.plan() {
                    Ok(next) => plan = Arc::new(next),
                    Err(e) => warn!(error = %e, "config invalid, keeping previous"),
                }
                hooks.before_rebuild();
            }
        }
    }
}

fn spawn_pass(
    plan: Arc<PassPlan>,
    progress: Box<dyn PassProgress + Send>,
    stop: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<BuildPassReport> {
    tokio::task::spawn_blocking(move || {
        run_build_pass_until(
            plan.engine.as_ref(),
            &plan.configs,
            &plan.config_path,
            progress.as_ref(),
            &stop,
        )
    })
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};

    use pipewright_shared::Mode;
    use pipewright_supervisor::{Launcher, ServerCommand, ServerProcess, SupervisorState};

    use super::*;
    use crate::engine::SilentProgress;
    use crate::orchestrator::{Orchestrator, OrchestratorConfig};
    use crate::pipeline::{PipelineBuilder, StageSettings};
    use crate::targets::ProjectLayout;

    #[derive(Default)]
    struct Counters {
        launched: AtomicUsize,
        terminated: AtomicUsize,
    }

    struct FakeServer(Arc<Counters>);

    impl ServerProcess for FakeServer {
        fn id(&self) -> Option<u32> {
            Some(4242)
        }
        fn terminate(&mut self) -> io::Result<()> {
            self.0.terminated.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeLauncher(Arc<Counters>);

    impl Launcher for FakeLauncher {
        fn launch(&self, _command: &ServerCommand) -> io::Result<Box<dyn ServerProcess>> {
            self.0.launched.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeServer(self.0.clone())))
        }
    }

    /// Records built targets; can hold one target until released and
    /// announce when each target starts.
    #[derive(Default)]
    struct GatedEngine {
        built: Mutex<Vec<String>>,
        hold: Option<String>,
        started: Mutex<Option<UnboundedSender<String>>>,
        release: Mutex<Option<std::sync::mpsc::Receiver<()>>>,
    }

    impl BuildEngine for GatedEngine {
        fn run(&self, config: &EmittedBuildConfig, _config_path: &Path) -> Result<()> {
            let name = config.target.name.clone();
            if let Some(tx) = self.started.lock().expect("lock").as_ref() {
                let _ = tx.send(name.clone());
            }
            if self.hold.as_deref() == Some(name.as_str()) {
                if let Some(rx) = self.release.lock().expect("lock").as_ref() {
                    let _ = rx.recv_timeout(Duration::from_secs(5));
                }
            }
            self.built.lock().expect("lock").push(name);
            Ok(())
        }
    }

    struct Hooks {
        supervisor: Arc<DevServerSupervisor>,
        engine: Arc<GatedEngine>,
        targets: Vec<String>,
        plans: usize,
        passes: UnboundedSender<BuildPassReport>,
    }

    impl Hooks {
        fn new(
            supervisor: Arc<DevServerSupervisor>,
            engine: Arc<GatedEngine>,
            targets: &[&str],
        ) -> (Self, UnboundedReceiver<BuildPassReport>) {
            let (passes, rx) = unbounded_channel();
            let hooks = Self {
                supervisor,
                engine,
                targets: targets.iter().map(|s| s.to_string()).collect(),
                plans: 0,
                passes,
            };
            (hooks, rx)
        }
    }

    impl DevHooks for Hooks {
        fn plan(&mut self) -> Result<PassPlan> {
            self.plans += 1;
            let orchestrator = Orchestrator::new(PipelineBuilder::builtin(StageSettings::default()))
                .with_dev_server(self.supervisor.clone());
            let configs = orchestrator.generate(&OrchestratorConfig {
                target_names: self.targets.clone(),
                mode: Mode::Development,
                layout: ProjectLayout::new("src", "dist"),
                require_targets: true,
                clear_screen: false,
            })?;
            Ok(PassPlan {
                engine: self.engine.clone(),
                configs,
                config_path: PathBuf::from("dist/.pipewright/build.json"),
            })
        }

        fn progress(&self) -> Box<dyn PassProgress + Send> {
            Box::new(SilentProgress)
        }

        fn pass_finished(&mut self, report: &BuildPassReport) {
            let _ = self.passes.send(report.clone());
        }
    }

    fn supervisor(counters: &Arc<Counters>) -> Arc<DevServerSupervisor> {
        Arc::new(DevServerSupervisor::with_launcher(
            ServerCommand::new("flask", vec!["run".into()]),
            Box::new(FakeLauncher(counters.clone())),
        ))
    }

    #[tokio::test]
    async fn signal_after_first_pass_stops_the_server() {
        let counters = Arc::new(Counters::default());
        let supervisor = supervisor(&counters);
        let engine = Arc::new(GatedEngine::default());
        let (mut hooks, mut passes) = Hooks::new(supervisor.clone(), engine, &["index", "admin"]);
        let (_changes_tx, mut changes) = unbounded_channel::<Vec<PathBuf>>();

        let signal = async move {
            passes.recv().await;
        };
        run_dev_session(&supervisor, &mut hooks, &mut changes, signal)
            .await
            .expect("session");

        assert_eq!(supervisor.state(), SupervisorState::Stopped);
        assert_eq!(counters.launched.load(Ordering::SeqCst), 1);
        assert_eq!(counters.terminated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn signal_mid_pass_stops_server_and_remaining_targets() {
        let counters = Arc::new(Counters::default());
        let supervisor = supervisor(&counters);

        let (started_tx, mut started) = unbounded_channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let engine = Arc::new(GatedEngine {
            hold: Some("admin".into()),
            started: Mutex::new(Some(started_tx)),
            release: Mutex::new(Some(release_rx)),
            ..GatedEngine::default()
        });
        let (mut hooks, _passes) =
            Hooks::new(supervisor.clone(), engine.clone(), &["index", "admin", "blog"]);
        let (_changes_tx, mut changes) = unbounded_channel::<Vec<PathBuf>>();

        // Target 0 has built (and fired build-complete) once target 1 starts.
        let signal = async move {
            while let Some(name) = started.recv().await {
                if name == "admin" {
                    break;
                }
            }
        };
        run_dev_session(&supervisor, &mut hooks, &mut changes, signal)
            .await
            .expect("session");

        assert_eq!(supervisor.state(), SupervisorState::Stopped);
        assert_eq!(counters.launched.load(Ordering::SeqCst), 1);
        assert_eq!(counters.terminated.load(Ordering::SeqCst), 1);

        // Let the held target finish; the pass must not move on to "blog".
        let _ = release_tx.send(());
        for _ in 0..100 {
            if engine.built.lock().expect("lock").len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*engine.built.lock().expect("lock"), ["index", "admin"]);
        assert_eq!(counters.launched.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rebuild_replans_and_reuses_the_server() {
        let counters = Arc::new(Counters::default());
        let supervisor = supervisor(&counters);
        let engine = Arc::new(GatedEngine::default());
        let (mut hooks, mut passes) =
            Hooks::new(supervisor.clone(), engine.clone(), &["index", "admin"]);
        let (changes_tx, mut changes) = unbounded_channel();
        changes_tx
            .send(vec![PathBuf::from("src/index/App.svelte")])
            .expect("send change");

        let signal = async move {
            passes.recv().await;
            passes.recv().await;
        };
        run_dev_session(&supervisor, &mut hooks, &mut changes, signal)
            .await
            .expect("session");

        assert_eq!(hooks.plans, 2);
        assert_eq!(
            *engine.built.lock().expect("lock"),
            ["index", "admin", "index", "admin"]
        );
        assert_eq!(counters.launched.load(Ordering::SeqCst), 1);
        assert_eq!(counters.terminated.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.state(), SupervisorState::Stopped);
    }

    #[tokio::test]
    async fn closed_change_feed_ends_session_with_server_stopped() {
        let counters = Arc::new(Counters::default());
        let supervisor = supervisor(&counters);
        let engine = Arc::new(GatedEngine::default());
        let (mut hooks, _passes) = Hooks::new(supervisor.clone(), engine, &["index"]);
        let (changes_tx, mut changes) = unbounded_channel::<Vec<PathBuf>>();
        drop(changes_tx);

        run_dev_session(&supervisor, &mut hooks, &mut changes, std::future::pending::<()>())
            .await
            .expect("session");

        assert_eq!(supervisor.state(), SupervisorState::Stopped);
        assert_eq!(counters.terminated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_initial_plan_still_stops_the_server() {
        let counters = Arc::new(Counters::default());
        let supervisor = supervisor(&counters);
        let engine = Arc::new(GatedEngine::default());
        let (mut hooks, _passes) = Hooks::new(supervisor.clone(), engine, &[]);
        let (_changes_tx, mut changes) = unbounded_channel::<Vec<PathBuf>>();

        let err = run_dev_session(&supervisor, &mut hooks, &mut changes, std::future::pending::<()>())
            .await
            .unwrap_err();

        assert!(err.is_configuration());
        assert_eq!(supervisor.state(), SupervisorState::Stopped);
        assert_eq!(counters.launched.load(Ordering::SeqCst), 0);
    }
}
