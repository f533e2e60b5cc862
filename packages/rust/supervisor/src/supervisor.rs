//! Dev server lifecycle.
//!
//! ```text
//! Idle ──activate──▶ Starting ──spawned──▶ Running ──shutdown──▶ Stopping ──▶ Stopped
//!   │                   │
//!   └──shutdown──▶ Stopped ◀──spawn failed──┘
//! ```
//!
//! At most one process is ever launched per supervisor. `shutdown` has two
//! callers (drop on normal exit, the termination-signal task) and both go
//! through the same state check.

use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};

use pipewright_shared::{PipewrightError, Result};

use crate::process::{Launcher, ServerCommand, ServerProcess, SystemLauncher};

/// Observable supervisor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

struct Inner {
    state: SupervisorState,
    process: Option<Box<dyn ServerProcess>>,
}

/// Owns the single dev server process for the orchestrator's lifetime.
pub struct DevServerSupervisor {
    command: ServerCommand,
    launcher: Box<dyn Launcher>,
    inner: Mutex<Inner>,
}

impl DevServerSupervisor {
    /// Supervisor that launches real processes.
    pub fn new(command: ServerCommand) -> Self {
        Self::with_launcher(command, Box::new(SystemLauncher))
    }

    pub fn with_launcher(command: ServerCommand, launcher: Box<dyn Launcher>) -> Self {
        Self {
            command,
            launcher,
            inner: Mutex::new(Inner {
                state: SupervisorState::Idle,
                process: None,
            }),
        }
    }

    pub fn command(&self) -> &ServerCommand {
        &self.command
    }

    pub fn state(&self) -> SupervisorState {
        self.lock().state
    }

    /// Pid of the running server, if any.
    pub fn pid(&self) -> Option<u32> {
        self.lock().process.as_ref().and_then(|p| p.id())
    }

    /// Start the server if it has never been started.
    ///
    /// Idempotent: only the first call from `Idle` launches anything. A spawn
    /// failure is returned and leaves the supervisor `Stopped`, so the dev
    /// server stays unavailable for the rest of the run.
    pub fn activate(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.state != SupervisorState::Idle {
            debug!(state = ?inner.state, "dev server activation ignored");
            return Ok(());
        }

        inner.state = SupervisorState::Starting;
        info!(command = %self.command.display(), "starting dev server");

        match self.launcher.launch(&self.command) {
            Ok(process) => {
                inner.process = Some(process);
                inner.state = SupervisorState::Running;
                Ok(())
            }
            Err(e) => {
                inner.state = SupervisorState::Stopped;
                Err(PipewrightError::spawn(self.command.display(), e))
            }
        }
    }

    /// Stop the server. Never fails and never panics; errors are logged.
    pub fn shutdown(&self) {
        if let Err(e) = self.try_shutdown() {
            warn!(error = %e, "dev server shutdown failed");
        }
    }

    fn try_shutdown(&self) -> Result<()> {
        let mut inner = self.lock();
        match inner.state {
            SupervisorState::Stopping | SupervisorState::Stopped => return Ok(()),
            SupervisorState::Idle => {
                inner.state = SupervisorState::Stopped;
                return Ok(());
            }
            SupervisorState::Starting | SupervisorState::Running => {}
        }

        inner.state = SupervisorState::Stopping;
        let result = match inner.process.take() {
            Some(mut process) => {
                let pid = process.id();
                info!(?pid, "stopping dev server");
                process
                    .terminate()
                    .map_err(|e| PipewrightError::Shutdown(format!("pid {pid:?}: {e}")))
            }
            None => Ok(()),
        };
        inner.state = SupervisorState::Stopped;
        result
    }

    /// Poisoning only means another thread panicked mid-transition; the state
    /// value itself is still the last one written.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for DevServerSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for DevServerSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevServerSupervisor")
            .field("command", &self.command)
            .field("state", &self.state())
            .finish()
    }
}
