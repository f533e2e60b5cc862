//! Launching the dev server process.
//!
//! The supervisor never touches `std::process` directly; it goes through a
//! [`Launcher`] so the state machine can be exercised without real children.
//!
//! On unix every server runs in its own process group and is stopped by
//! signalling the whole group, so helpers it forks (a shell's children, a
//! reloader's worker) go down with it.

use std::io;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, info};

/// How long the group gets to exit after SIGTERM before it is killed.
#[cfg(unix)]
const TERMINATE_GRACE: Duration = Duration::from_secs(3);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// What to launch: one executable with a fixed argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Run through `sh -c` (or `cmd /C` on Windows). `program` is then
    /// handed to the shell verbatim and each argument is quoted.
    pub shell: bool,
}

impl ServerCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            shell: false,
        }
    }

    pub fn with_shell(mut self, shell: bool) -> Self {
        self.shell = shell;
        self
    }

    /// Human-readable command line, used in logs and errors.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The line handed to the shell in shell mode.
    pub fn shell_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&quote(arg));
        }
        line
    }

    fn to_command(&self) -> Command {
        let mut cmd = if self.shell {
            let mut cmd = if cfg!(windows) {
                let mut cmd = Command::new("cmd");
                cmd.arg("/C");
                cmd
            } else {
                let mut cmd = Command::new("sh");
                cmd.arg("-c");
                cmd
            };
            cmd.arg(self.shell_line());
            cmd
        } else {
            let mut cmd = Command::new(&self.program);
            cmd.args(&self.args);
            cmd
        };

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        cmd
    }
}

fn is_plain(arg: &str) -> bool {
    !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-+=:,./@%".contains(c))
}

#[cfg(not(windows))]
fn quote(arg: &str) -> String {
    if is_plain(arg) {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

#[cfg(windows)]
fn quote(arg: &str) -> String {
    if is_plain(arg) {
        return arg.to_string();
    }
    format!("\"{}\"", arg.replace('"', "\\\""))
}

/// A live process owned by the supervisor.
pub trait ServerProcess: Send {
    /// OS process id, when known.
    fn id(&self) -> Option<u32>;

    /// Signal the process to stop and reap it.
    fn terminate(&mut self) -> io::Result<()>;
}

/// Starts server processes.
pub trait Launcher: Send + Sync {
    fn launch(&self, command: &ServerCommand) -> io::Result<Box<dyn ServerProcess>>;
}

// ---------------------------------------------------------------------------
// System implementation
// ---------------------------------------------------------------------------

/// Launches real OS processes: null stdin, inherited stdout/stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(&self, command: &ServerCommand) -> io::Result<Box<dyn ServerProcess>> {
        let child = command
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()?;

        info!(pid = child.id(), command = %command.display(), "dev server spawned");
        Ok(Box::new(ChildProcess {
            child,
            reaped: false,
        }))
    }
}

struct ChildProcess {
    child: Child,
    reaped: bool,
}

impl ChildProcess {
    /// Poll the leader until it exits or `grace` runs out.
    fn wait_for_exit(&mut self, grace: Duration) -> io::Result<bool> {
        let deadline = Instant::now() + grace;
        loop {
            if let Some(status) = self.child.try_wait()? {
                debug!(?status, "dev server exited");
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(unix)]
fn signal_group(pgid: u32, signal: nix::sys::signal::Signal) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let pgid = i32::try_from(pgid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    match killpg(Pid::from_raw(pgid), signal) {
        // Whole group already gone.
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(io::Error::from(e)),
    }
}

impl ServerProcess for ChildProcess {
    fn id(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn terminate(&mut self) -> io::Result<()> {
        if self.reaped {
            return Ok(());
        }

        #[cfg(unix)]
        {
            use nix::sys::signal::Signal;

            let pgid = self.child.id();
            signal_group(pgid, Signal::SIGTERM)?;
            if !self.wait_for_exit(TERMINATE_GRACE)? {
                tracing::warn!(pgid, "dev server ignored SIGTERM, killing");
            }
            // Stragglers that outlived the leader.
            signal_group(pgid, Signal::SIGKILL)?;
        }

        #[cfg(not(unix))]
        {
            if !self.wait_for_exit(Duration::ZERO)? {
                match self.child.kill() {
                    Ok(()) => {}
                    // Exited between try_wait and kill.
                    Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
                    Err(e) => return Err(e),
                }
            }
        }

        let status = self.child.wait()?;
        self.reaped = true;
        debug!(?status, "dev server reaped");
        Ok(())
    }
}
