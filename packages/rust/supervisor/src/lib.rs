//! Supervision of the development web server.
//!
//! This crate provides:
//! - [`DevServerSupervisor`] — idempotent activate/shutdown state machine
//! - [`Launcher`] / [`SystemLauncher`] — process spawning seam

pub mod process;
pub mod supervisor;

pub use process::{Launcher, ServerCommand, ServerProcess, SystemLauncher};
pub use supervisor::{DevServerSupervisor, SupervisorState};
