//! Build pipeline orchestration for pipewright.
//!
//! This crate resolves build targets, composes each target's plugin
//! pipeline for the current mode, emits per-target build configurations,
//! and drives the external build engine and rebuild watcher.

pub mod dev;
pub mod engine;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod scaffold;
pub mod targets;
pub mod watch;

pub use dev::{ChangeFeed, DevHooks, PassPlan, run_dev_session};
pub use engine::{
    BuildEngine, BuildPassReport, CommandEngine, PassProgress, run_build_pass,
    run_build_pass_until,
};
pub use orchestrator::{EmittedBuildConfig, Orchestrator, OrchestratorConfig};
pub use pipeline::{Pipeline, PipelineBuilder, Stage, StageOptions, StageSettings};
pub use registry::{Activation, PluginDescriptor, PluginKind, Registry};
pub use targets::ProjectLayout;
