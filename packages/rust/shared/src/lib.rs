//! Shared types, error model, and configuration for pipewright.
//!
//! This crate is the foundation depended on by all other pipewright crates.
//! It provides:
//! - [`PipewrightError`] — the unified error type
//! - Domain types ([`Mode`], [`BuildTarget`])
//! - Configuration ([`AppConfig`], config loading and saving)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CONFIG_FILE_NAME, DevServerConfig, EngineConfig, LiveReloadConfig, ProjectConfig,
    StylingConfig, WatchConfig, init_config, load_config_from, project_root, save_config,
};
pub use error::{PipewrightError, Result};
pub use types::{BUNDLE_EXT, BuildTarget, ENTRY_FILE, MODE_ENV_VAR, Mode};
