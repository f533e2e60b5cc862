//! pipewright CLI — front-end asset build orchestrator.
//!
//! Composes per-target bundle pipelines, hands them to the build engine,
//! and supervises the development server.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
