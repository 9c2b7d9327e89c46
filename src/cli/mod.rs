//! cli
//!
//! Command-line interface layer for refgate.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install the tracing subscriber
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. It resolves configuration, wires the GitHub store
//! into the [`crate::engine::Engine`] and hands the engine to the
//! [`crate::server`] router.

pub mod args;
pub mod commands;

pub use args::{Cli, Shell};

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

use crate::core::config::LogFormat;

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    commands::dispatch(cli.command, cli.config.as_deref())
}

/// Install the global tracing subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence over `default_filter`.
///
/// # Errors
///
/// Fails if `default_filter` is not a valid directive or a subscriber is
/// already installed.
pub fn init_logging(format: LogFormat, default_filter: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .map_err(|e| anyhow!("invalid log filter '{default_filter}': {e}"))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| anyhow!("failed to initialize logging: {e}"))
}
