//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! Each handler loads what it needs, does its work, and reports errors as
//! `anyhow` values for `main` to print.

mod completion;
mod config_cmd;
mod serve;

use std::path::Path;

use anyhow::Result;

use super::args::Command;

/// Dispatch a parsed command to its handler.
pub fn dispatch(command: Command, config: Option<&Path>) -> Result<()> {
    match command {
        Command::Serve { listen } => serve::serve(config, listen),
        Command::Config => config_cmd::show(config),
        Command::Completion { shell } => completion::completion(shell),
    }
}
