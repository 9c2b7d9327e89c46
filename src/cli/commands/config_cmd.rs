//! config command - Print the effective configuration

use std::path::Path;

use anyhow::{Context, Result};

use crate::core::config::Config;

/// Print the resolved configuration as TOML, with secrets redacted.
///
/// Load warnings go to stderr so stdout stays valid TOML.
pub fn show(explicit: Option<&Path>) -> Result<()> {
    let loaded = Config::load(explicit).context("Failed to load configuration")?;

    for warning in &loaded.warnings {
        eprintln!("warning: {} ({})", warning.message, warning.path.display());
    }
    match loaded.config.loaded_from() {
        Some(path) => println!("# loaded from {}", path.display()),
        None => println!("# no config file found, showing defaults"),
    }
    print!("{}", loaded.config.to_redacted_toml());
    Ok(())
}
