//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--config <path>`: Read configuration from this file

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

/// refgate - Authenticated gateway for atomic commits to GitHub branches
#[derive(Parser, Debug)]
#[command(name = "refgate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (default: $REFGATE_CONFIG, then the XDG and home locations)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP gateway
    #[command(
        name = "serve",
        long_about = "Run the HTTP gateway.\n\n\
            Serves health, create-branch, upsert-file and bulk-upsert. Every route \
            except health requires the shared secret in X-Api-Key or as a bearer \
            token. Stops gracefully on Ctrl-C.",
        after_help = "\
EXAMPLES:
    # Serve with secrets from the environment
    REFGATE_SECRET=change-me GITHUB_TOKEN=ghp_xxx refgate serve

    # Bind a different address
    refgate serve --listen 0.0.0.0:9000

    # Use a specific config file
    refgate --config ./refgate.toml serve"
    )]
    Serve {
        /// Address to bind, overriding config and REFGATE_LISTEN
        #[arg(long, value_name = "ADDR")]
        listen: Option<SocketAddr>,
    },

    /// Print the effective configuration with secrets redacted
    #[command(name = "config")]
    Config,

    /// Generate shell completion scripts
    #[command(
        name = "completion",
        long_about = "Generate shell completion scripts for tab-completion.\n\n\
            Outputs a completion script for the specified shell.",
        after_help = "\
EXAMPLES:
    # Bash
    refgate completion bash >> ~/.bashrc

    # Zsh
    refgate completion zsh >> ~/.zshrc

    # Fish
    refgate completion fish > ~/.config/fish/completions/refgate.fish"
    )]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completion
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_parses_listen() {
        let cli = Cli::try_parse_from(["refgate", "serve", "--listen", "0.0.0.0:9000"]).unwrap();
        match cli.command {
            Command::Serve { listen } => assert_eq!(listen.unwrap().port(), 9000),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["refgate", "config", "--config", "/tmp/x.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/x.toml")));
        assert!(matches!(cli.command, Command::Config));
    }

    #[test]
    fn bad_listen_is_rejected() {
        assert!(Cli::try_parse_from(["refgate", "serve", "--listen", "nowhere"]).is_err());
    }
}
