//! core::config
//!
//! Configuration schema and loading.
//!
//! # Precedence
//!
//! Values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Config file
//! 3. Environment variables
//! 4. CLI flags (applied by the caller via [`Config::override_listen`])
//!
//! # Config File Locations
//!
//! Searched in order, first hit wins:
//! 1. Explicit path (`--config`)
//! 2. `$REFGATE_CONFIG` if set
//! 3. `$XDG_CONFIG_HOME/refgate/config.toml`
//! 4. `~/.refgate/config.toml`
//!
//! A missing file is not an error (defaults are used), except when the path
//! was given explicitly.
//!
//! # Environment
//!
//! | Variable | Overrides |
//! |---|---|
//! | `REFGATE_LISTEN` | `server.listen` |
//! | `REFGATE_SECRET` | `server.secret` |
//! | `GITHUB_TOKEN` | `github.token` |
//! | `REFGATE_GITHUB_API` | `github.api_base` |
//!
//! # Example
//!
//! ```no_run
//! use refgate::core::config::Config;
//!
//! let result = Config::load(None).unwrap();
//! let config = result.config;
//! println!("listening on {}", config.listen());
//! println!("timeout: {:?}", config.call_timeout());
//! ```

pub mod schema;

pub use schema::{FileConfig, LogFormat};

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::core::types::BranchName;

/// Default bind address.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8787";

/// Default GitHub REST API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Default User-Agent for forge requests.
pub const DEFAULT_USER_AGENT: &str = "refgate";

/// Default per remote call timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default blob write fan-out.
pub const DEFAULT_BLOB_CONCURRENCY: usize = 4;

/// Default source branch for create-branch.
pub const DEFAULT_SOURCE_BRANCH: &str = "main";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

/// Warnings generated during config loading.
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub path: PathBuf,
}

/// Result of loading configuration.
#[derive(Debug)]
pub struct ConfigLoadResult {
    pub config: Config,
    pub warnings: Vec<ConfigWarning>,
}

/// Fully resolved configuration.
#[derive(Clone)]
pub struct Config {
    listen: SocketAddr,
    secret: Option<String>,
    api_base: String,
    token: Option<String>,
    user_agent: String,
    call_timeout: Duration,
    blob_concurrency: usize,
    default_source_branch: BranchName,
    log_format: LogFormat,
    log_filter: String,
    loaded_from: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default locations and the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or parsed,
    /// or if any resolved value is invalid.
    pub fn load(explicit: Option<&Path>) -> Result<ConfigLoadResult, ConfigError> {
        Self::load_with_env(explicit, |key| std::env::var(key).ok())
    }

    /// Load configuration using `env` to look up environment variables.
    ///
    /// Empty values are treated as unset.
    pub fn load_with_env<F>(explicit: Option<&Path>, env: F) -> Result<ConfigLoadResult, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.is_empty());
        let mut warnings = Vec::new();

        let (file, loaded_from) = match explicit {
            Some(path) => (Self::read_file(path)?, Some(path.to_path_buf())),
            None => match Self::locate(&env, &mut warnings) {
                Some(path) => (Self::read_file(&path)?, Some(path)),
                None => (FileConfig::default(), None),
            },
        };
        file.validate()?;

        let server = file.server.clone().unwrap_or_default();
        let github = file.github.clone().unwrap_or_default();
        let engine = file.engine.clone().unwrap_or_default();
        let log = file.log.clone().unwrap_or_default();

        let listen_raw = env("REFGATE_LISTEN")
            .or(server.listen)
            .unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let listen = listen_raw.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue(format!("invalid listen address '{listen_raw}': {e}"))
        })?;

        let default_source_branch = BranchName::new(
            engine
                .default_source_branch
                .unwrap_or_else(|| DEFAULT_SOURCE_BRANCH.to_string()),
        )
        .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let config = Config {
            listen,
            secret: env("REFGATE_SECRET").or(server.secret),
            api_base: env("REFGATE_GITHUB_API")
                .or(github.api_base)
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            token: env("GITHUB_TOKEN").or(github.token),
            user_agent: github
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            call_timeout: engine
                .call_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CALL_TIMEOUT),
            blob_concurrency: engine.blob_concurrency.unwrap_or(DEFAULT_BLOB_CONCURRENCY),
            default_source_branch,
            log_format: log
                .format
                .as_deref()
                .map(LogFormat::parse)
                .transpose()?
                .unwrap_or_default(),
            log_filter: log.filter.unwrap_or_else(|| "info".to_string()),
            loaded_from,
        };

        Ok(ConfigLoadResult { config, warnings })
    }

    fn locate(
        env: &impl Fn(&str) -> Option<String>,
        warnings: &mut Vec<ConfigWarning>,
    ) -> Option<PathBuf> {
        if let Some(path) = env("REFGATE_CONFIG").map(PathBuf::from) {
            if path.exists() {
                return Some(path);
            }
            warnings.push(ConfigWarning {
                message: "REFGATE_CONFIG points to a missing file; falling back".into(),
                path,
            });
        }

        if let Some(xdg_home) = env("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("refgate/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        dirs::home_dir()
            .map(|home| home.join(".refgate/config.toml"))
            .filter(|path| path.exists())
    }

    fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Replace the bind address (CLI `--listen`).
    pub fn override_listen(&mut self, listen: SocketAddr) {
        self.listen = listen;
    }

    /// Check that everything `serve` needs is present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` naming the first absent setting.
    pub fn require_serving(&self) -> Result<(), ConfigError> {
        if self.secret.is_none() {
            return Err(ConfigError::Missing("server.secret (or REFGATE_SECRET)"));
        }
        if self.token.is_none() {
            return Err(ConfigError::Missing("github.token (or GITHUB_TOKEN)"));
        }
        Ok(())
    }

    /// Render the effective configuration as TOML with credentials redacted.
    pub fn to_redacted_toml(&self) -> String {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>".to_string());
        let view = FileConfig {
            server: Some(schema::ServerSection {
                listen: Some(self.listen.to_string()),
                secret: redact(&self.secret),
            }),
            github: Some(schema::GitHubSection {
                api_base: Some(self.api_base.clone()),
                token: redact(&self.token),
                user_agent: Some(self.user_agent.clone()),
            }),
            engine: Some(schema::EngineSection {
                call_timeout_secs: Some(self.call_timeout.as_secs()),
                blob_concurrency: Some(self.blob_concurrency),
                default_source_branch: Some(self.default_source_branch.to_string()),
            }),
            log: Some(schema::LogSection {
                format: Some(self.log_format.as_str().to_string()),
                filter: Some(self.log_filter.clone()),
            }),
        };
        toml::to_string_pretty(&view).unwrap_or_default()
    }

    pub fn listen(&self) -> SocketAddr {
        self.listen
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub fn blob_concurrency(&self) -> usize {
        self.blob_concurrency
    }

    pub fn default_source_branch(&self) -> &BranchName {
        &self.default_source_branch
    }

    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Path of the file the configuration was read from, if any.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.loaded_from.as_deref()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("listen", &self.listen)
            .field("has_secret", &self.secret.is_some())
            .field("api_base", &self.api_base)
            .field("has_token", &self.token.is_some())
            .field("call_timeout", &self.call_timeout)
            .field("blob_concurrency", &self.blob_concurrency)
            .field("default_source_branch", &self.default_source_branch)
            .field("log_format", &self.log_format)
            .field("loaded_from", &self.loaded_from)
            .finish()
    }
}
