//! core::config::schema
//!
//! On-disk configuration schema.
//!
//! Every field is optional so a partial file can be layered over defaults.
//! Unknown keys are rejected so typos surface at startup rather than as
//! silently ignored settings.
//!
//! # Example
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8787"
//! secret = "change-me"
//!
//! [github]
//! api_base = "https://github.example.com/api/v3"
//! token = "ghp_xxx"
//!
//! [engine]
//! call_timeout_secs = 20
//! blob_concurrency = 8
//! default_source_branch = "main"
//!
//! [log]
//! format = "json"
//! filter = "refgate=debug,info"
//! ```

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::BranchName;

/// Largest accepted `engine.blob_concurrency`.
pub const MAX_BLOB_CONCURRENCY: usize = 64;

/// Root of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: Option<ServerSection>,
    pub github: Option<GitHubSection>,
    pub engine: Option<EngineSection>,
    pub log: Option<LogSection>,
}

impl FileConfig {
    /// Validate the values present in the file.
    ///
    /// Required-ness (e.g. a secret for `serve`) is checked later, after
    /// environment and CLI overrides have been applied.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(server) = &self.server {
            server.validate()?;
        }
        if let Some(engine) = &self.engine {
            engine.validate()?;
        }
        if let Some(log) = &self.log {
            log.validate()?;
        }
        Ok(())
    }
}

/// `[server]` section.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    /// Socket address to bind.
    pub listen: Option<String>,
    /// Shared secret callers must present.
    pub secret: Option<String>,
}

impl ServerSection {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(listen) = &self.listen {
            listen.parse::<std::net::SocketAddr>().map_err(|e| {
                ConfigError::InvalidValue(format!("invalid server.listen '{listen}': {e}"))
            })?;
        }
        if matches!(self.secret.as_deref(), Some("")) {
            return Err(ConfigError::InvalidValue(
                "server.secret cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ServerSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSection")
            .field("listen", &self.listen)
            .field("has_secret", &self.secret.is_some())
            .finish()
    }
}

/// `[github]` section.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GitHubSection {
    /// REST API base URL (GitHub Enterprise: `https://host/api/v3`).
    pub api_base: Option<String>,
    /// Token used for every forge call.
    pub token: Option<String>,
    /// User-Agent header value.
    pub user_agent: Option<String>,
}

impl std::fmt::Debug for GitHubSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubSection")
            .field("api_base", &self.api_base)
            .field("has_token", &self.token.is_some())
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// `[engine]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSection {
    /// Per remote call timeout, in seconds.
    pub call_timeout_secs: Option<u64>,
    /// Maximum in-flight blob writes per bulk commit.
    pub blob_concurrency: Option<usize>,
    /// Source branch for create-branch when the caller omits `from`.
    pub default_source_branch: Option<String>,
}

impl EngineSection {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.call_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue(
                "engine.call_timeout_secs must be greater than zero".into(),
            ));
        }
        if let Some(n) = self.blob_concurrency {
            if n == 0 || n > MAX_BLOB_CONCURRENCY {
                return Err(ConfigError::InvalidValue(format!(
                    "engine.blob_concurrency must be between 1 and {MAX_BLOB_CONCURRENCY}, got {n}"
                )));
            }
        }
        if let Some(branch) = &self.default_source_branch {
            BranchName::new(branch).map_err(|e| {
                ConfigError::InvalidValue(format!("invalid engine.default_source_branch: {e}"))
            })?;
        }
        Ok(())
    }
}

/// `[log]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    /// `text` or `json`.
    pub format: Option<String>,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: Option<String>,
}

impl LogSection {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(format) = &self.format {
            LogFormat::parse(format)?;
        }
        Ok(())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Parse a `log.format` value.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for anything but `text` or `json`.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::InvalidValue(format!(
                "invalid log.format '{other}', must be one of: text, json"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        }
    }
}
