//! serve command - Run the HTTP gateway

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::cli::init_logging;
use crate::core::config::Config;
use crate::engine::{Engine, EngineOptions};
use crate::forge::github::{GitHubOptions, GitHubStore};
use crate::server::{self, AppState};

/// Load configuration, then serve until Ctrl-C.
pub fn serve(explicit: Option<&Path>, listen: Option<SocketAddr>) -> Result<()> {
    let loaded = Config::load(explicit).context("Failed to load configuration")?;
    let mut config = loaded.config;
    if let Some(listen) = listen {
        config.override_listen(listen);
    }

    init_logging(config.log_format(), config.log_filter())?;
    for warning in &loaded.warnings {
        warn!(path = %warning.path.display(), "{}", warning.message);
    }
    config.require_serving()?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let token = config
        .token()
        .ok_or_else(|| anyhow!("github.token is not configured"))?;
    let secret = config
        .secret()
        .ok_or_else(|| anyhow!("server.secret is not configured"))?;

    let store = GitHubStore::new(
        token,
        GitHubOptions {
            api_base: config.api_base().to_string(),
            user_agent: config.user_agent().to_string(),
            timeout: config.call_timeout(),
        },
    )
    .context("Failed to create GitHub client")?;

    let engine = Engine::new(Arc::new(store), EngineOptions::from_config(&config));
    info!(
        store = engine.store_name(),
        api_base = config.api_base(),
        call_timeout = ?config.call_timeout(),
        blob_concurrency = config.blob_concurrency(),
        "engine ready"
    );

    let listener = TcpListener::bind(config.listen())
        .await
        .with_context(|| format!("Failed to bind {}", config.listen()))?;
    let app = server::router(AppState::new(engine, secret));

    server::serve(listener, app, shutdown_signal())
        .await
        .context("Gateway terminated with an error")?;
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => warn!(error = %e, "failed to listen for Ctrl-C, shutting down"),
    }
}
