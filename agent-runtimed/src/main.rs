//! `agent-runtimed` — the HTTP surface binary for the agent runtime, per
//! spec §6.
//!
//! Loads [`RuntimeConfig`](config::RuntimeConfig), wires the full
//! dependency graph via [`state::AppState::build`], spawns the idle
//! session reaper, and serves the `axum::Router` assembled in
//! [`routes::router`] until `SIGINT`/`SIGTERM`.

mod auth;
mod config;
mod error;
mod routes;
mod state;

use clap::Parser;
use config::RuntimeConfig;
use state::AppState;
use std::path::PathBuf;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;

/// `agent-runtimed`: the agent runtime's HTTP surface.
#[derive(Debug, Parser)]
#[command(name = "agent-runtimed", version, about)]
struct Cli {
    /// Path to a TOML config file. Falls back to spec-documented defaults
    /// if the file doesn't exist.
    #[arg(long, env = "AGENT_RUNTIMED_CONFIG", default_value = "agent-runtimed.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = RuntimeConfig::load(&cli.config)?;

    if config.require_auth && config.shared_secret.is_none() {
        anyhow::bail!("require_auth is set but no shared_secret is configured");
    }

    let bind_addr = config.bind_addr.clone();
    let state = AppState::build(config);
    state.spawn_reaper();

    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "agent-runtimed listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, draining in-flight requests");
}
