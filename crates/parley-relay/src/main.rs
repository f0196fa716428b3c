//! # parley-relay
//!
//! Chat relay server binary: loads settings, wires the relay together,
//! and runs it until ctrl-c.

#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parley_agents::{AgentCatalog, SimulatedBackend};
use parley_server::config::{ChatConfig, ServerConfig};
use parley_server::server::RelayServer;
use tracing_subscriber::EnvFilter;

/// Parley chat relay server.
#[derive(Parser, Debug)]
#[command(name = "parley-relay", about = "Parley chat relay server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Session idle timeout in minutes (overrides settings).
    #[arg(long)]
    session_timeout_mins: Option<u64>,

    /// Settings file to load instead of ~/.parley/settings.json.
    #[arg(long)]
    settings_path: Option<std::path::PathBuf>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing();

    // Settings file is optional; missing or unreadable falls back to
    // compiled defaults.
    let settings_path = args
        .settings_path
        .unwrap_or_else(parley_settings::settings_path);
    let mut settings = match parley_settings::load_settings_from_path(&settings_path) {
        Ok(settings) => settings,
        Err(err) => {
            tracing::warn!(path = %settings_path.display(), error = %err, "using default settings");
            parley_settings::Settings::default()
        }
    };
    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }
    if let Some(mins) = args.session_timeout_mins {
        settings.chat.session_timeout_mins = mins;
    }

    let server_config = ServerConfig::from_settings(&settings.server);
    let chat_config = ChatConfig::from_settings(&settings.chat);

    let catalog = Arc::new(AgentCatalog::builtin());
    tracing::info!(agents = catalog.list().len(), "agent catalog loaded");

    let server = RelayServer::new(
        server_config,
        chat_config,
        catalog,
        Arc::new(SimulatedBackend),
    );
    let reaper_handle = server.spawn_reaper();
    let (addr, serve_handle) = server.listen().await.context("failed to start server")?;
    tracing::info!("parley relay listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down...");
    let drained = server
        .shutdown()
        .graceful_shutdown(vec![serve_handle, reaper_handle], None)
        .await;
    // Drain detached background tasks after the listener stops; late
    // results for evicted sessions are dropped by their own re-check.
    server.pipeline().shutdown().await;

    if drained {
        tracing::info!("shutdown complete");
    } else {
        tracing::warn!("shutdown complete with undrained tasks");
    }
    Ok(())
}
