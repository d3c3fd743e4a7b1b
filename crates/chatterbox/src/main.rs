//! # chatterbox
//!
//! Chatterbox server binary: loads settings, picks a bus backend, and starts
//! the HTTP/WebSocket server.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chatterbox_bus::{BusConnector, MemoryConnector, RedisConnector};
use chatterbox_server::bridge::BroadcastBridge;
use chatterbox_server::config::{BridgeConfig, ServerConfig};
use chatterbox_server::room::RoomRegistry;
use chatterbox_server::server::ChatServer;
use chatterbox_settings::{BusBackend, ChatterboxSettings};
use clap::Parser;

/// How long to wait for the HTTP server to drain on shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Chatterbox chat server.
#[derive(Parser, Debug)]
#[command(name = "chatterbox", about = "Chatterbox real-time chat server")]
struct Cli {
    /// Settings file (defaults to `~/.chatterbox/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Bus backend: `redis` or `memory` (overrides settings).
    #[arg(long, value_parser = parse_backend)]
    bus: Option<BusBackend>,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    fn apply(&self, settings: &mut ChatterboxSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(backend) = self.bus {
            settings.bus.backend = backend;
        }
    }
}

fn parse_backend(val: &str) -> Result<BusBackend, String> {
    BusBackend::parse(val).ok_or_else(|| format!("unknown bus backend '{val}' (expected redis or memory)"))
}

fn load_settings(cli: &Cli) -> Result<ChatterboxSettings> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(chatterbox_settings::settings_path);
    let mut settings = chatterbox_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    Ok(settings)
}

fn connector_for(settings: &ChatterboxSettings) -> Arc<dyn BusConnector> {
    match settings.bus.backend {
        BusBackend::Redis => Arc::new(RedisConnector::new(settings.bus.url.clone())),
        BusBackend::Memory => Arc::new(MemoryConnector::default()),
    }
}

fn build_server(settings: &ChatterboxSettings, connector: Arc<dyn BusConnector>) -> ChatServer {
    let bridge = Arc::new(BroadcastBridge::new(
        connector,
        Arc::new(RoomRegistry::new()),
        BridgeConfig::from(&settings.bus),
    ));
    ChatServer::new(ServerConfig::from(&settings.server), bridge)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    if settings.logging.json {
        chatterbox_core::logging::init_json_subscriber(&settings.logging.level);
    } else {
        chatterbox_core::logging::init_subscriber(&settings.logging.level);
    }

    let mut server = build_server(&settings, connector_for(&settings));
    match chatterbox_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "metrics recorder unavailable"),
    }

    let addr = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        backend = ?settings.bus.backend,
        prefix = %settings.bus.channel_prefix,
        "Chatterbox listening on http://{addr}"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let report = server.shutdown().shutdown(SHUTDOWN_TIMEOUT).await;

    tracing::info!(tasks = report.tasks, drained = report.drained, "Shutdown complete");
    Ok(())
}
