//! # troop-gateway
//!
//! Relay server binary: loads settings, seeds the org store, installs
//! logging and metrics, and serves `/ws` until ctrl-c.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use troop_relay::{RelayServer, ServerConfig};
use troop_settings::TroopSettings;
use troop_store::MemoryStore;

/// Troop portal relay server.
#[derive(Parser, Debug)]
#[command(name = "troop-gateway", about = "Troop portal presence and event relay")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.troop/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// JSON seed with users, groups, scouts and events.
    #[arg(long)]
    seed: Option<PathBuf>,
}

impl Cli {
    /// Settings from the chosen file with flag overrides on top.
    fn resolve_settings(&self) -> Result<TroopSettings> {
        let path = self
            .settings
            .clone()
            .unwrap_or_else(troop_settings::settings_path);
        let mut settings = troop_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        Ok(settings)
    }
}

fn open_store(seed: Option<&Path>) -> Result<MemoryStore> {
    match seed {
        Some(path) => MemoryStore::from_seed_file(path)
            .with_context(|| format!("Failed to load seed from {}", path.display())),
        None => Ok(MemoryStore::new()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings = args.resolve_settings()?;
    troop_logging::init_subscriber(&settings.logging).context("Failed to initialize logging")?;

    let store = Arc::new(open_store(args.seed.as_deref())?);
    if args.seed.is_none() {
        tracing::warn!("no seed given, every authenticate will fail with unknown user");
    }

    let config = ServerConfig::from_settings(&settings);
    let shutdown_timeout = config.shutdown_timeout();
    let mut server = RelayServer::new(config, store);
    match troop_relay::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(err) => tracing::warn!(error = %err, "metrics disabled"),
    }

    let (addr, handle) = server.listen().await.context("Failed to bind listener")?;
    tracing::info!("Troop relay listening on ws://{addr}/ws");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!(
        sessions = server.shutdown().active_sessions(),
        "Shutting down..."
    );
    if !server.shutdown().graceful_shutdown(shutdown_timeout).await {
        tracing::warn!(
            remaining = server.shutdown().active_sessions(),
            "sessions still open after shutdown timeout"
        );
    }
    let _ = handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
