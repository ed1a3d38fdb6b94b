//! # chathub
//!
//! Chat session hub binary: loads settings, opens the store, and serves the
//! WebSocket hub until Ctrl-C or SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chathub_auth::JwtVerifier;
use chathub_server::{ChatServer, ServerConfig};
use chathub_settings::HubSettings;
use chathub_store::Database;
use clap::Parser;

/// Chat session hub.
#[derive(Parser, Debug)]
#[command(name = "chathub", about = "Real-time chat session hub")]
struct Cli {
    /// Settings file (defaults to `~/.chathub/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the `SQLite` database (overrides settings).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Maximum concurrent connections (overrides settings).
    #[arg(long)]
    max_connections: Option<usize>,
}

impl Cli {
    /// Load settings from `--config` or the default path, then apply flags.
    fn settings(&self) -> Result<HubSettings> {
        let mut settings = match &self.config {
            Some(path) => chathub_settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => chathub_settings::load_settings().context("Failed to load settings")?,
        };
        self.apply(&mut settings);
        settings.validate().context("Invalid command-line override")?;
        Ok(settings)
    }

    fn apply(&self, settings: &mut HubSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(path) = &self.db_path {
            settings.database.path = Some(path.to_string_lossy().into_owned());
        }
        if let Some(max) = self.max_connections {
            settings.server.max_connections = max;
        }
    }
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                let _ = sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.settings()?;

    let _ = chathub_telemetry::init_telemetry(&settings.logging);

    let db_path = settings.database.resolved_path();
    let db = Database::open(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    let verifier =
        JwtVerifier::from_settings(&settings.auth).context("Failed to configure token verifier")?;

    let mut server = ChatServer::new(
        ServerConfig::from(&settings.server),
        Arc::new(db),
        Arc::new(verifier),
    );
    match chathub_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "metrics recorder not installed"),
    }

    let (addr, server_task) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        %addr,
        db = %db_path.display(),
        max_connections = settings.server.max_connections,
        "chathub ready"
    );

    shutdown_signal().await;
    tracing::info!("shutdown signal received");

    let drained = server
        .shutdown()
        .drain(
            server.hub().registry(),
            server_task,
            settings.server.shutdown_timeout(),
        )
        .await;
    if !drained {
        tracing::warn!("server task did not stop within the shutdown timeout");
    }
    tracing::info!("chathub stopped");
    Ok(())
}
