//! vigild — the Vigil monitoring daemon.
//!
//! Single binary that assembles the monitoring stack:
//! - Counter store (memory, redb or Redis)
//! - Metric and event recorders, alert engine, aggregate reader
//! - Expired-entry sweeper
//! - HTTP API + Prometheus exposition
//!
//! # Usage
//!
//! ```text
//! vigild serve --config /etc/vigil/vigil.toml --port 9464
//! vigild check-config --config /etc/vigil/vigil.toml
//! ```

mod store;
mod sweeper;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use vigil_core::{Clock, SystemClock, VigilConfig};
use vigil_monitor::{Monitor, TracingAuditTrail};

#[derive(Parser)]
#[command(name = "vigild", about = "Vigil monitoring and alerting daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the monitoring API.
    Serve {
        /// Path to the TOML configuration file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override `server.port`.
        #[arg(long)]
        port: Option<u16>,

        /// Emit logs as JSON lines.
        #[arg(long)]
        log_json: bool,
    },
    /// Parse and validate a configuration file, then exit.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,vigild=debug,vigil=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            port,
            log_json,
        } => {
            init_tracing(log_json);
            let mut config = load_config(config.as_deref())?;
            if let Some(port) = port {
                config.server.port = port;
            }
            run_serve(config).await
        }
        Command::CheckConfig { config } => {
            init_tracing(false);
            let parsed = VigilConfig::from_file(&config)
                .with_context(|| format!("invalid config {}", config.display()))?;
            println!("{}", parsed.to_toml_string()?);
            info!(path = %config.display(), rules = parsed.alerts.rules.len(), "config ok");
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<VigilConfig> {
    match path {
        Some(path) => VigilConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => {
            info!("no config file given, using defaults");
            Ok(VigilConfig::default())
        }
    }
}

async fn run_serve(config: VigilConfig) -> anyhow::Result<()> {
    info!("Vigil daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let store = store::open_store(&config.store, clock.clone()).await?;
    info!(backend = ?config.store.backend, "counter store opened");

    let monitor = Arc::new(Monitor::new(
        &config,
        store,
        Arc::new(TracingAuditTrail),
        clock,
    ));

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let sweep_interval = Duration::from_secs(config.store.sweep_interval_secs);
    let sweeper_monitor = monitor.clone();
    let sweeper_handle = tokio::spawn(async move {
        sweeper::run(sweeper_monitor, sweep_interval, shutdown_rx).await;
    });

    // ── Start API server ───────────────────────────────────────

    let router = vigil_api::build_router(monitor);
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}", config.server.host))?;

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    let _ = sweeper_handle.await;

    info!("Vigil daemon stopped");
    Ok(())
}
