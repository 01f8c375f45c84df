//! obdd - OBD Telemetry Gateway Daemon
//!
//! Runs the diagnostic protocol engine against a CAN bus (or the mock ECU)
//! and serves telemetry snapshots over HTTP and WebSocket.
//!
//! Usage:
//!   obdd [OPTIONS] [config.toml]
//!
//! If no config file is provided, the mock transport is used for demo purposes.

mod config;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use obd_api::{create_router, AppState};
use obd_can::DiagnosticEngine;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::GatewayConfig;

const DEFAULT_LOG_FILTER: &str = "obdd=info,obd_api=info,obd_can=info,obd_core=info";

#[derive(Parser, Debug)]
#[command(name = "obdd")]
#[command(version, about = "OBD-II telemetry gateway daemon")]
struct Args {
    /// Gateway config file (TOML)
    config: Option<PathBuf>,

    /// Override the HTTP listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Emit logs as JSON lines
    #[arg(long, env = "OBDD_LOG_JSON")]
    log_json: bool,
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    tracing::info!("Starting obdd (OBD telemetry gateway)");

    let mut config = match &args.config {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading config");
            GatewayConfig::load(path)?
        }
        None => {
            tracing::info!("No config file provided, using mock transport");
            GatewayConfig::default()
        }
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let engine = DiagnosticEngine::from_config(config.engine)
        .await
        .context("Invalid engine configuration")?;

    let cancel = CancellationToken::new();
    let handle = engine.spawn(cancel.clone());

    let app = create_router(AppState::new(handle.broadcaster(), cancel.clone()));

    let addr = config.server.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on http://{}", addr);

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutdown signal received");
        shutdown.cancel();
    });

    let server_cancel = cancel.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_cancel.cancelled().await })
        .await;

    // A server error still has to release the bus
    cancel.cancel();
    handle.shutdown().await;

    served.context("HTTP server failed")?;
    tracing::info!("obdd stopped");
    Ok(())
}

/// Resolve on SIGINT, or SIGTERM where available
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
