//! # posestream
//!
//! Landmark streaming server binary: loads settings, sets up logging and
//! metrics, then serves until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use posestream_core::logging::{self, LogFormat};
use posestream_core::{DetectorFactory, NullDetectorFactory};
use posestream_server::{PosestreamServer, ServerConfig};
use posestream_settings::PosestreamSettings;

/// Real-time landmark streaming server.
#[derive(Parser, Debug)]
#[command(name = "posestream", about = "Real-time landmark streaming server")]
struct Cli {
    /// Settings file (defaults to `~/.posestream/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log filter when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

fn server_config(settings: &PosestreamSettings) -> ServerConfig {
    let server = &settings.server;
    ServerConfig {
        host: server.host.clone(),
        port: server.port,
        max_sessions: server.max_sessions,
        queue_capacity: settings.processing.queue_capacity,
        outbound_buffer: server.outbound_buffer,
        heartbeat_interval_ms: server.heartbeat_interval_ms,
        heartbeat_timeout_ms: server.heartbeat_timeout_ms,
        max_message_size: server.max_message_size,
        shutdown_timeout_ms: server.shutdown_timeout_ms,
    }
}

fn detector_factory(name: &str) -> Result<Arc<dyn DetectorFactory>> {
    match name {
        "null" => Ok(Arc::new(NullDetectorFactory)),
        other => bail!("unknown detector backend '{other}' (available: null)"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut settings = match &args.config {
        Some(path) => posestream_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => posestream_settings::load_settings().context("Failed to load settings")?,
    };
    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }
    if let Some(level) = args.log_level {
        settings.logging.level = level;
    }

    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    logging::init_subscriber(&settings.logging.level, format);

    let metrics_handle = posestream_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;
    let factory = detector_factory(&settings.processing.detector)?;

    let config = server_config(&settings);
    let shutdown_timeout = config.shutdown_timeout();
    let server = PosestreamServer::new(config, factory, metrics_handle);
    let (addr, handle) = server.listen().await.context("Failed to bind listener")?;
    tracing::info!(%addr, "ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let _ = server.broadcast_shutdown_notice();
    if !server.shutdown().graceful_shutdown(shutdown_timeout).await {
        tracing::warn!("some sessions did not drain before the deadline");
    }
    let _ = handle.await;
    Ok(())
}
