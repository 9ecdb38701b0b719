//! placemap-mapd - Map layer daemon
//!
//! Hosts one map session against the places backend and serves it to a
//! map front-end over HTTP and Server-Sent Events.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use placemap_common::config::{load_config, resolve_config_path, write_toml_config, TomlConfig};
use placemap_common::events::EventBus;
use placemap_layers::{HttpPlaceApi, MapSession};
use placemap_mapd::{build_router, AppState};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for placemap-mapd
#[derive(Parser, Debug)]
#[command(name = "placemap-mapd")]
#[command(about = "Map layer daemon for placemap front-ends")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "PLACEMAP_PORT")]
    port: Option<u16>,

    /// Config file path (overrides PLACEMAP_CONFIG and the default location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write a default config file to PATH and exit
    #[arg(long, value_name = "PATH")]
    write_default_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(path) = &args.write_default_config {
        write_toml_config(&TomlConfig::default(), path)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let config = load_config(args.config.as_deref());

    let (level, log_file) = match &config {
        Ok(config) => (config.logging.level.clone(), config.logging.file.clone()),
        Err(_) => ("info".to_string(), None),
    };
    init_tracing(&level, log_file.as_deref())?;

    // Build identification first, before anything that can stall
    info!(
        "Starting placemap-mapd v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match resolve_config_path(args.config.as_deref()) {
        Some(path) if path.exists() => info!("Config file: {}", path.display()),
        Some(path) => warn!("Config file {} not found, using defaults", path.display()),
        None => warn!("No config directory available, using defaults"),
    }

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e).context("Failed to load configuration");
        }
    };

    info!("Places backend: {}", config.api_base_url);
    if config.api_token.is_none() {
        warn!("No API token configured; backend requests are unauthenticated");
    }

    let api = HttpPlaceApi::from_config(&config).context("Failed to create places backend client")?;

    let shutdown = CancellationToken::new();
    let event_bus = EventBus::new(config.loader.event_capacity);
    let session = Arc::new(MapSession::start(
        Arc::new(api),
        &config.loader,
        event_bus,
        shutdown.clone(),
    ));

    let app = build_router(AppState::new(session));

    let port = args.port.unwrap_or(config.port);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("placemap-mapd listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("Server error")?;

    shutdown.cancel();
    info!("Server shutdown complete");
    Ok(())
}

/// Console output plus an optional plain-text log file
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_tracing(level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "placemap_mapd={level},placemap_layers={level},placemap_common={level},tower_http=info"
        ))
    });

    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(())
}

/// Resolves on Ctrl+C, SIGTERM, or cancellation of `shutdown`
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
        _ = shutdown.cancelled() => {
            info!("Shutdown requested");
        },
    }
}
