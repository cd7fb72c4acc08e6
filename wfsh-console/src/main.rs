//! Flowsheet Console (wfsh-console) - Main entry point
//!
//! Holds the live flowsheet in memory, reconciles DJ intents against the
//! backend, and serves renderers over REST and SSE.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wfsh_common::events::EventBus;
use wfsh_console::api::{create_router, AppState};
use wfsh_console::backend::{FlowsheetApi, HttpFlowsheetApi, HttpShowControl, LiveChannel};
use wfsh_console::config::{Config, ConfigOverrides};
use wfsh_console::flowsheet::FlowsheetEngine;
use wfsh_console::sse::SseBroadcaster;

/// Command-line arguments for wfsh-console
#[derive(Parser, Debug)]
#[command(name = "wfsh-console")]
#[command(about = "Flowsheet console service for WFSH")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "WFSH_CONSOLE_PORT")]
    port: Option<u16>,

    /// Base URL of the backend flowsheet API
    #[arg(short, long, env = "WFSH_BACKEND_URL")]
    backend_url: Option<String>,

    /// Base URL of the show-control service (defaults to the backend URL)
    #[arg(long, env = "WFSH_SHOW_CONTROL_URL")]
    show_control_url: Option<String>,

    /// Entries per history page fetch
    #[arg(long)]
    page_limit: Option<u32>,

    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Resolve configuration before tracing so the configured level can act
    // as the fallback filter.
    let config_path = wfsh_common::config::resolve_config_path(
        args.config.as_deref(),
        "WFSH_CONSOLE_CONFIG",
        "console",
    )
    .context("Failed to resolve configuration file")?;

    let overrides = ConfigOverrides {
        port: args.port,
        backend_url: args.backend_url,
        show_control_url: args.show_control_url,
        page_limit: args.page_limit,
    };
    let config = Config::load(config_path.as_deref(), overrides)
        .context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("wfsh_console={},tower_http=debug", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting WFSH Flowsheet Console v{} on port {}",
        env!("CARGO_PKG_VERSION"),
        config.port
    );
    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: built-in defaults"),
    }
    info!("Backend: {}", config.backend_url);

    // Wire up the engine and its collaborators
    let event_bus = Arc::new(EventBus::new(config.event_capacity));

    let flowsheet_api: Arc<dyn FlowsheetApi> = Arc::new(
        HttpFlowsheetApi::new(&config.backend_url, config.request_timeout())
            .context("Failed to build backend client")?,
    );
    let show_control = Arc::new(
        HttpShowControl::new(&config.show_control_url, config.request_timeout())
            .context("Failed to build show-control client")?,
    );

    let engine = Arc::new(FlowsheetEngine::new(
        &config,
        flowsheet_api,
        event_bus.clone(),
    ));

    // Live update channel runs for the lifetime of the process; it performs
    // the initial resync once the subscription is up.
    let live_channel = LiveChannel::new(
        &config.backend_url,
        engine.clone(),
        config.reconnect_initial_delay(),
        config.reconnect_max_delay(),
    )
    .context("Failed to build live channel client")?;
    tokio::spawn(live_channel.run());

    let app_state = AppState {
        engine: engine.clone(),
        broadcaster: SseBroadcaster::new(event_bus, engine),
        show_control,
        port: config.port,
    };

    let app = create_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
    }
}
