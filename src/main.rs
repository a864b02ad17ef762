//! Pingscope Binary Entry Point
//!
//! Runs the exporter: probe the configured targets and serve their
//! statistics to Prometheus. Core functionality is provided by the
//! `pingscope` library crate.

use clap::Parser;
use pingscope::{
    config::AppConfig,
    exporter::PingExporter,
    monitor::{Monitor, ProbeEngine},
    server::{self, AppState, create_router},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Pingscope - ICMP latency exporter for Prometheus
#[derive(Parser, Debug)]
#[command(name = "pingscope", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "PINGSCOPE_CONFIG"
    )]
    config: String,

    /// Listen address for the metrics endpoint (overrides config file)
    #[arg(long, env = "PINGSCOPE_WEB_ADDRESS")]
    web_address: Option<String>,

    /// Path under which to expose metrics (overrides config file)
    #[arg(long, env = "PINGSCOPE_METRICS_PATH")]
    metrics_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pingscope=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Pingscope - ICMP latency exporter");

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration from file
    tracing::info!("Loading configuration from: {}", cli.config);
    let mut config = AppConfig::load(&cli.config)?;

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(address) = cli.web_address {
        config.web.address = address;
    }
    if let Some(path) = cli.metrics_path {
        config.web.metrics_path = path;
    }
    config.validate()?;

    tracing::info!(
        "Targets: {}, interval: {}, timeout: {}, history: {}, DNS refresh: {}",
        config.targets.len(),
        humantime::format_duration(config.ping.interval),
        humantime::format_duration(config.ping.timeout),
        config.ping.history_size,
        humantime::format_duration(config.dns.refresh),
    );

    // Start probing
    let started = pingscope::bootstrap(&config).await?;
    let monitor = started.monitor;
    tracing::info!("Monitoring {} addresses", monitor.target_count());

    let engine: Arc<dyn ProbeEngine> = monitor.clone();
    let refresh = pingscope::spawn_dns_refresh(
        engine.clone(),
        started.resolver,
        config.targets.clone(),
        config.dns.refresh,
        monitor.shutdown_token(),
    );
    if refresh.is_none() {
        tracing::info!("DNS refresh disabled");
    }

    // Register the collector
    let registry = prometheus::Registry::new();
    registry.register(Box::new(PingExporter::new(engine, &config)?))?;

    // Build Axum router
    let app = create_router(AppState { registry }, &config.web.metrics_path);

    let listener = server::bind(&config.web).await?;

    tracing::info!(
        "Metrics available at: http://{}{}",
        listener.local_addr()?,
        config.web.metrics_path
    );
    tracing::info!("Press Ctrl+C to shutdown");

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(monitor.clone(), shutdown.clone()));

    server::serve(listener, app, shutdown).await?;

    if let Some(handle) = refresh {
        if let Err(e) = handle.await {
            tracing::warn!("DNS refresh task ended abnormally: {}", e);
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal, then stop probing and the web server.
async fn shutdown_signal(monitor: Arc<Monitor>, shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }

    tracing::info!("Stopping monitor...");
    monitor.stop();
    shutdown.cancel();
}
