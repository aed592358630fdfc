//! Trip server - segments location history into trips over HTTP
//!
//! Module structure:
//! - `domain/` - Trajectory model (Event, Path, geodesy)
//! - `services/` - Segmentation and the trip pipeline
//! - `io/` - Ingestion adapters, JSON output, HTTP server
//! - `infra/` - Infrastructure (Config, Metrics, logging)

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use trip_server::infra::{logging, Config, Metrics};
use trip_server::io::{start_server, AppState};
use trip_server::services::{TripService, TripSettings};

/// Trip server - segments location history into trips
#[derive(Parser, Debug)]
#[command(name = "trip-server", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the listen port from the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the static web root from the config file
    #[arg(long)]
    web_root: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref());
    if let Some(port) = args.port {
        config = config.with_port(port);
    }
    if args.web_root.is_some() {
        config = config.with_web_root(args.web_root);
    }

    // Default: INFO, use RUST_LOG=debug for per-segment summaries
    logging::init(config.log_format());

    info!(
        config_file = %config.config_file(),
        bind_address = %config.bind_address(),
        port = %config.port(),
        web_root = ?config.web_root(),
        near_threshold_km = %config.near_threshold_km(),
        bucket_secs = %config.bucket_secs(),
        min_trip_distance_km = %config.min_trip_distance_km(),
        interpolate_secs = ?config.interpolate_secs(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let service = TripService::new(TripSettings::from(&config), Some(metrics.clone()));
    let state = Arc::new(AppState::new(service, metrics, config.web_root().map(PathBuf::from)));

    start_server(&config, state, shutdown_rx).await?;

    info!("trip-server shutdown complete");
    Ok(())
}
