//! Trip Segment - offline trip segmentation of a location history file
//!
//! Runs the same pipeline as the trip server on a file from disk and prints
//! the trips JSON to stdout.
//!
//! Usage:
//!   trip-segment history.json
//!   trip-segment track.kml --interpolate 30 --pretty
//!   trip-segment history.json --config config/dev.toml --min-distance-km 0.5

use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::Path;
use tracing::info;

use trip_server::infra::{logging, Config};
use trip_server::io::{parse_feed, parse_kml, TripsResponse};
use trip_server::services::{TripService, TripSettings};

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum InputFormat {
    /// Google Latitude style JSON feed
    Json,
    /// KML gx:Track
    Kml,
}

/// Trip Segment - split a location history file into trips
#[derive(Parser, Debug)]
#[command(name = "trip-segment", version, about, long_about = None)]
struct Args {
    /// Location history file
    input: String,

    /// Input format (guessed from the file extension when omitted)
    #[arg(short, long, value_enum)]
    format: Option<InputFormat>,

    /// Optional TOML config supplying segmentation thresholds
    #[arg(short, long)]
    config: Option<String>,

    /// Resample the path at this interval (seconds) before segmenting
    #[arg(short, long)]
    interpolate: Option<f64>,

    /// Drop trips whose start-to-end displacement is not above this (km)
    #[arg(short, long)]
    min_distance_km: Option<f64>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

fn guess_format(path: &Path) -> InputFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("kml") => InputFormat::Kml,
        _ => InputFormat::Json,
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if args.interpolate.is_some() {
        config = config.with_interpolate_secs(args.interpolate);
    }
    if let Some(km) = args.min_distance_km {
        config = config.with_min_trip_distance_km(km);
    }

    logging::init(config.log_format());

    let input = Path::new(&args.input);
    let format = args.format.unwrap_or_else(|| guess_format(input));
    let bytes = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;

    let path = match format {
        InputFormat::Json => parse_feed(&bytes),
        InputFormat::Kml => parse_kml(&bytes),
    }
    .with_context(|| format!("Failed to parse {}", input.display()))?;

    info!(input = %input.display(), format = ?format, events = %path.len(), "path_loaded");

    let service = TripService::new(TripSettings::from(&config), None);
    let trips = service.segment(path).context("Segmentation failed")?;

    let response = TripsResponse::from_paths(&trips);
    let json = if args.pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{json}");

    Ok(())
}
