//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::services::segmentation::{
    SegmentationConfig, DEFAULT_BUCKET_SECS, DEFAULT_NEAR_THRESHOLD_KM,
};
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Environment variable consulted when no `--config` is given
pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";
pub const DEFAULT_CONFIG_PATH: &str = "config/dev.toml";

/// Minimum start-to-end displacement for a segment to be reported (km)
pub const DEFAULT_MIN_TRIP_DISTANCE_KM: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory served for GET requests outside the API routes
    #[serde(default)]
    pub web_root: Option<String>,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    12357
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: default_bind_address(), port: default_port(), web_root: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SegmentationToml {
    #[serde(default = "default_near_threshold_km")]
    pub near_threshold_km: f64,
    #[serde(default = "default_bucket_secs")]
    pub bucket_secs: f64,
    #[serde(default = "default_min_trip_distance_km")]
    pub min_trip_distance_km: f64,
    /// Resample input at this interval before segmenting (disabled if unset)
    #[serde(default)]
    pub interpolate_secs: Option<f64>,
}

fn default_near_threshold_km() -> f64 {
    DEFAULT_NEAR_THRESHOLD_KM
}

fn default_bucket_secs() -> f64 {
    DEFAULT_BUCKET_SECS
}

fn default_min_trip_distance_km() -> f64 {
    DEFAULT_MIN_TRIP_DISTANCE_KM
}

impl Default for SegmentationToml {
    fn default() -> Self {
        Self {
            near_threshold_km: default_near_threshold_km(),
            bucket_secs: default_bucket_secs(),
            min_trip_distance_km: default_min_trip_distance_km(),
            interpolate_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    60
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { format: default_log_format() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub segmentation: SegmentationToml,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    bind_address: String,
    port: u16,
    web_root: Option<String>,
    near_threshold_km: f64,
    bucket_secs: f64,
    min_trip_distance_km: f64,
    interpolate_secs: Option<f64>,
    metrics_interval_secs: u64,
    log_format: LogFormat,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            bind_address: toml_config.server.bind_address,
            port: toml_config.server.port,
            web_root: toml_config.server.web_root,
            near_threshold_km: toml_config.segmentation.near_threshold_km,
            bucket_secs: toml_config.segmentation.bucket_secs,
            min_trip_distance_km: toml_config.segmentation.min_trip_distance_km,
            interpolate_secs: toml_config.segmentation.interpolate_secs,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            log_format: toml_config.logging.format,
            config_file,
        }
    }

    /// Determine config file path from the `--config` value or environment
    pub fn resolve_config_path(cli: Option<&str>) -> String {
        Self::resolve_config_path_with(cli, env::var(CONFIG_FILE_ENV).ok())
    }

    fn resolve_config_path_with(cli: Option<&str>, env_path: Option<String>) -> String {
        cli.map(str::to_string)
            .or(env_path.filter(|p| !p.is_empty()))
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let config = Self::from_toml(toml_config, path.display().to_string());
        config.validate().with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Resolve the config path, then load it with fallback to defaults
    pub fn load(cli: Option<&str>) -> Self {
        Self::load_from_path(&Self::resolve_config_path(cli))
    }

    /// Load configuration from an explicit path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.near_threshold_km.is_finite() && self.near_threshold_km > 0.0,
            "segmentation.near_threshold_km must be positive, got {}",
            self.near_threshold_km
        );
        anyhow::ensure!(
            self.bucket_secs.is_finite() && self.bucket_secs > 0.0,
            "segmentation.bucket_secs must be positive, got {}",
            self.bucket_secs
        );
        anyhow::ensure!(
            self.min_trip_distance_km.is_finite() && self.min_trip_distance_km >= 0.0,
            "segmentation.min_trip_distance_km must not be negative, got {}",
            self.min_trip_distance_km
        );
        anyhow::ensure!(self.metrics_interval_secs > 0, "metrics.interval_secs must be at least 1");
        if let Some(secs) = self.interpolate_secs {
            anyhow::ensure!(
                secs.is_finite() && secs > 0.0,
                "segmentation.interpolate_secs must be positive, got {}",
                secs
            );
        }
        Ok(())
    }

    /// Segmentation thresholds as consumed by the engine
    pub fn segmentation(&self) -> SegmentationConfig {
        SegmentationConfig { near_threshold_km: self.near_threshold_km, bucket_secs: self.bucket_secs }
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn web_root(&self) -> Option<&str> {
        self.web_root.as_deref()
    }

    pub fn near_threshold_km(&self) -> f64 {
        self.near_threshold_km
    }

    pub fn bucket_secs(&self) -> f64 {
        self.bucket_secs
    }

    pub fn min_trip_distance_km(&self) -> f64 {
        self.min_trip_distance_km
    }

    pub fn interpolate_secs(&self) -> Option<f64> {
        self.interpolate_secs
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method to override the listen port (used by the CLI and tests)
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder method to set the static web root
    pub fn with_web_root(mut self, web_root: Option<String>) -> Self {
        self.web_root = web_root;
        self
    }

    /// Builder method to set the resampling interval
    pub fn with_interpolate_secs(mut self, secs: Option<f64>) -> Self {
        self.interpolate_secs = secs;
        self
    }

    /// Builder method to set the minimum trip displacement
    pub fn with_min_trip_distance_km(mut self, km: f64) -> Self {
        self.min_trip_distance_km = km;
        self
    }
}
