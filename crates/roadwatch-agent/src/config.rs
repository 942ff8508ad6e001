// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Agent configuration.
//!
//! Supports both programmatic (builder) and file-based (TOML) configuration.

use crate::queue::DEFAULT_BATCH_LIMIT;
use crate::sensor::SourceKind;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Agent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Durable queue file (SQLite)
    pub db_path: PathBuf,

    /// Collector sampling interval (milliseconds)
    pub sample_interval_ms: u64,

    /// Sync cycle period (seconds)
    pub sync_interval_secs: u64,

    /// Maximum records drained per sync cycle
    pub batch_limit: usize,

    /// Collector endpoint receiving one sample per POST
    pub sink_url: String,

    /// Per-record delivery timeout (milliseconds)
    pub sink_timeout_ms: u64,

    /// Health endpoint; defaults to `/` on the sink's origin
    pub probe_url: Option<String>,

    /// Reachability probe timeout (milliseconds)
    pub probe_timeout_ms: u64,

    /// How long shutdown waits for both loops (milliseconds)
    pub shutdown_timeout_ms: u64,

    /// Sensor source selection
    pub source: SourceKind,

    /// Serial device of the GPS receiver
    pub gps_device: PathBuf,

    /// GPS serial baud rate
    pub gps_baud: u32,

    /// I2C bus device of the accelerometer
    pub i2c_bus: PathBuf,

    /// MPU-6050 bus address
    pub mpu_address: u16,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("roadwatch.db"),
            sample_interval_ms: 1000,
            sync_interval_secs: 30,
            batch_limit: DEFAULT_BATCH_LIMIT,
            sink_url: "http://127.0.0.1:5000/data".to_string(),
            sink_timeout_ms: 5000,
            probe_url: None,
            probe_timeout_ms: 2000,
            shutdown_timeout_ms: 2000,
            source: SourceKind::Auto,
            gps_device: PathBuf::from("/dev/ttyUSB0"),
            gps_baud: 9600,
            i2c_bus: PathBuf::from("/dev/i2c-1"),
            mpu_address: 0x68,
        }
    }
}

impl AgentConfig {
    /// Create a new config builder
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_limit == 0 {
            return Err(ConfigError::Invalid("batch_limit must be at least 1".into()));
        }

        let durations = [
            ("sample_interval_ms", self.sample_interval_ms),
            ("sync_interval_secs", self.sync_interval_secs),
            ("sink_timeout_ms", self.sink_timeout_ms),
            ("probe_timeout_ms", self.probe_timeout_ms),
            ("shutdown_timeout_ms", self.shutdown_timeout_ms),
        ];
        for (name, value) in durations {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be greater than 0", name)));
            }
        }

        parse_http_url("sink_url", &self.sink_url)?;
        if let Some(ref probe_url) = self.probe_url {
            parse_http_url("probe_url", probe_url)?;
        }

        Ok(())
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn sink_timeout(&self) -> Duration {
        Duration::from_millis(self.sink_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Probe URL, falling back to the root of the sink's origin.
    pub fn effective_probe_url(&self) -> Result<String, ConfigError> {
        if let Some(ref url) = self.probe_url {
            return Ok(url.clone());
        }

        let sink = parse_http_url("sink_url", &self.sink_url)?;
        let root = sink
            .join("/")
            .map_err(|e| ConfigError::Invalid(format!("sink_url: {}", e)))?;
        Ok(root.to_string())
    }
}

fn parse_http_url(name: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::Invalid(format!("{}: {}", name, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Invalid(format!(
            "{}: unsupported scheme '{}'",
            name, other
        ))),
    }
}

/// Whole milliseconds in `d`, rounded up.
fn ceil_millis(d: Duration) -> u64 {
    let millis = d.as_millis() + u128::from(d.subsec_nanos() % 1_000_000 != 0);
    u64::try_from(millis).unwrap_or(u64::MAX)
}

/// Whole seconds in `d`, rounded up.
fn ceil_secs(d: Duration) -> u64 {
    d.as_secs().saturating_add(u64::from(d.subsec_nanos() != 0))
}

/// Config builder for fluent API
///
/// Duration setters round up to the unit of the stored field, so a non-zero
/// duration never becomes zero.
#[derive(Debug, Default)]
pub struct AgentConfigBuilder {
    config: Option<AgentConfig>,
}

impl AgentConfigBuilder {
    fn config(&mut self) -> &mut AgentConfig {
        self.config.get_or_insert_with(AgentConfig::default)
    }

    /// Start from an existing configuration (e.g. loaded from file)
    pub fn base(mut self, config: AgentConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config().db_path = path.into();
        self
    }

    pub fn sample_interval(mut self, interval: Duration) -> Self {
        self.config().sample_interval_ms = ceil_millis(interval);
        self
    }

    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.config().sync_interval_secs = ceil_secs(interval);
        self
    }

    pub fn batch_limit(mut self, limit: usize) -> Self {
        self.config().batch_limit = limit;
        self
    }

    pub fn sink_url(mut self, url: impl Into<String>) -> Self {
        self.config().sink_url = url.into();
        self
    }

    pub fn sink_timeout(mut self, timeout: Duration) -> Self {
        self.config().sink_timeout_ms = ceil_millis(timeout);
        self
    }

    pub fn probe_url(mut self, url: impl Into<String>) -> Self {
        self.config().probe_url = Some(url.into());
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config().probe_timeout_ms = ceil_millis(timeout);
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config().shutdown_timeout_ms = ceil_millis(timeout);
        self
    }

    pub fn source(mut self, source: SourceKind) -> Self {
        self.config().source = source;
        self
    }

    pub fn gps_device(mut self, path: impl Into<PathBuf>) -> Self {
        self.config().gps_device = path.into();
        self
    }

    pub fn gps_baud(mut self, baud: u32) -> Self {
        self.config().gps_baud = baud;
        self
    }

    pub fn i2c_bus(mut self, path: impl Into<PathBuf>) -> Self {
        self.config().i2c_bus = path.into();
        self
    }

    pub fn mpu_address(mut self, address: u16) -> Self {
        self.config().mpu_address = address;
        self
    }

    /// Build the configuration
    pub fn build(mut self) -> AgentConfig {
        self.config.take().unwrap_or_default()
    }
}
