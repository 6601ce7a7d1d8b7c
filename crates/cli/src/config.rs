//! Configuration management for the CLI
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `COSTVAL_*` environment variables. Command-line flags are applied last by
//! the caller via [`ValidatorConfig::apply_overrides`].

use anyhow::{Context, Result};
use costval_lib::parse_duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PROMETHEUS_URL: &str = "http://localhost:9090";
pub const DEFAULT_ALLOCATION_URL: &str = "http://localhost:9003";
pub const DEFAULT_WINDOW: &str = "24h";
pub const DEFAULT_RESOLUTION: &str = "5m";
pub const DEFAULT_TOLERANCE_PERCENT: f64 = 5.0;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: i64 = 30;

const ENV_PREFIX: &str = "COSTVAL";

/// CLI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Metrics engine base URL
    pub prometheus_url: String,
    /// Allocation API base URL
    pub allocation_url: String,
    /// Lookback window, e.g. `24h`
    pub window: String,
    /// Liveness sampling resolution, e.g. `5m`
    pub resolution: String,
    /// Accepted percentage difference when validating
    pub tolerance_percent: f64,
    pub request_timeout_secs: u64,
}

impl ValidatorConfig {
    /// Load configuration from `path`, or the default file if it exists
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => Some((path.to_path_buf(), true)),
            None => default_config_path().map(|path| (path, false)),
        };

        Self::from_sources(
            file,
            config::Environment::with_prefix(ENV_PREFIX).try_parsing(true),
        )
    }

    fn from_sources(
        file: Option<(PathBuf, bool)>,
        environment: config::Environment,
    ) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("prometheus_url", DEFAULT_PROMETHEUS_URL)?
            .set_default("allocation_url", DEFAULT_ALLOCATION_URL)?
            .set_default("window", DEFAULT_WINDOW)?
            .set_default("resolution", DEFAULT_RESOLUTION)?
            .set_default("tolerance_percent", DEFAULT_TOLERANCE_PERCENT)?
            .set_default("request_timeout_secs", DEFAULT_REQUEST_TIMEOUT_SECS)?;

        if let Some((path, required)) = file {
            builder = builder.add_source(config::File::from(path).required(required));
        }

        builder
            .add_source(environment)
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Apply command-line flags on top of the loaded values
    pub fn apply_overrides(
        &mut self,
        prometheus_url: Option<String>,
        allocation_url: Option<String>,
    ) {
        if let Some(url) = prometheus_url {
            self.prometheus_url = url;
        }
        if let Some(url) = allocation_url {
            self.allocation_url = url;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parse `window`, or the configured window when `None`
    pub fn window_or(&self, window: Option<&str>) -> Result<chrono::Duration> {
        let raw = window.unwrap_or(&self.window);
        parse_duration(raw).with_context(|| format!("Invalid window '{raw}'"))
    }

    /// Parse `resolution`, or the configured resolution when `None`
    pub fn resolution_or(&self, resolution: Option<&str>) -> Result<chrono::Duration> {
        let raw = resolution.unwrap_or(&self.resolution);
        parse_duration(raw).with_context(|| format!("Invalid resolution '{raw}'"))
    }
}

/// `~/.config/costval/config.toml`
fn default_config_path() -> Option<PathBuf> {
    let home = dirs_next::home_dir()?;
    Some(home.join(".config").join("costval").join("config.toml"))
}
