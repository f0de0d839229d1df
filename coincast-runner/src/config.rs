//! Forecasting parameters, loaded from a TOML file.
//!
//! Every section and field has a default, so an empty file is a valid config.

use coincast_core::data::binance::{DEFAULT_BASE_URL, MAX_PAGE_LIMIT};
use coincast_core::{Hyperparameters, Interval, PriceField};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::gate::DeploymentThresholds;
use crate::registry::Stage;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub paths: PathsConfig,
    pub binance: BinanceConfig,
    pub processing: ProcessingConfig,
    pub model: ModelConfig,
    pub forecast: ForecastSettings,
    pub registry: RegistryConfig,
    pub deployment: DeploymentThresholds,
    pub tracking: TrackingConfig,
}

/// Directories, relative to the project root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub tracking_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            tracking_dir: PathBuf::from("mlruns"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinanceConfig {
    pub base_url: String,
    pub symbol: String,
    pub interval: Interval,
    pub years_of_data: u32,
    pub page_limit: u16,
    pub timeout_secs: u64,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            symbol: "BTCUSDT".to_string(),
            interval: Interval::Day1,
            years_of_data: 2,
            page_limit: MAX_PAGE_LIMIT,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub price_column: PriceField,
    pub test_size_days: usize,
    /// Shortest frame worth modelling; defaults to one full yearly cycle.
    pub min_observations: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            price_column: PriceField::Close,
            test_size_days: 30,
            min_observations: 365,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    #[serde(flatten)]
    pub hyperparameters: Hyperparameters,
    /// Refit on the whole frame after evaluation, so forecasts start after the last observation.
    /// When off, the registered model is the train-partition fit and forecasts start
    /// `test_size_days` before the last observation.
    pub refit_on_full: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hyperparameters: Hyperparameters::default(),
            refit_on_full: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastSettings {
    pub days_ahead: usize,
    pub max_days_ahead: usize,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            days_ahead: 30,
            max_days_ahead: 365,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub model_name: String,
    pub description: String,
    /// Stage given to a version that passes the deployment gate.
    pub accepted_stage: Stage,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            model_name: "btc_price_forecaster".to_string(),
            description: "Daily close-price forecaster".to_string(),
            accepted_stage: Stage::Production,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub enabled: bool,
    pub experiment_name: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            experiment_name: "crypto_forecasting".to_string(),
        }
    }
}

impl ForecastConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ForecastConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Read `path` if it exists, otherwise fall back to the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        let b = &self.binance;
        if b.symbol.trim().is_empty() {
            return invalid("binance.symbol must not be empty".into());
        }
        if b.years_of_data == 0 {
            return invalid("binance.years_of_data must be at least 1".into());
        }
        if b.page_limit == 0 || b.page_limit > MAX_PAGE_LIMIT {
            return invalid(format!(
                "binance.page_limit must be in 1..={MAX_PAGE_LIMIT}, got {}",
                b.page_limit
            ));
        }
        if b.timeout_secs == 0 {
            return invalid("binance.timeout_secs must be positive".into());
        }

        let p = &self.processing;
        if p.test_size_days == 0 {
            return invalid("processing.test_size_days must be at least 1".into());
        }
        if p.min_observations <= p.test_size_days {
            return invalid(format!(
                "processing.min_observations ({}) must exceed test_size_days ({})",
                p.min_observations, p.test_size_days
            ));
        }

        self.model
            .hyperparameters
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("model: {e}")))?;

        let f = &self.forecast;
        if f.max_days_ahead == 0 || f.days_ahead == 0 || f.days_ahead > f.max_days_ahead {
            return invalid(format!(
                "forecast.days_ahead ({}) must be in 1..=max_days_ahead ({})",
                f.days_ahead, f.max_days_ahead
            ));
        }

        let name = &self.registry.model_name;
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return invalid(format!(
                "registry.model_name '{name}' must be non-empty and use only [A-Za-z0-9_-]"
            ));
        }

        self.deployment
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("deployment: {e}")))
    }
}
