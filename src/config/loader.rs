//! Configuration Loader
//!
//! Loads and validates configuration from TOML files matching config.toml structure.
//! Every section is optional; missing values fall back to `StrategyConfig::default()`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::strategy::estimator::EstimationMethod;
use crate::strategy::params::StrategyConfig;

/// Environment variable overriding `[data] path`
pub const DATA_PATH_ENV: &str = "OU_DATA_PATH";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub estimation: EstimationSection,
    #[serde(default)]
    pub signal: SignalSection,
    #[serde(default)]
    pub backtest: BacktestSection,
    #[serde(default)]
    pub data: DataSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Estimation configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EstimationSection {
    /// "mle", "regression" or "ols"
    pub method: EstimationMethod,
    /// Sampling interval between observations
    pub dt: f64,
}

impl Default for EstimationSection {
    fn default() -> Self {
        let defaults = StrategyConfig::default();
        Self {
            method: defaults.method,
            dt: defaults.dt,
        }
    }
}

/// Signal configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalSection {
    /// Entry threshold in stationary-std units (2.0 = classic 2-sigma bands)
    pub k: f64,
}

impl Default for SignalSection {
    fn default() -> Self {
        Self {
            k: StrategyConfig::default().k,
        }
    }
}

/// Backtest configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BacktestSection {
    /// Stop distance from mu in stationary-std units
    pub stop_mult: f64,
    pub shorting_enabled: bool,
    /// Close on reversion to mu (otherwise on the opposite signal)
    pub exit_at_mean: bool,
    /// Extra stop on the loss fraction from entry, e.g. 0.2
    pub stop_loss_pct: Option<f64>,
    pub base_position_size: f64,
    pub max_position_size: f64,
    /// Sharpe annualisation (252 for daily bars); omit for per-trade Sharpe
    pub periods_per_year: Option<f64>,
}

impl Default for BacktestSection {
    fn default() -> Self {
        let defaults = StrategyConfig::default();
        Self {
            stop_mult: defaults.stop_mult,
            shorting_enabled: defaults.shorting_enabled,
            exit_at_mean: defaults.exit_at_mean,
            stop_loss_pct: defaults.stop_loss_pct,
            base_position_size: defaults.base_position_size,
            max_position_size: defaults.max_position_size,
            periods_per_year: defaults.periods_per_year,
        }
    }
}

/// Data source configuration section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DataSection {
    /// CSV file with `timestamp,close` or bare `close` rows
    pub path: Option<String>,
    /// Label used in reports
    pub symbol: Option<String>,
    /// Keep only the most recent N observations
    pub limit: Option<usize>,
}

impl DataSection {
    /// Get data path with environment variable override
    /// Checks OU_DATA_PATH env var first, falls back to config value; `~` is expanded
    pub fn get_path(&self) -> Option<PathBuf> {
        let raw = std::env::var(DATA_PATH_ENV).ok().or_else(|| self.path.clone())?;
        Some(PathBuf::from(shellexpand::tilde(&raw).into_owned()))
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// Configuration file errors
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, LoaderError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), LoaderError> {
        StrategyConfig::from(self)
            .validate()
            .map_err(|e| LoaderError::ValidationError(e.to_string()))?;

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(LoaderError::ValidationError(format!(
                "logging level must be one of {:?}, got {}",
                LOG_LEVELS, self.logging.level
            )));
        }

        if let Some(0) = self.data.limit {
            return Err(LoaderError::ValidationError(
                "data limit must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

// Conversion from Config to StrategyConfig
impl From<&Config> for StrategyConfig {
    fn from(config: &Config) -> Self {
        StrategyConfig {
            method: config.estimation.method,
            dt: config.estimation.dt,
            k: config.signal.k,
            stop_mult: config.backtest.stop_mult,
            shorting_enabled: config.backtest.shorting_enabled,
            exit_at_mean: config.backtest.exit_at_mean,
            stop_loss_pct: config.backtest.stop_loss_pct,
            base_position_size: config.backtest.base_position_size,
            max_position_size: config.backtest.max_position_size,
            periods_per_year: config.backtest.periods_per_year,
        }
    }
}
