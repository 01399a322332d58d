//! Strategy Parameters
//!
//! Configuration for estimation, signal classification and the backtest.
//! Defaults: MLE estimation, 2-sigma entries, 3-sigma stops, shorting on,
//! exits at the mean, no percentage stop.

use serde::{Deserialize, Serialize};

use crate::strategy::estimator::EstimationMethod;

/// Main strategy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Estimation method used to fit the series
    pub method: EstimationMethod,
    /// Sampling interval of the series
    pub dt: f64,
    /// Entry threshold in stationary-std units
    pub k: f64,
    /// Stop-loss distance from mu in stationary-std units (must exceed k)
    pub stop_mult: f64,
    /// Allow SELL signals to open short positions
    pub shorting_enabled: bool,
    /// Close on reversion to mu; when off, positions close on the opposite signal
    pub exit_at_mean: bool,
    /// Extra stop on the adverse move from entry, as a fraction of the entry price
    pub stop_loss_pct: Option<f64>,
    /// Size at |z| = k
    pub base_position_size: f64,
    /// Cap on the sizing function
    pub max_position_size: f64,
    /// Trades per year-equivalent for Sharpe annualisation (None = raw)
    pub periods_per_year: Option<f64>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            method: EstimationMethod::Mle,
            dt: 1.0,
            k: 2.0,
            stop_mult: 3.0,
            shorting_enabled: true,
            exit_at_mean: true,
            stop_loss_pct: None,
            base_position_size: 1.0,
            max_position_size: 2.0,
            periods_per_year: None,
        }
    }
}

impl StrategyConfig {
    pub fn with_method(mut self, method: EstimationMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_threshold(mut self, k: f64) -> Self {
        self.k = k;
        self
    }

    pub fn with_stop_mult(mut self, stop_mult: f64) -> Self {
        self.stop_mult = stop_mult;
        self
    }

    pub fn with_shorting(mut self, enabled: bool) -> Self {
        self.shorting_enabled = enabled;
        self
    }

    pub fn with_exit_at_mean(mut self, enabled: bool) -> Self {
        self.exit_at_mean = enabled;
        self
    }

    pub fn with_stop_loss_pct(mut self, pct: f64) -> Self {
        self.stop_loss_pct = Some(pct);
        self
    }

    pub fn with_position_sizes(mut self, base: f64, max: f64) -> Self {
        self.base_position_size = base;
        self.max_position_size = max;
        self
    }

    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    pub fn with_periods_per_year(mut self, periods: f64) -> Self {
        self.periods_per_year = Some(periods);
        self
    }

    /// Size for an entry at deviation `z`: base * |z| / k, capped at the maximum
    pub fn position_size(&self, z_score: f64) -> f64 {
        (self.base_position_size * z_score.abs() / self.k).min(self.max_position_size)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(ConfigError::InvalidDt(self.dt));
        }
        if !self.k.is_finite() || self.k <= 0.0 || self.k > 5.0 {
            return Err(ConfigError::InvalidThreshold(self.k));
        }
        if !self.stop_mult.is_finite() || self.stop_mult <= self.k {
            return Err(ConfigError::InvalidStopMultiplier {
                stop_mult: self.stop_mult,
                k: self.k,
            });
        }
        if let Some(pct) = self.stop_loss_pct {
            if !pct.is_finite() || pct <= 0.0 {
                return Err(ConfigError::InvalidStopLossPct(pct));
            }
        }
        if !self.base_position_size.is_finite() || self.base_position_size <= 0.0 {
            return Err(ConfigError::InvalidPositionSize(self.base_position_size));
        }
        if !self.max_position_size.is_finite() || self.max_position_size < self.base_position_size {
            return Err(ConfigError::InvalidMaxPositionSize {
                max: self.max_position_size,
                base: self.base_position_size,
            });
        }
        if let Some(periods) = self.periods_per_year {
            if !periods.is_finite() || periods <= 0.0 {
                return Err(ConfigError::InvalidAnnualization(periods));
            }
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid sampling interval: {0} (must be > 0)")]
    InvalidDt(f64),
    #[error("Invalid signal threshold: {0} (must be 0 < k <= 5)")]
    InvalidThreshold(f64),
    #[error("Invalid stop multiplier: {stop_mult} (must exceed k = {k})")]
    InvalidStopMultiplier { stop_mult: f64, k: f64 },
    #[error("Invalid stop loss fraction: {0} (must be > 0)")]
    InvalidStopLossPct(f64),
    #[error("Invalid base position size: {0} (must be > 0)")]
    InvalidPositionSize(f64),
    #[error("Invalid max position size: {max} (must be >= base size {base})")]
    InvalidMaxPositionSize { max: f64, base: f64 },
    #[error("Invalid annualization period count: {0} (must be > 0)")]
    InvalidAnnualization(f64),
}
