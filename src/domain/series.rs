//! Price Series
//!
//! An ordered, fixed-interval sequence of observations. Construction does not
//! validate; call [`PriceSeries::validate`] (or [`validate_series`]) before any
//! estimation runs.

use serde::{Deserialize, Serialize};

use super::error::OuError;

/// Minimum observations needed to form a lag-1 statistic
pub const MIN_OBSERVATIONS: usize = 3;

/// Ordered observations sampled every `dt` time units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    values: Vec<f64>,
    dt: f64,
}

impl PriceSeries {
    /// Create a series sampled at interval `dt`.
    ///
    /// Rejects a non-positive or non-finite `dt` up front; the observations
    /// themselves are checked by [`PriceSeries::validate`].
    pub fn new(values: Vec<f64>, dt: f64) -> Result<Self, OuError> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(OuError::DegenerateParameter(format!(
                "sampling interval must be positive and finite, got {}",
                dt
            )));
        }
        Ok(Self { values, dt })
    }

    /// Create a series and validate it in one step
    pub fn validated(values: Vec<f64>, dt: f64) -> Result<Self, OuError> {
        let series = Self::new(values, dt)?;
        series.validate()?;
        Ok(series)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last(&self) -> Option<f64> {
        self.values.last().copied()
    }

    /// Arithmetic mean of the observations (0.0 for an empty series)
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Consecutive `(X_t, X_{t+1})` pairs
    pub fn pairs(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.values.windows(2).map(|w| (w[0], w[1]))
    }

    pub fn min(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::max)
    }

    /// Check length and numeric sanity
    pub fn validate(&self) -> Result<(), OuError> {
        validate_series(&self.values)
    }
}

/// Validate raw observations: at least [`MIN_OBSERVATIONS`] values, all finite.
pub fn validate_series(values: &[f64]) -> Result<(), OuError> {
    if values.len() < MIN_OBSERVATIONS {
        return Err(OuError::InsufficientData {
            required: MIN_OBSERVATIONS,
            actual: values.len(),
        });
    }

    if let Some((index, &value)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(OuError::NonFiniteValue { index, value });
    }

    Ok(())
}
