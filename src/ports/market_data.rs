use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{OuError, PriceSeries};

/// Market data error type
#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Data parsing error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("Series not found: {0}")]
    NotFound(String),

    #[error("Series is empty: {0}")]
    Empty(String),
}

/// One sampled observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: Option<DateTime<Utc>>,
    pub value: f64,
}

impl Observation {
    pub fn new(value: f64) -> Self {
        Self { timestamp: None, value }
    }

    pub fn at(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            timestamp: Some(timestamp),
            value,
        }
    }
}

/// Series query parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesQuery {
    pub symbol: String,
    /// Keep only the most recent `limit` observations
    pub limit: Option<usize>,
}

impl SeriesQuery {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Observations as delivered by a provider, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSeries {
    pub symbol: String,
    pub observations: Vec<Observation>,
    pub dt: f64,
}

impl RawSeries {
    pub fn from_values(symbol: impl Into<String>, values: &[f64], dt: f64) -> Self {
        Self {
            symbol: symbol.into(),
            observations: values.iter().copied().map(Observation::new).collect(),
            dt,
        }
    }

    pub fn values(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.value).collect()
    }

    /// Truncate to the most recent `limit` observations
    pub fn tail(mut self, limit: Option<usize>) -> Self {
        if let Some(limit) = limit {
            let skip = self.observations.len().saturating_sub(limit);
            self.observations.drain(..skip);
        }
        self
    }

    /// Validate into a `PriceSeries`: finite values, at least three of them
    pub fn into_price_series(self) -> Result<PriceSeries, OuError> {
        PriceSeries::validated(self.values(), self.dt)
    }
}

/// Source of historical price series
#[async_trait]
pub trait PriceSeriesProvider: Send + Sync {
    /// Fetch the series named by `query`
    async fn fetch_series(&self, query: &SeriesQuery) -> Result<RawSeries, MarketDataError>;

    /// Provider name for logging
    fn name(&self) -> &str;
}
