//! Mean Reversion Pipeline
//!
//! validate -> estimate -> classify -> backtest, end to end. Each stage is a
//! pure function of its inputs, so running the pipeline twice on the same
//! series and configuration yields identical reports.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::backtest::{BacktestEngine, BacktestResult};
use crate::domain::{OuError, PriceSeries, Signal};
use crate::ports::{MarketDataError, PriceSeriesProvider, SeriesQuery};
use crate::strategy::classifier::SignalClassifier;
use crate::strategy::estimator::estimate;
use crate::strategy::ou_process::OUParameters;
use crate::strategy::params::{ConfigError, StrategyConfig};

/// Pipeline stage, carried by errors so callers know where a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetch,
    Validation,
    Estimation,
    Classification,
    Backtest,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Validation => "validation",
            Stage::Estimation => "estimation",
            Stage::Classification => "classification",
            Stage::Backtest => "backtest",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: OuError,
    },

    #[error("Market data error: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl PipelineError {
    fn at(stage: Stage) -> impl FnOnce(OuError) -> Self {
        move |source| PipelineError::Stage { stage, source }
    }

    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Stage { stage, .. } => *stage,
            PipelineError::MarketData(_) => Stage::Fetch,
            PipelineError::Config(_) => Stage::Validation,
        }
    }
}

/// Everything one run produces
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub params: OUParameters,
    pub signals: Vec<Signal>,
    pub backtest: BacktestResult,
}

impl PipelineReport {
    /// Signal for the most recent bar
    pub fn latest_signal(&self) -> Option<&Signal> {
        self.signals.last()
    }
}

/// Runs the full strategy against one series
#[derive(Debug, Clone)]
pub struct MeanReversionPipeline {
    config: StrategyConfig,
    engine: BacktestEngine,
}

impl MeanReversionPipeline {
    pub fn new(config: StrategyConfig) -> Result<Self, ConfigError> {
        let engine = BacktestEngine::new(config.clone())?;
        Ok(Self { config, engine })
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Fit parameters with the configured method
    pub fn fit(&self, series: &PriceSeries) -> Result<OUParameters, PipelineError> {
        series.validate().map_err(PipelineError::at(Stage::Validation))?;
        estimate(series, self.config.method).map_err(PipelineError::at(Stage::Estimation))
    }

    /// Classify every bar against already-fitted parameters
    pub fn classify(&self, series: &PriceSeries, params: &OUParameters) -> Result<Vec<Signal>, PipelineError> {
        let classifier =
            SignalClassifier::new(*params, self.config.k).map_err(PipelineError::at(Stage::Classification))?;
        Ok(classifier.signals(series))
    }

    /// validate -> estimate -> classify -> backtest
    pub fn run(&self, series: &PriceSeries) -> Result<PipelineReport, PipelineError> {
        let params = self.fit(series)?;
        let signals = self.classify(series, &params)?;
        let backtest = self
            .engine
            .run(&params, &signals)
            .map_err(PipelineError::at(Stage::Backtest))?;

        tracing::info!(
            method = %self.config.method,
            theta = params.theta,
            mu = params.mu,
            sigma = params.sigma,
            trades = backtest.metrics.total_trades,
            "Pipeline complete"
        );

        Ok(PipelineReport {
            params,
            signals,
            backtest,
        })
    }

    /// Fetch a series from `provider`, then run
    pub async fn run_from_provider(
        &self,
        provider: &dyn PriceSeriesProvider,
        query: &SeriesQuery,
    ) -> Result<PipelineReport, PipelineError> {
        tracing::debug!(provider = provider.name(), symbol = %query.symbol, "Fetching series");
        let raw = provider.fetch_series(query).await?;
        let series = raw.into_price_series().map_err(PipelineError::at(Stage::Validation))?;
        self.run(&series)
    }
}
