//! ou-reversion - Ornstein-Uhlenbeck Mean Reversion Library
//!
//! Fits an OU process dX = theta(mu - X)dt + sigma dW to a price series,
//! classifies each bar by its stationary z-score and backtests the signals.
//!
//! # Modules
//!
//! - `domain`: Core value types (PriceSeries, Signal, Position, Trade, OuError)
//! - `strategy`: OU process model, estimators (MLE, AR(1), OLS) and the signal classifier
//! - `backtest`: Position state machine and performance metrics
//! - `application`: End-to-end pipeline and parameter analysis reports
//! - `ports`: Trait abstractions (PriceSeriesProvider)
//! - `adapters`: External implementations (CSV files, CLI)
//! - `config`: Configuration loading and validation

pub mod domain;
pub mod strategy;
pub mod backtest;
pub mod application;
pub mod ports;
pub mod adapters;
pub mod config;
