//! Backtest Layer - Replays classified signals through a position state machine
//!
//! - `engine`: FLAT / LONG / SHORT transitions, trade log and equity curve
//! - `metrics`: total return, win rate, Sharpe ratio and drawdown

pub mod engine;
pub mod metrics;

pub use engine::{BacktestEngine, BacktestResult, Step, StepContext};
pub use metrics::{Metrics, MetricsCalculator};
