//! Domain Layer - Core value types for OU estimation and backtesting
//!
//! Pure types with no IO. Everything here is immutable once built except
//! `PositionState`, which a single backtest run threads through its steps.

pub mod error;
pub mod series;
pub mod signal;
pub mod position;
pub mod trade;

pub use error::OuError;
pub use series::{PriceSeries, validate_series, MIN_OBSERVATIONS};
pub use signal::{Signal, Decision};
pub use position::{Position, PositionState, Side, PositionError};
pub use trade::{Trade, ExitReason};
