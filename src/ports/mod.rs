//! Ports Layer - Trait definitions for external dependencies
//!
//! Price series are pulled through `PriceSeriesProvider`, so the pipeline
//! never knows whether data came from a file, a test fixture or elsewhere.

pub mod market_data;
pub mod mocks;

pub use market_data::{MarketDataError, Observation, PriceSeriesProvider, RawSeries, SeriesQuery};
pub use mocks::MockSeriesProvider;
