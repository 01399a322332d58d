//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - Market Data: CSV file series provider
//! - CLI: Command-line interface handlers

pub mod cli;
pub mod market_data;

pub use cli::CliApp;
pub use market_data::CsvFileProvider;
