//! Configuration Module
//!
//! Loads and validates configuration from TOML files.

pub mod loader;

pub use loader::{
    Config, DataSection, LoaderError, load_config, DATA_PATH_ENV,
};
