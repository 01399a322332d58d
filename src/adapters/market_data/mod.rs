//! Market Data Adapters
//!
//! Price series sources implementing `PriceSeriesProvider`:
//! - `CsvFileProvider`: local CSV files (`timestamp,close` or bare closes)

mod csv_file;

pub use csv_file::{parse_csv, CsvFileProvider};
