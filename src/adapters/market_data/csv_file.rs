//! CSV File Provider
//!
//! Reads a price series from a local CSV file through the `csv` crate.
//! Accepted layouts:
//! - a single column of closes, with or without a header
//! - `timestamp,close` (extra columns allowed when a header names `close`)
//!
//! Fields may be quoted. Timestamps may be RFC 3339, `YYYY-MM-DD`,
//! `YYYY-MM-DD HH:MM:SS` or unix seconds, and must be strictly increasing.
//! Blank lines and `#` comments are skipped.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::{ReaderBuilder, StringRecord, Trim, Writer};
use serde::{Deserialize, Serialize};

use crate::ports::market_data::{MarketDataError, Observation, PriceSeriesProvider, RawSeries, SeriesQuery};

const TIMESTAMP_COLUMNS: [&str; 4] = ["timestamp", "date", "time", "datetime"];
const VALUE_COLUMNS: [&str; 4] = ["close", "price", "value", "x"];

/// Price series provider backed by one CSV file
#[derive(Debug, Clone)]
pub struct CsvFileProvider {
    path: PathBuf,
    dt: f64,
}

/// Row written by `write_series`
#[derive(Debug, Serialize)]
struct PathRow {
    t: f64,
    close: f64,
}

impl CsvFileProvider {
    pub fn new(path: impl Into<PathBuf>, dt: f64) -> Self {
        Self { path: path.into(), dt }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `values` as a `t,close` CSV with `t = i * dt`
    pub async fn write_series(path: impl AsRef<Path>, values: &[f64], dt: f64) -> Result<(), MarketDataError> {
        let mut writer = Writer::from_writer(Vec::with_capacity(values.len() * 24 + 8));
        for (i, &close) in values.iter().enumerate() {
            writer.serialize(PathRow { t: i as f64 * dt, close })?;
        }
        let out = writer.into_inner().map_err(|e| e.into_error())?;
        tokio::fs::write(path, out).await?;
        Ok(())
    }
}

#[async_trait]
impl PriceSeriesProvider for CsvFileProvider {
    async fn fetch_series(&self, query: &SeriesQuery) -> Result<RawSeries, MarketDataError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MarketDataError::NotFound(self.path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let observations = parse_csv(&content)?;
        if observations.is_empty() {
            return Err(MarketDataError::Empty(self.path.display().to_string()));
        }

        let symbol = if query.symbol.is_empty() {
            self.path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        } else {
            query.symbol.clone()
        };

        tracing::debug!(
            path = %self.path.display(),
            rows = observations.len(),
            "Loaded CSV series"
        );

        Ok(RawSeries {
            symbol,
            observations,
            dt: self.dt,
        }
        .tail(query.limit))
    }

    fn name(&self) -> &str {
        "csv"
    }
}

/// Column positions resolved from a header row, or inferred per row
#[derive(Debug, Clone, Copy)]
struct Layout {
    timestamp: Option<usize>,
    value: usize,
}

impl Layout {
    /// Headerless rows: a lone close, or a leading timestamp and a trailing close
    fn infer(width: usize) -> Self {
        Self {
            timestamp: if width > 1 { Some(0) } else { None },
            value: width.saturating_sub(1),
        }
    }

    /// Project `record` onto the `timestamp,close` row shape
    fn project(&self, record: &StringRecord) -> Option<(StringRecord, StringRecord)> {
        let value = record.get(self.value)?;
        Some(match self.timestamp.and_then(|i| record.get(i)) {
            Some(ts) => (
                StringRecord::from(vec!["timestamp", "close"]),
                StringRecord::from(vec![ts, value]),
            ),
            None => (StringRecord::from(vec!["close"]), StringRecord::from(vec![value])),
        })
    }
}

/// One data row after column resolution
#[derive(Debug, Deserialize)]
struct SeriesRow {
    #[serde(default)]
    timestamp: Option<String>,
    close: f64,
}

fn parse_header(record: &StringRecord) -> Option<Layout> {
    // A header row has no numeric field
    if record.iter().any(|f| f.parse::<f64>().is_ok()) {
        return None;
    }
    let find = |names: &[&str]| {
        record
            .iter()
            .position(|f| names.contains(&f.to_ascii_lowercase().as_str()))
    };
    Some(Layout {
        timestamp: find(&TIMESTAMP_COLUMNS[..]),
        value: find(&VALUE_COLUMNS[..]).unwrap_or(record.len().saturating_sub(1)),
    })
}

fn line_of(record: &StringRecord) -> usize {
    record.position().map_or(0, |p| p.line() as usize)
}

/// Parse CSV text into observations
pub fn parse_csv(content: &str) -> Result<Vec<Observation>, MarketDataError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .from_reader(content.as_bytes());

    let mut layout: Option<Layout> = None;
    let mut observations = Vec::new();
    let mut last_timestamp: Option<DateTime<Utc>> = None;

    for (row, result) in reader.records().enumerate() {
        let record = result.map_err(|e| MarketDataError::ParseError {
            line: e.position().map_or(0, |p| p.line() as usize),
            message: e.to_string(),
        })?;
        let line = line_of(&record);

        if row == 0 {
            if let Some(header) = parse_header(&record) {
                layout = Some(header);
                continue;
            }
        }

        let row_layout = layout.unwrap_or_else(|| Layout::infer(record.len()));
        let (headers, projected) = row_layout.project(&record).ok_or_else(|| MarketDataError::ParseError {
            line,
            message: format!("expected at least {} columns", row_layout.value + 1),
        })?;
        let parsed: SeriesRow = projected.deserialize(Some(&headers)).map_err(|e| MarketDataError::ParseError {
            line,
            message: format!("invalid value '{}': {}", record.get(row_layout.value).unwrap_or_default(), e),
        })?;

        let timestamp = match parsed.timestamp.as_deref() {
            Some(raw) => {
                let ts = parse_timestamp(raw).ok_or_else(|| MarketDataError::ParseError {
                    line,
                    message: format!("invalid timestamp '{}'", raw),
                })?;
                if let Some(prev) = last_timestamp {
                    if ts <= prev {
                        return Err(MarketDataError::ParseError {
                            line,
                            message: format!("timestamp {} is not after {}", ts, prev),
                        });
                    }
                }
                last_timestamp = Some(ts);
                Some(ts)
            }
            None => None,
        };

        observations.push(Observation {
            timestamp,
            value: parsed.close,
        });
    }

    Ok(observations)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(ts.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|ts| ts.and_utc());
    }
    if let Ok(secs) = raw.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_bare_closes() {
        let obs = parse_csv("100.0\n101.5\n\n# gap\n99.25\n").unwrap();
        let values: Vec<f64> = obs.iter().map(|o| o.value).collect();
        assert_eq!(values, vec![100.0, 101.5, 99.25]);
        assert!(obs.iter().all(|o| o.timestamp.is_none()));
    }

    #[test]
    fn test_header_with_timestamps() {
        let csv = "timestamp,open,close\n2024-01-01,1,100\n2024-01-02,1,101\n2024-01-03T00:00:00Z,1,102\n";
        let obs = parse_csv(csv).unwrap();
        assert_eq!(obs.len(), 3);
        assert_eq!(obs[2].value, 102.0);
        assert!(obs[0].timestamp.unwrap() < obs[1].timestamp.unwrap());
    }

    #[test]
    fn test_headerless_pairs_use_unix_seconds() {
        let obs = parse_csv("1700000000,10.0\n1700000060,10.5\n").unwrap();
        assert_eq!(obs[1].timestamp, DateTime::from_timestamp(1_700_000_060, 0));
    }

    #[test]
    fn test_quoted_spreadsheet_export() {
        let csv = "\"Date\",\"Open\",\"Close\"\n\"2024-01-01\",\"99.0\",\"100.5\"\n\"2024-01-02\",\"100.0\",\"101.25\"\n";
        let obs = parse_csv(csv).unwrap();
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].value, 100.5);
        assert_eq!(obs[1].value, 101.25);
        assert_eq!(
            obs[0].timestamp,
            NaiveDate::from_ymd_opt(2024, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0)).map(|ts| ts.and_utc())
        );
    }

    #[test]
    fn test_short_row_reports_line() {
        let csv = "date,open,close\n2024-01-01,1,100\n2024-01-02,1\n";
        assert!(matches!(
            parse_csv(csv),
            Err(MarketDataError::ParseError { line: 3, .. })
        ));
    }

    #[test]
    fn test_out_of_order_timestamps_rejected() {
        let csv = "date,close\n2024-01-02,100\n2024-01-01,101\n";
        assert!(matches!(
            parse_csv(csv),
            Err(MarketDataError::ParseError { line: 3, .. })
        ));
    }

    #[test]
    fn test_bad_value_reports_line() {
        let csv = "close\n100\nabc\n";
        match parse_csv(csv) {
            Err(MarketDataError::ParseError { line, message }) => {
                assert_eq!(line, 3);
                assert!(message.contains("abc"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_values_pass_through() {
        // Rejected later by series validation with the exact index
        let obs = parse_csv("1.0\nNaN\n3.0\n").unwrap();
        assert!(obs[1].value.is_nan());
    }

    #[tokio::test]
    async fn test_fetch_series_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "t,close").unwrap();
        for i in 0..10 {
            writeln!(file, "{},{}", i, 100.0 + i as f64).unwrap();
        }

        let provider = CsvFileProvider::new(file.path(), 0.25);
        let raw = provider
            .fetch_series(&SeriesQuery::new("TEST").with_limit(4))
            .await
            .unwrap();
        assert_eq!(raw.symbol, "TEST");
        assert_eq!(raw.dt, 0.25);
        assert_eq!(raw.values(), vec![106.0, 107.0, 108.0, 109.0]);
    }

    #[tokio::test]
    async fn test_missing_and_empty_files() {
        let provider = CsvFileProvider::new("/nonexistent/series.csv", 1.0);
        assert!(matches!(
            provider.fetch_series(&SeriesQuery::default()).await,
            Err(MarketDataError::NotFound(_))
        ));

        let file = NamedTempFile::new().unwrap();
        let provider = CsvFileProvider::new(file.path(), 1.0);
        assert!(matches!(
            provider.fetch_series(&SeriesQuery::default()).await,
            Err(MarketDataError::Empty(_))
        ));
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.csv");
        CsvFileProvider::write_series(&path, &[1.5, 2.5, 3.5], 0.5).await.unwrap();

        let raw = CsvFileProvider::new(&path, 0.5)
            .fetch_series(&SeriesQuery::default())
            .await
            .unwrap();
        assert_eq!(raw.values(), vec![1.5, 2.5, 3.5]);
        assert_eq!(raw.symbol, "sim");
    }
}
