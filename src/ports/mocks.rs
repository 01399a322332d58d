use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::ports::market_data::{MarketDataError, PriceSeriesProvider, RawSeries, SeriesQuery};

/// In-memory series provider that records calls and serves canned series
#[derive(Debug, Default, Clone)]
pub struct MockSeriesProvider {
    calls: Arc<Mutex<Vec<SeriesQuery>>>,
    responses: Arc<Mutex<HashMap<String, RawSeries>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockSeriesProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to serve `values` under `symbol`
    pub fn with_series(self, symbol: &str, values: &[f64], dt: f64) -> Self {
        lock(&self.responses).insert(symbol.to_string(), RawSeries::from_values(symbol, values, dt));
        self
    }

    /// Get all recorded queries
    pub fn get_calls(&self) -> Vec<SeriesQuery> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl PriceSeriesProvider for MockSeriesProvider {
    async fn fetch_series(&self, query: &SeriesQuery) -> Result<RawSeries, MarketDataError> {
        lock(&self.calls).push(query.clone());
        let raw = lock(&self.responses)
            .get(&query.symbol)
            .cloned()
            .ok_or_else(|| MarketDataError::NotFound(query.symbol.clone()))?;
        Ok(raw.tail(query.limit))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
