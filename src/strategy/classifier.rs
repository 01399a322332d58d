//! Signal Classifier
//!
//! Maps a price to a trading decision using the stationary distribution of a
//! fitted OU process.
//!
//! z = (price - mu) / sqrt(sigma^2 / (2*theta))
//!
//! - z > k: SELL (price rich versus equilibrium)
//! - z < -k: BUY (price cheap versus equilibrium)
//! - otherwise HOLD, including exactly +/-k

use crate::domain::{Decision, OuError, PriceSeries, Signal};
use crate::strategy::ou_process::OUParameters;

/// Default entry threshold in stationary-std units
pub const DEFAULT_THRESHOLD: f64 = 2.0;
/// |z| below which the continuous signal strength is zero
const DEAD_ZONE: f64 = 0.5;
/// |z| at which the continuous signal strength saturates
const MAX_STRENGTH_Z: f64 = 3.0;

/// Decision for a single z-score
pub fn decide(z_score: f64, k: f64) -> Decision {
    if z_score > k {
        Decision::Sell
    } else if z_score < -k {
        Decision::Buy
    } else {
        Decision::Hold
    }
}

/// Classify `price` against `params` with threshold `k`.
///
/// Fails with `DegenerateParameter` when theta <= 0.
pub fn classify(price: f64, params: &OUParameters, k: f64) -> Result<Decision, OuError> {
    let z = params.z_score(price)?;
    Ok(decide(z, k))
}

/// Continuous strength in [-1, 1]: 0 inside the dead zone, otherwise
/// -clamp(z, -3, 3) / 3. Positive means buy pressure.
pub fn signal_strength(z_score: f64) -> f64 {
    if z_score.abs() < DEAD_ZONE {
        return 0.0;
    }
    -z_score.clamp(-MAX_STRENGTH_Z, MAX_STRENGTH_Z) / MAX_STRENGTH_Z
}

/// Stateless classifier bound to one parameter set and threshold
#[derive(Debug, Clone)]
pub struct SignalClassifier {
    params: OUParameters,
    k: f64,
}

impl SignalClassifier {
    /// Bind a classifier. Degenerate parameters or a non-positive threshold
    /// are rejected here so every later call is infallible.
    pub fn new(params: OUParameters, k: f64) -> Result<Self, OuError> {
        params.ensure_mean_reverting()?;
        if !k.is_finite() || k <= 0.0 {
            return Err(OuError::DegenerateParameter(format!(
                "signal threshold must be positive, got {}",
                k
            )));
        }
        Ok(Self { params, k })
    }

    pub fn params(&self) -> &OUParameters {
        &self.params
    }

    pub fn threshold(&self) -> f64 {
        self.k
    }

    fn z_score(&self, price: f64) -> f64 {
        // Validated at construction
        self.params.z_score(price).unwrap_or(0.0)
    }

    pub fn classify(&self, price: f64) -> Decision {
        decide(self.z_score(price), self.k)
    }

    pub fn signal(&self, index: usize, price: f64) -> Signal {
        let z = self.z_score(price);
        Signal::new(index, price, z, decide(z, self.k))
    }

    /// One signal per bar, in series order
    pub fn signals(&self, series: &PriceSeries) -> Vec<Signal> {
        series
            .values()
            .iter()
            .enumerate()
            .map(|(i, &price)| self.signal(i, price))
            .collect()
    }
}

/// Classify every bar of `series`
pub fn generate_signals(series: &PriceSeries, params: &OUParameters, k: f64) -> Result<Vec<Signal>, OuError> {
    let classifier = SignalClassifier::new(*params, k)?;
    let signals = classifier.signals(series);

    tracing::debug!(
        bars = signals.len(),
        buys = signals.iter().filter(|s| s.decision == Decision::Buy).count(),
        sells = signals.iter().filter(|s| s.decision == Decision::Sell).count(),
        "Generated signals"
    );
    Ok(signals)
}
