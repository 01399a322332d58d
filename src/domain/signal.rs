use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete trading decision for one bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Buy => write!(f, "BUY"),
            Decision::Sell => write!(f, "SELL"),
            Decision::Hold => write!(f, "HOLD"),
        }
    }
}

/// Classified observation: one per bar of the series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub index: usize,
    pub price: f64,
    pub z_score: f64,
    pub decision: Decision,
}

impl Signal {
    pub fn new(index: usize, price: f64, z_score: f64, decision: Decision) -> Self {
        Self {
            index,
            price,
            z_score,
            decision,
        }
    }

    /// Standard normal CDF of the z-score, Φ(z) = 0.5 * (1 + erf(z / sqrt(2)))
    pub fn percentile(&self) -> f64 {
        use statrs::function::erf::erf;
        0.5 * (1.0 + erf(self.z_score / f64::sqrt(2.0)))
    }

    /// Stationary mass less extreme than the price in the decision's direction:
    /// 1 - Φ(z) for BUY, Φ(z) for SELL, and the two-sided tail beyond |z| for HOLD.
    pub fn confidence(&self) -> f64 {
        let p = self.percentile();
        match self.decision {
            Decision::Buy => 1.0 - p,
            Decision::Sell => p,
            Decision::Hold => 1.0 - 2.0 * (p - 0.5).abs(),
        }
    }

    pub fn is_entry(&self) -> bool {
        self.decision != Decision::Hold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_signal_creation() {
        let signal = Signal::new(7, 95.0, -2.5, Decision::Buy);
        assert_eq!(signal.index, 7);
        assert_eq!(signal.decision, Decision::Buy);
        assert!(signal.is_entry());
        assert!(!Signal::new(0, 100.0, 0.0, Decision::Hold).is_entry());
    }

    #[test]
    fn test_percentile_calculation() {
        let at = |z: f64| Signal::new(0, 0.0, z, Decision::Hold).percentile();
        assert_relative_eq!(at(0.0), 0.5, epsilon = 0.001);
        assert_relative_eq!(at(1.0), 0.841, epsilon = 0.001);
        assert_relative_eq!(at(2.0), 0.977, epsilon = 0.001);
        assert_relative_eq!(at(-2.0), 0.023, epsilon = 0.001);
    }

    #[test]
    fn test_confidence_follows_decision() {
        // Deep BUY and deep SELL both report high confidence
        let buy = Signal::new(0, 85.0, -3.0, Decision::Buy).confidence();
        let sell = Signal::new(0, 115.0, 3.0, Decision::Sell).confidence();
        assert_relative_eq!(buy, 0.99865, epsilon = 1e-4);
        assert_relative_eq!(sell, buy, epsilon = 1e-12);

        // HOLD is most confident at the mean
        assert_relative_eq!(Signal::new(0, 100.0, 0.0, Decision::Hold).confidence(), 1.0);
        assert_relative_eq!(
            Signal::new(0, 110.0, 2.0, Decision::Hold).confidence(),
            0.0455,
            epsilon = 1e-3
        );
    }

    #[test]
    fn test_decision_display_and_serde() {
        assert_eq!(Decision::Buy.to_string(), "BUY");
        assert_eq!(Decision::Hold.to_string(), "HOLD");
        assert_eq!(serde_json::to_string(&Decision::Sell).unwrap(), "\"SELL\"");
    }
}
