use serde::{Deserialize, Serialize};
use std::fmt;

use super::position::{Position, Side};

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    MeanRevert,
    StopLoss,
    /// Opposite signal while the mean exit is disabled
    OppositeSignal,
    EndOfSeries,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::MeanRevert => write!(f, "MEAN_REVERT"),
            ExitReason::StopLoss => write!(f, "STOP_LOSS"),
            ExitReason::OppositeSignal => write!(f, "OPPOSITE_SIGNAL"),
            ExitReason::EndOfSeries => write!(f, "END_OF_SERIES"),
        }
    }
}

/// A closed round trip. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_index: usize,
    pub exit_index: usize,
    pub size: f64,
    pub pnl: f64,
    pub exit_reason: ExitReason,
}

impl Trade {
    /// Close `position` at `exit_price` on bar `exit_index`
    pub fn close(position: &Position, exit_price: f64, exit_index: usize, exit_reason: ExitReason) -> Self {
        Self {
            side: position.side,
            entry_price: position.entry_price,
            exit_price,
            entry_index: position.entry_index,
            exit_index,
            size: position.size,
            pnl: position.pnl_at(exit_price),
            exit_reason,
        }
    }

    /// PnL relative to the notional committed at entry
    pub fn return_pct(&self) -> f64 {
        let notional = (self.entry_price * self.size).abs();
        if notional == 0.0 {
            return 0.0;
        }
        self.pnl / notional
    }

    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }

    /// Number of bars the position was held
    pub fn bars_held(&self) -> usize {
        self.exit_index.saturating_sub(self.entry_index)
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.4} @ {:.4} [{}] -> {:.4} [{}] pnl {:+.4} ({})",
            self.side,
            self.size,
            self.entry_price,
            self.entry_index,
            self.exit_price,
            self.exit_index,
            self.pnl,
            self.exit_reason
        )
    }
}
