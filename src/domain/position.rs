use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Long,
    Short,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// An open position inside one backtest run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: Side,
    pub entry_price: f64,
    pub entry_index: usize,
    pub size: f64,
    pub stop_loss_price: f64,
}

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("Invalid size: {0}")]
    InvalidSize(f64),
    #[error("Invalid entry price: {0}")]
    InvalidEntryPrice(f64),
    #[error("Invalid stop loss price: {0}")]
    InvalidStopLoss(f64),
}

impl Position {
    pub fn open(
        side: Side,
        entry_price: f64,
        entry_index: usize,
        size: f64,
        stop_loss_price: f64,
    ) -> Result<Self, PositionError> {
        if !size.is_finite() || size <= 0.0 {
            return Err(PositionError::InvalidSize(size));
        }
        if !entry_price.is_finite() {
            return Err(PositionError::InvalidEntryPrice(entry_price));
        }
        // The stop may already be breached at entry when the deviation is
        // deeper than the stop band; the next bar closes it out.
        if !stop_loss_price.is_finite() {
            return Err(PositionError::InvalidStopLoss(stop_loss_price));
        }

        Ok(Self {
            side,
            entry_price,
            entry_index,
            size,
            stop_loss_price,
        })
    }

    /// Mark-to-market PnL at `price`
    pub fn pnl_at(&self, price: f64) -> f64 {
        match self.side {
            Side::Long => (price - self.entry_price) * self.size,
            Side::Short => (self.entry_price - price) * self.size,
        }
    }

    pub fn stop_hit(&self, price: f64) -> bool {
        match self.side {
            Side::Long => price <= self.stop_loss_price,
            Side::Short => price >= self.stop_loss_price,
        }
    }

    /// Adverse move from entry as a fraction of the entry price
    pub fn loss_fraction(&self, price: f64) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        let adverse = match self.side {
            Side::Long => self.entry_price - price,
            Side::Short => price - self.entry_price,
        };
        adverse / self.entry_price.abs()
    }

    /// Price has crossed back to (or through) the mean
    pub fn reverted(&self, price: f64, mean: f64) -> bool {
        match self.side {
            Side::Long => price >= mean,
            Side::Short => price <= mean,
        }
    }
}

/// Position slot of a backtest run: at most one position is open at a time
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum PositionState {
    #[default]
    Flat,
    Open(Position),
}

impl PositionState {
    pub fn is_flat(&self) -> bool {
        matches!(self, PositionState::Flat)
    }

    pub fn position(&self) -> Option<&Position> {
        match self {
            PositionState::Flat => None,
            PositionState::Open(position) => Some(position),
        }
    }

    pub fn side(&self) -> Option<Side> {
        self.position().map(|p| p.side)
    }
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionState::Flat => write!(f, "FLAT"),
            PositionState::Open(position) => write!(f, "{}", position.side),
        }
    }
}
