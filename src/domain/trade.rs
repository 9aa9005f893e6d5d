//! Trade records.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Side implied by a signed amount; `None` for zero.
    pub fn from_signed(amount: f64) -> Option<Side> {
        if amount > 0.0 {
            Some(Side::Buy)
        } else if amount < 0.0 {
            Some(Side::Sell)
        } else {
            None
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.pad("buy"),
            Side::Sell => f.pad("sell"),
        }
    }
}

/// An executed (or proposed) trade. `amount` is in asset units and always positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub asset: String,
    pub side: Side,
    pub amount: f64,
    pub price: f64,
    pub timestamp: i64,
    pub strategy_tag: String,
    pub execution_tag: String,
}

impl Trade {
    pub fn notional(&self) -> f64 {
        self.amount * self.price
    }

    /// Per-unit profit of closing `earlier` with `self`.
    ///
    /// Buy then sell earns `self.price - earlier.price`; sell then buy earns
    /// `earlier.price - self.price`. Same-side pairs realize nothing.
    pub fn profit_against(&self, earlier: &Trade) -> Option<f64> {
        match (earlier.side, self.side) {
            (Side::Buy, Side::Sell) => Some(self.price - earlier.price),
            (Side::Sell, Side::Buy) => Some(earlier.price - self.price),
            _ => None,
        }
    }
}
