//! Portfolio snapshots and the mutable ledger behind them.

use std::collections::BTreeMap;

use super::error::StratsearchError;
use super::trade::{Side, Trade};

const DUST: f64 = 1e-9;
/// Relative slack on cash checks; covers rounding in sizing at large balances.
const CASH_TOLERANCE: f64 = 1e-12;

/// Immutable view of the portfolio at one point in simulated time.
///
/// `positions` holds asset units, `allocation` their market value at
/// `timestamp`. `total_value = cash + sum(allocation)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioSnapshot {
    pub timestamp: i64,
    pub total_value: f64,
    pub cash: f64,
    pub positions: BTreeMap<String, f64>,
    pub allocation: BTreeMap<String, f64>,
    pub risk_score: f64,
    pub recommendations: Vec<String>,
}

impl PortfolioSnapshot {
    pub fn cash_only(timestamp: i64, cash: f64) -> Self {
        PortfolioSnapshot {
            timestamp,
            total_value: cash.max(0.0),
            cash: cash.max(0.0),
            positions: BTreeMap::new(),
            allocation: BTreeMap::new(),
            risk_score: 0.0,
            recommendations: Vec::new(),
        }
    }

    /// Add a holding of `units` valued at `price` per unit.
    pub fn with_position(mut self, asset: &str, units: f64, price: f64) -> Self {
        let units = units.max(0.0);
        let value = units * price.max(0.0);
        self.positions.insert(asset.to_string(), units);
        self.allocation.insert(asset.to_string(), value);
        self.total_value = self.cash + self.allocation.values().sum::<f64>();
        self
    }

    /// Build a snapshot directly from per-asset values, as the rebalancer
    /// sees a portfolio. Units are left empty.
    pub fn from_values(timestamp: i64, cash: f64, allocation: BTreeMap<String, f64>) -> Self {
        let allocation: BTreeMap<String, f64> = allocation
            .into_iter()
            .map(|(k, v)| (k, v.max(0.0)))
            .collect();
        let cash = cash.max(0.0);
        PortfolioSnapshot {
            timestamp,
            total_value: cash + allocation.values().sum::<f64>(),
            cash,
            positions: BTreeMap::new(),
            allocation,
            risk_score: 0.0,
            recommendations: Vec::new(),
        }
    }

    /// Allocation as fractions of total value. Empty when total value is zero.
    pub fn weights(&self) -> BTreeMap<String, f64> {
        if self.total_value <= 0.0 {
            return BTreeMap::new();
        }
        self.allocation
            .iter()
            .map(|(asset, value)| (asset.clone(), value / self.total_value))
            .collect()
    }

    pub fn weight_of(&self, asset: &str) -> f64 {
        if self.total_value <= 0.0 {
            return 0.0;
        }
        self.allocation.get(asset).copied().unwrap_or(0.0) / self.total_value
    }
}

/// Mutable holdings for a single run.
#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    pub cash: f64,
    positions: BTreeMap<String, f64>,
    marks: BTreeMap<String, f64>,
}

impl Ledger {
    /// Start from a snapshot, seeding per-asset marks from its implied prices.
    pub fn from_snapshot(snapshot: &PortfolioSnapshot) -> Self {
        let mut marks = BTreeMap::new();
        for (asset, &units) in &snapshot.positions {
            if units > 0.0 {
                let value = snapshot.allocation.get(asset).copied().unwrap_or(0.0);
                marks.insert(asset.clone(), value / units);
            }
        }
        Ledger {
            cash: snapshot.cash,
            positions: snapshot
                .positions
                .iter()
                .filter(|(_, u)| **u > 0.0)
                .map(|(a, u)| (a.clone(), *u))
                .collect(),
            marks,
        }
    }

    pub fn holding(&self, asset: &str) -> f64 {
        self.positions.get(asset).copied().unwrap_or(0.0)
    }

    pub fn mark(&mut self, asset: &str, price: f64) {
        self.marks.insert(asset.to_string(), price);
    }

    pub fn price_of(&self, asset: &str) -> Option<f64> {
        self.marks.get(asset).copied()
    }

    pub fn market_value(&self, asset: &str) -> f64 {
        self.holding(asset) * self.price_of(asset).unwrap_or(0.0)
    }

    pub fn total_value(&self) -> f64 {
        self.cash
            + self
                .positions
                .keys()
                .map(|asset| self.market_value(asset))
                .sum::<f64>()
    }

    /// Apply a filled trade and its commission to cash and holdings.
    pub fn apply(&mut self, trade: &Trade, commission: f64) -> Result<(), StratsearchError> {
        let notional = trade.notional();
        match trade.side {
            Side::Buy => {
                let cost = notional + commission;
                if cost > self.cash * (1.0 + CASH_TOLERANCE) + DUST {
                    return Err(StratsearchError::TradeRejected {
                        asset: trade.asset.clone(),
                        reason: format!("buy cost {cost:.6} exceeds cash {:.6}", self.cash),
                    });
                }
                self.cash = (self.cash - cost).max(0.0);
                *self.positions.entry(trade.asset.clone()).or_insert(0.0) += trade.amount;
            }
            Side::Sell => {
                let held = self.holding(&trade.asset);
                if trade.amount > held + DUST {
                    return Err(StratsearchError::TradeRejected {
                        asset: trade.asset.clone(),
                        reason: format!("sell {} exceeds holding {held}", trade.amount),
                    });
                }
                if commission > notional {
                    return Err(StratsearchError::TradeRejected {
                        asset: trade.asset.clone(),
                        reason: format!(
                            "commission {commission:.6} exceeds proceeds {notional:.6}"
                        ),
                    });
                }
                self.cash += notional - commission;
                let remaining = held - trade.amount;
                if remaining <= DUST {
                    self.positions.remove(&trade.asset);
                } else {
                    self.positions.insert(trade.asset.clone(), remaining);
                }
            }
        }
        self.marks.entry(trade.asset.clone()).or_insert(trade.price);
        Ok(())
    }

    /// Value every holding at its latest mark.
    pub fn snapshot(&self, timestamp: i64) -> PortfolioSnapshot {
        let allocation: BTreeMap<String, f64> = self
            .positions
            .keys()
            .map(|asset| (asset.clone(), self.market_value(asset)))
            .collect();
        PortfolioSnapshot {
            timestamp,
            total_value: self.cash + allocation.values().sum::<f64>(),
            cash: self.cash,
            positions: self.positions.clone(),
            allocation,
            risk_score: 0.0,
            recommendations: Vec::new(),
        }
    }
}
