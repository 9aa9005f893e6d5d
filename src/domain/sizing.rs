//! Trade sizing and fill simulation.
//!
//! The sizer turns an insight into a signed unit amount; execution costs
//! turn a market price into a fill price and a commission.

use super::analysis::{Insight, Trend};
use super::trade::Side;

/// Portfolio facts a sizer may consult.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingContext {
    pub total_value: f64,
    pub cash: f64,
    /// Units of the asset currently held.
    pub held: f64,
}

pub trait TradeSizer: Send + Sync {
    /// Signed amount in units: positive buys, negative sells, zero does nothing.
    fn size(&self, asset: &str, insight: &Insight, price: f64, ctx: &SizingContext) -> f64;
}

/// Buys a confidence-scaled slice of the portfolio on bullish insights and
/// exits the whole holding on bearish ones.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceSizer {
    /// Fraction of total value committed at full confidence.
    pub position_size: f64,
    /// Insights below this confidence are ignored.
    pub min_confidence: f64,
}

impl Default for ConfidenceSizer {
    fn default() -> Self {
        ConfidenceSizer {
            position_size: 0.25,
            min_confidence: 0.1,
        }
    }
}

impl TradeSizer for ConfidenceSizer {
    fn size(&self, _asset: &str, insight: &Insight, price: f64, ctx: &SizingContext) -> f64 {
        if price <= 0.0 || insight.confidence < self.min_confidence {
            return 0.0;
        }
        match insight.trend {
            Trend::Bullish => {
                let notional = ctx.total_value * self.position_size * insight.confidence;
                (notional.min(ctx.cash) / price).max(0.0)
            }
            Trend::Bearish => -ctx.held,
            Trend::Neutral => 0.0,
        }
    }
}

/// Commission and slippage applied to every simulated fill.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionCosts {
    pub commission_per_trade: f64,
    pub commission_pct: f64,
    pub slippage_pct: f64,
}

impl ExecutionCosts {
    /// flat_fee + (trade_value * pct / 100)
    pub fn commission(&self, trade_value: f64) -> f64 {
        self.commission_per_trade + trade_value * self.commission_pct / 100.0
    }

    /// Buys fill above the market, sells below.
    pub fn fill_price(&self, market_price: f64, side: Side) -> f64 {
        match side {
            Side::Buy => market_price * (1.0 + self.slippage_pct / 100.0),
            Side::Sell => market_price * (1.0 - self.slippage_pct / 100.0),
        }
    }

    /// Largest buy amount whose notional plus commission fits in `cash`.
    pub fn affordable_units(&self, cash: f64, fill_price: f64) -> f64 {
        if fill_price <= 0.0 {
            return 0.0;
        }
        let spendable = (cash - self.commission_per_trade) / (1.0 + self.commission_pct / 100.0);
        (spendable / fill_price).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analysis::Insight;

    fn insight(trend: Trend, confidence: f64) -> Insight {
        Insight {
            trend,
            confidence,
            ..Insight::neutral("BTC", 0, Some(100.0))
        }
    }

    fn ctx(held: f64) -> SizingContext {
        SizingContext {
            total_value: 10_000.0,
            cash: 5_000.0,
            held,
        }
    }

    #[test]
    fn bullish_buys_scaled_slice() {
        let sizer = ConfidenceSizer {
            position_size: 0.2,
            min_confidence: 0.1,
        };
        let amount = sizer.size("BTC", &insight(Trend::Bullish, 0.5), 100.0, &ctx(0.0));
        // 10_000 * 0.2 * 0.5 / 100
        assert!((amount - 10.0).abs() < 1e-9);
    }

    #[test]
    fn bullish_is_capped_by_cash() {
        let sizer = ConfidenceSizer {
            position_size: 1.0,
            min_confidence: 0.0,
        };
        let amount = sizer.size("BTC", &insight(Trend::Bullish, 1.0), 100.0, &ctx(0.0));
        assert!((amount - 50.0).abs() < 1e-9);
    }

    #[test]
    fn bearish_exits_holding() {
        let sizer = ConfidenceSizer::default();
        let amount = sizer.size("BTC", &insight(Trend::Bearish, 0.9), 100.0, &ctx(3.0));
        assert!((amount + 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn low_confidence_and_neutral_do_nothing() {
        let sizer = ConfidenceSizer::default();
        assert_eq!(sizer.size("BTC", &insight(Trend::Bullish, 0.05), 100.0, &ctx(0.0)), 0.0);
        assert_eq!(sizer.size("BTC", &insight(Trend::Neutral, 0.9), 100.0, &ctx(1.0)), 0.0);
        assert_eq!(sizer.size("BTC", &insight(Trend::Bullish, 0.9), 0.0, &ctx(0.0)), 0.0);
    }

    #[test]
    fn commission_flat_plus_pct() {
        let costs = ExecutionCosts {
            commission_per_trade: 10.0,
            commission_pct: 0.1,
            slippage_pct: 0.0,
        };
        assert!((costs.commission(10_000.0) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn slippage_moves_against_trader() {
        let costs = ExecutionCosts {
            slippage_pct: 1.0,
            ..ExecutionCosts::default()
        };
        assert!((costs.fill_price(100.0, Side::Buy) - 101.0).abs() < 1e-9);
        assert!((costs.fill_price(100.0, Side::Sell) - 99.0).abs() < 1e-9);
    }

    #[test]
    fn affordable_units_covers_commission() {
        let costs = ExecutionCosts {
            commission_per_trade: 10.0,
            commission_pct: 1.0,
            slippage_pct: 0.0,
        };
        let units = costs.affordable_units(1_020.0, 10.0);
        let spent = units * 10.0 + costs.commission(units * 10.0);
        assert!((spent - 1_020.0).abs() < 1e-9);
    }
}
