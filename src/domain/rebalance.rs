//! Single-shot portfolio rebalancing toward target weights.

use super::analysis::{Insight, Trend};
use super::clock::Clock;
use super::error::StratsearchError;
use super::portfolio::PortfolioSnapshot;
use super::series::HistoricalData;
use super::trade::{Side, Trade};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

pub const REBALANCE_TAG: &str = "rebalance";
pub const PLANNED_TAG: &str = "planned";

/// Weight applied to deviation when no directional view is available.
const NEUTRAL_ADJUSTMENT: f64 = 0.5;

/// Fallback price source for assets without a quote in their insight.
pub trait PriceEstimator {
    fn estimate_price(&self, asset: &str, insight: Option<&Insight>) -> Option<f64>;
}

/// Latest close at or before `as_of`.
pub struct LastClosePriceEstimator {
    data: Arc<HistoricalData>,
    as_of: i64,
}

impl LastClosePriceEstimator {
    pub fn new(data: Arc<HistoricalData>, as_of: i64) -> Self {
        LastClosePriceEstimator { data, as_of }
    }
}

impl PriceEstimator for LastClosePriceEstimator {
    fn estimate_price(&self, asset: &str, _insight: Option<&Insight>) -> Option<f64> {
        self.data
            .get(asset)
            .and_then(|series| series.last_at(self.as_of))
            .map(|bar| bar.close)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FixedPriceEstimator {
    pub prices: BTreeMap<String, f64>,
}

impl FixedPriceEstimator {
    pub fn with(mut self, asset: &str, price: f64) -> Self {
        self.prices.insert(asset.to_string(), price);
        self
    }
}

impl PriceEstimator for FixedPriceEstimator {
    fn estimate_price(&self, asset: &str, _insight: Option<&Insight>) -> Option<f64> {
        self.prices.get(asset).copied()
    }
}

/// Relative gap between current and target value. A fully unwanted holding
/// counts as deviation 1; an asset absent on both sides has none.
pub fn deviation(current: f64, target: f64) -> Option<f64> {
    if target > 0.0 {
        Some((current - target) / target)
    } else if current > 0.0 {
        Some(1.0)
    } else {
        None
    }
}

/// Confidence when bullish, its complement when bearish, one half otherwise.
pub fn trend_adjustment(insight: Option<&Insight>) -> f64 {
    match insight {
        Some(i) if i.trend == Trend::Bullish => i.confidence,
        Some(i) if i.trend == Trend::Bearish => 1.0 - i.confidence,
        _ => NEUTRAL_ADJUSTMENT,
    }
}

pub struct Rebalancer<'a> {
    estimator: &'a dyn PriceEstimator,
    clock: &'a dyn Clock,
}

impl<'a> Rebalancer<'a> {
    pub fn new(estimator: &'a dyn PriceEstimator, clock: &'a dyn Clock) -> Self {
        Rebalancer { estimator, clock }
    }

    fn validate(targets: &BTreeMap<String, f64>, threshold: f64) -> Result<(), StratsearchError> {
        let invalid = |name: &str, reason: String| StratsearchError::InvalidParameter {
            name: name.to_string(),
            reason,
        };
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(invalid("threshold", format!("must be non-negative, got {threshold}")));
        }
        for (asset, weight) in targets {
            if !(0.0..=1.0).contains(weight) {
                return Err(invalid(asset, format!("target weight {weight} outside [0, 1]")));
            }
        }
        let total: f64 = targets.values().sum();
        if total > 1.0 + 1e-9 {
            return Err(invalid("targets", format!("weights sum to {total}, above 1")));
        }
        Ok(())
    }

    /// Trades that move `current` toward `targets`, highest priority first.
    ///
    /// Only assets whose absolute deviation exceeds `threshold` trade. Prices
    /// come from each insight's reference price, else the estimator; assets
    /// with no usable price are skipped.
    pub fn rebalance(
        &self,
        current: &PortfolioSnapshot,
        targets: &BTreeMap<String, f64>,
        threshold: f64,
        insights: &BTreeMap<String, Insight>,
    ) -> Result<Vec<Trade>, StratsearchError> {
        Self::validate(targets, threshold)?;
        if current.total_value <= 0.0 {
            warn!("portfolio has no value; nothing to rebalance");
            return Ok(Vec::new());
        }

        let assets: BTreeSet<&String> = current.allocation.keys().chain(targets.keys()).collect();
        let timestamp = self.clock.now_ms();
        let mut planned: Vec<(f64, Trade)> = Vec::new();

        for asset in assets {
            let current_value = current.allocation.get(asset).copied().unwrap_or(0.0);
            let target_value = targets.get(asset).copied().unwrap_or(0.0) * current.total_value;
            let Some(dev) = deviation(current_value, target_value) else {
                continue;
            };
            if dev.abs() <= threshold {
                continue;
            }

            let insight = insights.get(asset);
            let price = insight
                .and_then(|i| i.reference_price)
                .or_else(|| self.estimator.estimate_price(asset, insight));
            let Some(price) = price.filter(|p| p.is_finite() && *p > 0.0) else {
                warn!(asset = %asset, "no usable price estimate, skipping");
                continue;
            };

            let gap = target_value - current_value;
            let side = if gap > 0.0 { Side::Buy } else { Side::Sell };
            let priority = dev.abs() * trend_adjustment(insight);
            debug!(asset = %asset, deviation = dev, priority, "rebalance candidate");
            planned.push((
                priority,
                Trade {
                    id: String::new(),
                    asset: asset.clone(),
                    side,
                    amount: gap.abs() / price,
                    price,
                    timestamp,
                    strategy_tag: REBALANCE_TAG.into(),
                    execution_tag: PLANNED_TAG.into(),
                },
            ));
        }

        planned.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(planned
            .into_iter()
            .enumerate()
            .map(|(i, (_, trade))| Trade {
                id: format!("{REBALANCE_TAG}-{:04}", i + 1),
                ..trade
            })
            .collect())
    }
}
