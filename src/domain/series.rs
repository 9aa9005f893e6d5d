//! Per-asset bar series and the unified master timeline.

use crate::domain::bar::MarketBar;
use crate::domain::error::StratsearchError;
use std::collections::{BTreeMap, BTreeSet};

/// Ordered bars for one asset. Timestamps are strictly increasing.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetSeries {
    pub symbol: String,
    bars: Vec<MarketBar>,
}

impl AssetSeries {
    pub fn new(symbol: impl Into<String>, bars: Vec<MarketBar>) -> Result<Self, StratsearchError> {
        let symbol = symbol.into();
        if let Some(w) = bars.windows(2).find(|w| w[1].timestamp <= w[0].timestamp) {
            return Err(StratsearchError::InvalidSeries {
                asset: symbol,
                reason: format!(
                    "timestamps not strictly increasing at {} -> {}",
                    w[0].timestamp, w[1].timestamp
                ),
            });
        }
        if let Some(bar) = bars.iter().find(|b| !b.is_well_formed()) {
            return Err(StratsearchError::InvalidSeries {
                asset: symbol,
                reason: format!("malformed bar at {}", bar.timestamp),
            });
        }
        Ok(Self { symbol, bars })
    }

    pub fn bars(&self) -> &[MarketBar] {
        &self.bars
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    /// All bars with timestamp <= `t`. Never exposes a bar from the future.
    pub fn visible_at(&self, t: i64) -> &[MarketBar] {
        let end = self.bars.partition_point(|b| b.timestamp <= t);
        &self.bars[..end]
    }

    /// Most recent bar at or before `t` (carry-forward).
    pub fn last_at(&self, t: i64) -> Option<&MarketBar> {
        self.visible_at(t).last()
    }

    /// Bar stamped exactly at `t`, if any.
    pub fn bar_at(&self, t: i64) -> Option<&MarketBar> {
        self.bars
            .binary_search_by_key(&t, |b| b.timestamp)
            .ok()
            .map(|i| &self.bars[i])
    }
}

/// Read-only historical data for a run, keyed by symbol.
pub type HistoricalData = BTreeMap<String, AssetSeries>;

/// Collect series into a symbol-keyed map, rejecting duplicate symbols.
pub fn into_historical(series: Vec<AssetSeries>) -> Result<HistoricalData, StratsearchError> {
    let mut data = HistoricalData::new();
    for s in series {
        if data.contains_key(&s.symbol) {
            return Err(StratsearchError::InvalidSeries {
                asset: s.symbol,
                reason: "duplicate symbol".into(),
            });
        }
        data.insert(s.symbol.clone(), s);
    }
    Ok(data)
}

/// Sorted set of every distinct timestamp across all series within `[start, end]`.
pub fn build_timeline(data: &HistoricalData, start: i64, end: i64) -> Vec<i64> {
    let unique: BTreeSet<i64> = data
        .values()
        .flat_map(|s| s.bars.iter().map(|b| b.timestamp))
        .filter(|&t| t >= start && t <= end)
        .collect();
    unique.into_iter().collect()
}
