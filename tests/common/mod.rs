#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use stratsearch::domain::analysis::{Insight, MarketAnalyzer, Trend};
pub use stratsearch::domain::bar::MarketBar;
use stratsearch::domain::backtest::BacktestConfig;
use stratsearch::domain::error::StratsearchError;
use stratsearch::domain::risk::RiskGate;
use stratsearch::domain::search::parameters::ParameterSet;
use stratsearch::domain::series::{into_historical, AssetSeries, HistoricalData};
use stratsearch::domain::sizing::{SizingContext, TradeSizer};
use stratsearch::domain::portfolio::PortfolioSnapshot;
use stratsearch::domain::strategy::{Collaborators, StrategyFactory};
use stratsearch::ports::data_port::DataPort;

pub const DAY: i64 = 86_400_000;
/// 2024-01-01T00:00:00Z
pub const T0: i64 = 1_704_067_200_000;

pub struct MockDataPort {
    pub data: BTreeMap<String, Vec<MarketBar>>,
    pub errors: BTreeMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
            errors: BTreeMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<MarketBar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn load_series(&self, symbol: &str, start: i64, end: i64) -> Result<AssetSeries, StratsearchError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(StratsearchError::Data {
                reason: reason.clone(),
            });
        }
        let bars: Vec<MarketBar> = self
            .data
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.timestamp >= start && b.timestamp <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if bars.is_empty() {
            return Err(StratsearchError::NoData {
                asset: symbol.to_string(),
            });
        }
        AssetSeries::new(symbol, bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, StratsearchError> {
        Ok(self.data.keys().cloned().collect())
    }
}

pub fn make_bar(timestamp: i64, close: f64) -> MarketBar {
    MarketBar {
        timestamp,
        open: close,
        high: close + 1.0,
        low: (close - 1.0).max(0.0),
        close,
        volume: 1000.0,
    }
}

/// One bar per day from `T0`, closes following `closes`.
pub fn bars_from_closes(closes: &[f64]) -> Vec<MarketBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_bar(T0 + i as i64 * DAY, c))
        .collect()
}

/// Daily bars drifting by `step` per day.
pub fn trending_bars(count: usize, start_price: f64, step: f64) -> Vec<MarketBar> {
    let closes: Vec<f64> = (0..count).map(|i| start_price + step * i as f64).collect();
    bars_from_closes(&closes)
}

/// Daily bars oscillating around `base`, enough to turn EMA crossovers.
pub fn wave_bars(count: usize, base: f64, amplitude: f64) -> Vec<MarketBar> {
    let closes: Vec<f64> = (0..count)
        .map(|i| base + amplitude * (i as f64 / 5.0).sin())
        .collect();
    bars_from_closes(&closes)
}

pub fn historical(series: Vec<(&str, Vec<MarketBar>)>) -> Arc<HistoricalData> {
    let series = series
        .into_iter()
        .map(|(symbol, bars)| AssetSeries::new(symbol, bars).unwrap())
        .collect();
    Arc::new(into_historical(series).unwrap())
}

pub fn sample_config(days: i64) -> BacktestConfig {
    BacktestConfig::new(T0, T0 + (days - 1) * DAY, 10_000.0)
}

/// Bullish at full confidence on every bar.
pub struct AlwaysBullish;

impl MarketAnalyzer for AlwaysBullish {
    fn analyze(&self, asset: &str, window: &[MarketBar]) -> Result<Insight, StratsearchError> {
        let last = window.last().ok_or_else(|| StratsearchError::Analysis {
            asset: asset.to_string(),
            reason: "empty window".into(),
        })?;
        Ok(Insight {
            asset: asset.to_string(),
            timestamp: last.timestamp,
            trend: Trend::Bullish,
            confidence: 1.0,
            reference_price: Some(last.close),
            signals: Vec::new(),
        })
    }
}

/// Buys a fixed number of units on bullish insights.
pub struct FixedUnits(pub f64);

impl TradeSizer for FixedUnits {
    fn size(&self, _asset: &str, insight: &Insight, _price: f64, _ctx: &SizingContext) -> f64 {
        match insight.trend {
            Trend::Bullish => self.0,
            _ => 0.0,
        }
    }
}

pub struct AllowAll;

impl RiskGate for AllowAll {
    fn update_portfolio(&mut self, _snapshot: &PortfolioSnapshot) {}

    fn can_open_position(&self, _asset: &str, _amount: f64, _price: f64) -> bool {
        true
    }
}

/// Buys `units` (default 1) of every asset on every bar.
pub struct AccumulatorFactory;

impl StrategyFactory for AccumulatorFactory {
    fn build(&self, params: &ParameterSet) -> Result<Collaborators, StratsearchError> {
        let units = params.get("units").unwrap_or(1.0);
        if units < 0.0 {
            return Err(StratsearchError::InvalidParameter {
                name: "units".into(),
                reason: "must be non-negative".into(),
            });
        }
        Ok(Collaborators {
            analyzer: Box::new(AlwaysBullish),
            sizer: Box::new(FixedUnits(units)),
            risk_gate: Box::new(AllowAll),
        })
    }

    fn tag(&self) -> String {
        "accumulator".into()
    }
}
