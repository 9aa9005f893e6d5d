//! Performance and risk analytics over a run's trade and snapshot history.
//!
//! Every metric tolerates empty or single-element histories and returns 0
//! instead of NaN or infinity.

use super::bar::day_of;
use super::portfolio::PortfolioSnapshot;
use super::trade::{Side, Trade};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02;
const DAYS_PER_YEAR: f64 = 365.0;

/// How trades are paired into round trips for the win rate.
///
/// `Adjacent` pairs each trade with the previous trade on the same asset. It
/// mispairs interleaved lots when more than one position per asset is open.
/// `Fifo` matches closing quantity against the oldest open lots first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WinRateMethod {
    #[default]
    Adjacent,
    Fifo,
}

impl FromStr for WinRateMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "adjacent" => Ok(WinRateMethod::Adjacent),
            "fifo" => Ok(WinRateMethod::Fifo),
            other => Err(format!("unknown win rate method '{other}' (expected adjacent or fifo)")),
        }
    }
}

impl fmt::Display for WinRateMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WinRateMethod::Adjacent => write!(f, "adjacent"),
            WinRateMethod::Fifo => write!(f, "fifo"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PerformanceReport {
    pub total_return: f64,
    pub win_rate: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub trades: usize,
}

/// Pearson correlation of per-asset allocation-weight series.
///
/// Weights stand in for price series here; this measures how the holdings
/// moved together, not how the markets did.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CorrelationMatrix {
    pub assets: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.assets.iter().position(|x| x == a)?;
        let j = self.assets.iter().position(|x| x == b)?;
        Some(self.values[i][j])
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RiskMetrics {
    pub value_at_risk_95: f64,
    pub expected_shortfall_95: f64,
    pub value_at_risk_99: f64,
    pub expected_shortfall_99: f64,
    pub diversification_score: f64,
    pub correlation: CorrelationMatrix,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetSummary {
    pub asset: String,
    pub trades: usize,
    pub buys: usize,
    pub sells: usize,
    pub notional: f64,
}

/// Accumulates one run's trades and snapshots. Owned by a single runner.
#[derive(Debug, Clone)]
pub struct PerformanceAnalyzer {
    initial: PortfolioSnapshot,
    trades: Vec<Trade>,
    snapshots: Vec<PortfolioSnapshot>,
    risk_free_rate: f64,
    win_rate_method: WinRateMethod,
}

impl PerformanceAnalyzer {
    pub fn new(initial: PortfolioSnapshot, risk_free_rate: f64, win_rate_method: WinRateMethod) -> Self {
        PerformanceAnalyzer {
            initial,
            trades: Vec::new(),
            snapshots: Vec::new(),
            risk_free_rate,
            win_rate_method,
        }
    }

    pub fn record_trade(&mut self, trade: Trade) {
        self.trades.push(trade);
    }

    pub fn record_snapshot(&mut self, snapshot: PortfolioSnapshot) {
        self.snapshots.push(snapshot);
    }

    pub fn initial(&self) -> &PortfolioSnapshot {
        &self.initial
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn snapshots(&self) -> &[PortfolioSnapshot] {
        &self.snapshots
    }

    pub fn latest(&self) -> &PortfolioSnapshot {
        self.snapshots.last().unwrap_or(&self.initial)
    }

    pub fn total_return(&self) -> f64 {
        let base = self.initial.total_value;
        if base <= 0.0 {
            return 0.0;
        }
        (self.latest().total_value - base) / base
    }

    /// Largest fractional decline from the running peak, in [0, 1].
    pub fn max_drawdown(&self) -> f64 {
        let mut peak = self.initial.total_value;
        let mut max_dd = 0.0_f64;
        for s in &self.snapshots {
            if s.total_value > peak {
                peak = s.total_value;
            } else if peak > 0.0 {
                max_dd = max_dd.max((peak - s.total_value) / peak);
            }
        }
        max_dd.clamp(0.0, 1.0)
    }

    /// Last observed value per UTC calendar day, in day order.
    pub fn daily_values(&self) -> Vec<(NaiveDate, f64)> {
        let mut by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for s in &self.snapshots {
            if let Some(day) = day_of(s.timestamp) {
                by_day.insert(day, s.total_value);
            }
        }
        by_day.into_iter().collect()
    }

    pub fn daily_returns(&self) -> Vec<f64> {
        self.daily_values()
            .windows(2)
            .map(|w| {
                let prev = w[0].1;
                let curr = w[1].1;
                if prev > 0.0 { (curr - prev) / prev } else { 0.0 }
            })
            .collect()
    }

    /// Daily (not annualised) Sharpe ratio against `risk_free_rate / 365`.
    pub fn sharpe_ratio(&self) -> f64 {
        let returns = self.daily_returns();
        if returns.is_empty() {
            return 0.0;
        }
        let (mean, stddev) = mean_stddev(&returns);
        if stddev > 0.0 {
            (mean - self.risk_free_rate / DAYS_PER_YEAR) / stddev
        } else {
            0.0
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.trades.is_empty() {
            return 0.0;
        }
        let wins = match self.win_rate_method {
            WinRateMethod::Adjacent => adjacent_wins(&self.trades),
            WinRateMethod::Fifo => fifo_wins(&self.trades),
        };
        wins as f64 / self.trades.len() as f64
    }

    /// Empirical `(1 - confidence)` quantile of daily returns, negated.
    pub fn value_at_risk(&self, confidence: f64) -> f64 {
        let sorted = sorted_returns(self.daily_returns());
        match var_index(sorted.len(), confidence) {
            Some(i) => -sorted[i],
            None => 0.0,
        }
    }

    /// Mean of daily returns strictly worse than the VaR threshold, negated.
    pub fn expected_shortfall(&self, confidence: f64) -> f64 {
        let sorted = sorted_returns(self.daily_returns());
        let Some(i) = var_index(sorted.len(), confidence) else {
            return 0.0;
        };
        let threshold = sorted[i];
        let tail: Vec<f64> = sorted.iter().copied().filter(|&r| r < threshold).collect();
        if tail.is_empty() {
            return 0.0;
        }
        -(tail.iter().sum::<f64>() / tail.len() as f64)
    }

    pub fn correlation_matrix(&self) -> CorrelationMatrix {
        let assets: Vec<String> = self
            .snapshots
            .iter()
            .flat_map(|s| s.allocation.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let series: Vec<Vec<f64>> = assets
            .iter()
            .map(|a| self.snapshots.iter().map(|s| s.weight_of(a)).collect())
            .collect();
        let values = series
            .iter()
            .map(|x| series.iter().map(|y| pearson(x, y)).collect())
            .collect();
        CorrelationMatrix { assets, values }
    }

    /// `1 - sum(w^2)` over the latest allocation.
    pub fn diversification_score(&self) -> f64 {
        let allocation = &self.latest().allocation;
        let total: f64 = allocation.values().sum();
        if total <= 0.0 {
            return 0.0;
        }
        1.0 - allocation.values().map(|v| (v / total).powi(2)).sum::<f64>()
    }

    pub fn report(&self) -> PerformanceReport {
        PerformanceReport {
            total_return: self.total_return(),
            win_rate: self.win_rate(),
            sharpe_ratio: self.sharpe_ratio(),
            max_drawdown: self.max_drawdown(),
            trades: self.trades.len(),
        }
    }

    pub fn risk_metrics(&self) -> RiskMetrics {
        RiskMetrics {
            value_at_risk_95: self.value_at_risk(0.95),
            expected_shortfall_95: self.expected_shortfall(0.95),
            value_at_risk_99: self.value_at_risk(0.99),
            expected_shortfall_99: self.expected_shortfall(0.99),
            diversification_score: self.diversification_score(),
            correlation: self.correlation_matrix(),
        }
    }

    pub fn asset_summaries(&self) -> Vec<AssetSummary> {
        let mut by_asset: BTreeMap<&str, AssetSummary> = BTreeMap::new();
        for t in &self.trades {
            let entry = by_asset.entry(&t.asset).or_insert_with(|| AssetSummary {
                asset: t.asset.clone(),
                trades: 0,
                buys: 0,
                sells: 0,
                notional: 0.0,
            });
            entry.trades += 1;
            match t.side {
                Side::Buy => entry.buys += 1,
                Side::Sell => entry.sells += 1,
            }
            entry.notional += t.notional();
        }
        by_asset.into_values().collect()
    }
}

fn mean_stddev(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

fn sorted_returns(mut returns: Vec<f64>) -> Vec<f64> {
    returns.sort_by(f64::total_cmp);
    returns
}

fn var_index(len: usize, confidence: f64) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let i = ((1.0 - confidence).max(0.0) * len as f64).floor() as usize;
    Some(i.min(len - 1))
}

fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let mx = x.iter().sum::<f64>() / n as f64;
    let my = y.iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (a, b) in x.iter().zip(y) {
        cov += (a - mx) * (b - my);
        vx += (a - mx).powi(2);
        vy += (b - my).powi(2);
    }
    let denom = (vx * vy).sqrt();
    if denom > 0.0 { cov / denom } else { 0.0 }
}

fn adjacent_wins(trades: &[Trade]) -> usize {
    let mut last: BTreeMap<&str, &Trade> = BTreeMap::new();
    let mut wins = 0;
    for t in trades {
        if let Some(prev) = last.get(t.asset.as_str()) {
            if t.profit_against(prev).is_some_and(|p| p > 0.0) {
                wins += 1;
            }
        }
        last.insert(&t.asset, t);
    }
    wins
}

fn fifo_wins(trades: &[Trade]) -> usize {
    // open lots per asset: (signed units, price)
    let mut lots: BTreeMap<&str, VecDeque<(f64, f64)>> = BTreeMap::new();
    let mut wins = 0;
    for t in trades {
        let queue = lots.entry(&t.asset).or_default();
        let sign = match t.side {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        };
        let mut remaining = t.amount;
        let mut pnl = 0.0;
        let mut closed_any = false;
        while remaining > 0.0 {
            let Some(front) = queue.front_mut() else {
                break;
            };
            if front.0.signum() == sign {
                break;
            }
            let qty = remaining.min(front.0.abs());
            // closing a long lot with a sell, or a short lot with a buy
            pnl += qty * (t.price - front.1) * -sign;
            closed_any = true;
            remaining -= qty;
            front.0 += qty * sign;
            if front.0.abs() <= 1e-12 {
                queue.pop_front();
            }
        }
        if remaining > 1e-12 {
            queue.push_back((remaining * sign, t.price));
        }
        if closed_any && pnl > 0.0 {
            wins += 1;
        }
    }
    wins
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const DAY: i64 = 86_400_000;

    fn snap(timestamp: i64, value: f64) -> PortfolioSnapshot {
        PortfolioSnapshot::cash_only(timestamp, value)
    }

    fn analyzer_with(values: &[f64]) -> PerformanceAnalyzer {
        let mut a = PerformanceAnalyzer::new(snap(0, values[0]), 0.0, WinRateMethod::Adjacent);
        for (i, &v) in values.iter().enumerate().skip(1) {
            a.record_snapshot(snap(i as i64 * DAY, v));
        }
        a
    }

    fn trade(asset: &str, side: Side, amount: f64, price: f64) -> Trade {
        Trade {
            id: "t".into(),
            asset: asset.into(),
            side,
            amount,
            price,
            timestamp: 0,
            strategy_tag: "test".into(),
            execution_tag: "sim".into(),
        }
    }

    #[test]
    fn empty_history_is_all_zero() {
        let a = PerformanceAnalyzer::new(snap(0, 1000.0), 0.02, WinRateMethod::Adjacent);
        let report = a.report();
        assert_eq!(report, PerformanceReport::default());
        let risk = a.risk_metrics();
        assert_eq!(risk.value_at_risk_95, 0.0);
        assert_eq!(risk.expected_shortfall_95, 0.0);
        assert_eq!(risk.diversification_score, 0.0);
        assert!(risk.correlation.assets.is_empty());
    }

    #[test]
    fn zero_initial_value_returns_zero() {
        let mut a = PerformanceAnalyzer::new(snap(0, 0.0), 0.0, WinRateMethod::Adjacent);
        a.record_snapshot(snap(DAY, 50.0));
        assert_eq!(a.total_return(), 0.0);
        assert_eq!(a.max_drawdown(), 0.0);
    }

    #[test]
    fn total_return_uses_latest() {
        let a = analyzer_with(&[100.0, 120.0, 90.0, 110.0]);
        assert_relative_eq!(a.total_return(), 0.10, epsilon = 1e-12);
    }

    #[test]
    fn max_drawdown_from_running_peak() {
        let a = analyzer_with(&[100.0, 110.0, 90.0, 95.0, 80.0, 100.0]);
        assert_relative_eq!(a.max_drawdown(), (110.0 - 80.0) / 110.0, epsilon = 1e-12);
    }

    #[test]
    fn drawdown_counts_initial_as_peak() {
        let a = analyzer_with(&[100.0, 50.0]);
        assert_relative_eq!(a.max_drawdown(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn daily_bucket_keeps_last_value() {
        let mut a = PerformanceAnalyzer::new(snap(0, 100.0), 0.0, WinRateMethod::Adjacent);
        a.record_snapshot(snap(1_000, 100.0));
        a.record_snapshot(snap(2_000, 200.0));
        a.record_snapshot(snap(DAY + 5, 220.0));
        let daily = a.daily_values();
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].1, 200.0);
        assert_relative_eq!(a.daily_returns()[0], 0.1, epsilon = 1e-12);
    }

    #[test]
    fn flat_market_sharpe_is_zero() {
        let a = analyzer_with(&[100.0, 100.0, 100.0, 100.0]);
        assert_eq!(a.sharpe_ratio(), 0.0);
        assert_eq!(a.max_drawdown(), 0.0);
        assert_eq!(a.total_return(), 0.0);
    }

    #[test]
    fn sharpe_subtracts_daily_risk_free() {
        // daily returns +10% and -5%
        let mut a = PerformanceAnalyzer::new(snap(0, 100.0), 0.365, WinRateMethod::Adjacent);
        a.record_snapshot(snap(0, 100.0));
        a.record_snapshot(snap(DAY, 110.0));
        a.record_snapshot(snap(2 * DAY, 104.5));
        let mean: f64 = (0.10 - 0.05) / 2.0;
        let stddev = 0.075;
        assert_relative_eq!(a.sharpe_ratio(), (mean - 0.001) / stddev, epsilon = 1e-9);
    }

    #[test]
    fn adjacent_win_rate() {
        let mut a = PerformanceAnalyzer::new(snap(0, 1000.0), 0.0, WinRateMethod::Adjacent);
        a.record_trade(trade("BTC", Side::Buy, 1.0, 100.0));
        a.record_trade(trade("ETH", Side::Buy, 1.0, 50.0));
        a.record_trade(trade("BTC", Side::Sell, 1.0, 120.0)); // win
        a.record_trade(trade("ETH", Side::Sell, 1.0, 40.0)); // loss
        assert_relative_eq!(a.win_rate(), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn fifo_matches_oldest_lot() {
        let trades = [
            trade("BTC", Side::Buy, 1.0, 100.0),
            trade("BTC", Side::Buy, 1.0, 200.0),
            trade("BTC", Side::Sell, 1.0, 150.0),
        ];
        let mut adjacent = PerformanceAnalyzer::new(snap(0, 1000.0), 0.0, WinRateMethod::Adjacent);
        let mut fifo = PerformanceAnalyzer::new(snap(0, 1000.0), 0.0, WinRateMethod::Fifo);
        for t in &trades {
            adjacent.record_trade(t.clone());
            fifo.record_trade(t.clone());
        }
        // adjacent pairs the sell with the 200 buy: a loss
        assert_eq!(adjacent.win_rate(), 0.0);
        // fifo closes the 100 lot: a win
        assert_relative_eq!(fifo.win_rate(), 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn fifo_handles_short_lots() {
        let mut a = PerformanceAnalyzer::new(snap(0, 1000.0), 0.0, WinRateMethod::Fifo);
        a.record_trade(trade("BTC", Side::Sell, 2.0, 100.0));
        a.record_trade(trade("BTC", Side::Buy, 1.0, 90.0)); // covers half: win
        a.record_trade(trade("BTC", Side::Buy, 2.0, 110.0)); // covers rest at loss, opens long
        assert_relative_eq!(a.win_rate(), 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn var_and_expected_shortfall() {
        // daily returns: -5%, -2%, +1%, +3%
        let a = analyzer_with(&[100.0, 100.0, 95.0, 93.1, 94.031, 96.85193]);
        let returns = a.daily_returns();
        assert_eq!(returns.len(), 4);
        assert_relative_eq!(a.value_at_risk(0.75), 0.02, epsilon = 1e-9);
        assert_relative_eq!(a.expected_shortfall(0.75), 0.05, epsilon = 1e-9);
        assert_relative_eq!(a.value_at_risk(0.5), -0.01, epsilon = 1e-9);
        assert_relative_eq!(a.expected_shortfall(0.5), 0.035, epsilon = 1e-9);
        assert_relative_eq!(a.value_at_risk(0.95), 0.05, epsilon = 1e-9);
        assert_eq!(a.expected_shortfall(0.95), 0.0);
    }

    #[test]
    fn correlation_of_weights() {
        let mut a = PerformanceAnalyzer::new(snap(0, 100.0), 0.0, WinRateMethod::Adjacent);
        let weights = [(0.2, 0.8), (0.5, 0.5), (0.7, 0.3)];
        for (i, (x, y)) in weights.iter().enumerate() {
            let s = PortfolioSnapshot::cash_only(i as i64, 0.0)
                .with_position("BTC", *x, 100.0)
                .with_position("ETH", *y, 100.0);
            a.record_snapshot(s);
        }
        let m = a.correlation_matrix();
        assert_eq!(m.assets, vec!["BTC".to_string(), "ETH".to_string()]);
        assert_relative_eq!(m.get("BTC", "ETH").unwrap(), -1.0, epsilon = 1e-9);
        assert_relative_eq!(m.get("BTC", "BTC").unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn zero_variance_correlation_is_zero() {
        let mut a = PerformanceAnalyzer::new(snap(0, 100.0), 0.0, WinRateMethod::Adjacent);
        for i in 0..3 {
            let s = PortfolioSnapshot::cash_only(i, 50.0 - i as f64 * 10.0)
                .with_position("BTC", 0.5, 100.0)
                .with_position("ETH", i as f64 * 0.1, 100.0);
            a.record_snapshot(s);
        }
        let m = a.correlation_matrix();
        assert_eq!(m.get("BTC", "ETH"), Some(0.0));
        assert_eq!(m.get("BTC", "BTC"), Some(0.0));
    }

    #[test]
    fn diversification_is_one_minus_herfindahl() {
        let mut a = PerformanceAnalyzer::new(snap(0, 100.0), 0.0, WinRateMethod::Adjacent);
        a.record_snapshot(
            PortfolioSnapshot::cash_only(1, 0.0)
                .with_position("BTC", 1.0, 50.0)
                .with_position("ETH", 1.0, 50.0),
        );
        assert_relative_eq!(a.diversification_score(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn asset_summaries_group_by_asset() {
        let mut a = PerformanceAnalyzer::new(snap(0, 1000.0), 0.0, WinRateMethod::Adjacent);
        a.record_trade(trade("ETH", Side::Buy, 2.0, 50.0));
        a.record_trade(trade("BTC", Side::Buy, 1.0, 100.0));
        a.record_trade(trade("ETH", Side::Sell, 2.0, 60.0));
        let s = a.asset_summaries();
        assert_eq!(s.len(), 2);
        assert_eq!(s[0].asset, "BTC");
        assert_eq!(s[1].trades, 2);
        assert_eq!((s[1].buys, s[1].sells), (1, 1));
        assert_relative_eq!(s[1].notional, 220.0, epsilon = 1e-12);
    }

    #[test]
    fn win_rate_method_parses() {
        assert_eq!("FIFO".parse::<WinRateMethod>(), Ok(WinRateMethod::Fifo));
        assert_eq!("adjacent".parse::<WinRateMethod>(), Ok(WinRateMethod::Adjacent));
        assert!("lifo".parse::<WinRateMethod>().is_err());
    }
}
