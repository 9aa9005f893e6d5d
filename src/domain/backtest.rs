//! Deterministic multi-asset backtest runner.
//!
//! `BacktestConfig` carries the run parameters; `BacktestRunner` walks the
//! unified timeline and owns every piece of mutable state for one run.

use super::analysis::Insight;
use super::error::StratsearchError;
use super::metrics::{
    AssetSummary, PerformanceAnalyzer, PerformanceReport, RiskMetrics, WinRateMethod,
    DEFAULT_RISK_FREE_RATE,
};
use super::portfolio::{Ledger, PortfolioSnapshot};
use super::series::{build_timeline, HistoricalData};
use super::sizing::{ExecutionCosts, SizingContext};
use super::strategy::Collaborators;
use super::trade::{Side, Trade};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Smallest unit amount worth executing.
const MIN_TRADE_UNITS: f64 = 1e-9;

pub const EXECUTION_TAG: &str = "simulated";

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    /// Inclusive window, epoch milliseconds.
    pub start: i64,
    pub end: i64,
    pub initial: PortfolioSnapshot,
    pub costs: ExecutionCosts,
    pub risk_free_rate: f64,
    pub win_rate_method: WinRateMethod,
    pub strategy_tag: String,
}

impl BacktestConfig {
    pub fn new(start: i64, end: i64, initial_cash: f64) -> Self {
        BacktestConfig {
            start,
            end,
            initial: PortfolioSnapshot::cash_only(start, initial_cash),
            costs: ExecutionCosts::default(),
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            win_rate_method: WinRateMethod::default(),
            strategy_tag: "trend".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct DetailedResults {
    pub performance: PerformanceReport,
    pub trades: Vec<Trade>,
    pub portfolio_history: Vec<PortfolioSnapshot>,
    pub risk_metrics: RiskMetrics,
    pub asset_summaries: Vec<AssetSummary>,
}

pub struct BacktestRunner {
    data: Arc<HistoricalData>,
    config: BacktestConfig,
    collaborators: Collaborators,
    abort: Option<Arc<AtomicBool>>,
    state: RunState,
    ledger: Ledger,
    analyzer: PerformanceAnalyzer,
    trade_seq: u64,
}

impl BacktestRunner {
    pub fn new(
        data: Arc<HistoricalData>,
        config: BacktestConfig,
        collaborators: Collaborators,
    ) -> Self {
        let ledger = Ledger::from_snapshot(&config.initial);
        let analyzer = PerformanceAnalyzer::new(
            config.initial.clone(),
            config.risk_free_rate,
            config.win_rate_method,
        );
        BacktestRunner {
            data,
            config,
            collaborators,
            abort: None,
            state: RunState::Idle,
            ledger,
            analyzer,
            trade_seq: 0,
        }
    }

    /// Stop between timesteps once `flag` becomes true.
    pub fn with_abort(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = Some(flag);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Reseed state from the initial snapshot, stamped at `start`.
    fn reset(&mut self, start: i64) {
        let initial = PortfolioSnapshot {
            timestamp: start,
            ..self.config.initial.clone()
        };
        self.ledger = Ledger::from_snapshot(&initial);
        self.analyzer = PerformanceAnalyzer::new(
            initial,
            self.config.risk_free_rate,
            self.config.win_rate_method,
        );
        self.collaborators.risk_gate.reset();
        self.trade_seq = 0;
        self.state = RunState::Idle;
    }

    fn aborted(&self) -> bool {
        self.abort
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Run over the configured window.
    pub fn run(&mut self) -> Result<PerformanceReport, StratsearchError> {
        self.run_backtest(self.config.start, self.config.end)
    }

    /// Replay `[start, end]`. Every call starts from the initial snapshot, so
    /// repeated runs over the same data produce identical results.
    pub fn run_backtest(&mut self, start: i64, end: i64) -> Result<PerformanceReport, StratsearchError> {
        if start > end {
            return Err(StratsearchError::InvalidParameter {
                name: "window".into(),
                reason: format!("start {start} is after end {end}"),
            });
        }
        self.reset(start);
        self.state = RunState::Running;

        let data = Arc::clone(&self.data);
        let timeline = build_timeline(&data, start, end);
        info!(
            assets = data.len(),
            timesteps = timeline.len(),
            strategy = %self.config.strategy_tag,
            "starting backtest"
        );

        for &t in &timeline {
            if self.aborted() {
                warn!(timestamp = t, "backtest aborted");
                self.state = RunState::Idle;
                return Err(StratsearchError::Aborted);
            }
            if let Err(e) = self.step(&data, t) {
                self.state = RunState::Idle;
                return Err(e);
            }
        }

        self.state = RunState::Completed;
        let report = self.analyzer.report();
        info!(
            trades = report.trades,
            total_return = report.total_return,
            max_drawdown = report.max_drawdown,
            "backtest complete"
        );
        Ok(report)
    }

    fn step(&mut self, data: &HistoricalData, t: i64) -> Result<(), StratsearchError> {
        // Carry the latest known close forward so idle assets keep a valuation.
        for (symbol, series) in data {
            if let Some(bar) = series.last_at(t) {
                self.ledger.mark(symbol, bar.close);
            }
        }

        let mut insights: BTreeMap<&str, (Insight, f64)> = BTreeMap::new();
        for (symbol, series) in data {
            let Some(bar) = series.bar_at(t) else {
                debug!(asset = %symbol, timestamp = t, "no bar at timestep, skipping");
                continue;
            };
            match self
                .collaborators
                .analyzer
                .analyze(symbol, series.visible_at(t))
            {
                Ok(insight) => {
                    insights.insert(symbol.as_str(), (insight, bar.close));
                }
                Err(e) => warn!(asset = %symbol, timestamp = t, error = %e, "analysis failed"),
            }
        }

        let before = self.ledger.snapshot(t);
        self.collaborators.risk_gate.update_portfolio(&before);

        for (asset, (insight, price)) in insights {
            self.consider_trade(asset, &insight, price, t)?;
        }

        let mut snapshot = self.ledger.snapshot(t);
        let assessment = self.collaborators.risk_gate.assess(&snapshot);
        snapshot.risk_score = assessment.risk_score;
        snapshot.recommendations = assessment.recommendations;
        self.analyzer.record_snapshot(snapshot);
        Ok(())
    }

    fn consider_trade(
        &mut self,
        asset: &str,
        insight: &Insight,
        price: f64,
        t: i64,
    ) -> Result<(), StratsearchError> {
        let held = self.ledger.holding(asset);
        let ctx = SizingContext {
            total_value: self.ledger.total_value(),
            cash: self.ledger.cash,
            held,
        };
        let amount = self.collaborators.sizer.size(asset, insight, price, &ctx);
        if !amount.is_finite() {
            return Ok(());
        }
        let Some(side) = Side::from_signed(amount) else {
            return Ok(());
        };

        let fill = self.config.costs.fill_price(price, side);
        let units = match side {
            Side::Buy => amount.min(self.config.costs.affordable_units(self.ledger.cash, fill)),
            Side::Sell => amount.abs().min(held),
        };
        if units <= MIN_TRADE_UNITS {
            return Ok(());
        }

        let commission = self.config.costs.commission(units * fill);
        if side == Side::Sell && commission >= units * fill {
            debug!(
                asset,
                timestamp = t,
                commission,
                "sale proceeds do not cover commission, skipping"
            );
            return Ok(());
        }

        let signed = match side {
            Side::Buy => units,
            Side::Sell => -units,
        };
        if !self
            .collaborators
            .risk_gate
            .can_open_position(asset, signed, fill)
        {
            debug!(asset, timestamp = t, amount = signed, "trade rejected by risk gate");
            return Ok(());
        }

        let trade = Trade {
            id: format!("{}-{:06}", self.config.strategy_tag, self.trade_seq + 1),
            asset: asset.to_string(),
            side,
            amount: units,
            price: fill,
            timestamp: t,
            strategy_tag: self.config.strategy_tag.clone(),
            execution_tag: EXECUTION_TAG.into(),
        };
        if let Err(e) = self.ledger.apply(&trade, commission) {
            warn!(asset, timestamp = t, error = %e, "trade not applied, skipping");
            return Ok(());
        }
        self.trade_seq += 1;
        debug!(
            asset,
            side = %trade.side,
            amount = trade.amount,
            price = trade.price,
            "trade executed"
        );
        self.analyzer.record_trade(trade);
        Ok(())
    }

    pub fn analyzer(&self) -> &PerformanceAnalyzer {
        &self.analyzer
    }

    pub fn detailed_results(&self) -> DetailedResults {
        DetailedResults {
            performance: self.analyzer.report(),
            trades: self.analyzer.trades().to_vec(),
            portfolio_history: self.analyzer.snapshots().to_vec(),
            risk_metrics: self.analyzer.risk_metrics(),
            asset_summaries: self.analyzer.asset_summaries(),
        }
    }
}
