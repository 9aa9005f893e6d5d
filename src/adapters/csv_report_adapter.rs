//! CSV report adapter.
//!
//! Backtests produce `summary.csv`, `trades.csv`, `portfolio.csv` and
//! `assets.csv`; searches produce `optimization.csv`, `evaluations.csv`
//! and, when the method reports them, `generations.csv`.

use crate::domain::backtest::DetailedResults;
use crate::domain::error::StratsearchError;
use crate::domain::portfolio::PortfolioSnapshot;
use crate::domain::search::OptimizationResult;
use crate::domain::trade::Trade;
use crate::ports::report_port::ReportPort;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Serialize)]
struct SnapshotRow {
    timestamp: i64,
    total_value: f64,
    cash: f64,
    risk_score: f64,
    allocation: String,
    recommendations: String,
}

impl From<&PortfolioSnapshot> for SnapshotRow {
    fn from(s: &PortfolioSnapshot) -> Self {
        let allocation: Vec<String> = s
            .allocation
            .iter()
            .map(|(asset, value)| format!("{asset}={value}"))
            .collect();
        SnapshotRow {
            timestamp: s.timestamp,
            total_value: s.total_value,
            cash: s.cash,
            risk_score: s.risk_score,
            allocation: allocation.join(";"),
            recommendations: s.recommendations.join("; "),
        }
    }
}

#[derive(Serialize)]
struct EvaluationRow {
    index: usize,
    generation: usize,
    score: f64,
    failed: bool,
    parameters: String,
}

#[derive(Serialize)]
struct OptimizationRow<'a> {
    method: &'a str,
    parameters: String,
    score: f64,
    total_return: f64,
    win_rate: f64,
    sharpe_ratio: f64,
    max_drawdown: f64,
    trades: usize,
    evaluations: usize,
    failures: usize,
    aborted: bool,
}

#[derive(Serialize)]
struct RiskRow {
    total_return: f64,
    win_rate: f64,
    sharpe_ratio: f64,
    max_drawdown: f64,
    trades: usize,
    value_at_risk_95: f64,
    expected_shortfall_95: f64,
    value_at_risk_99: f64,
    expected_shortfall_99: f64,
    diversification_score: f64,
}

pub struct CsvReportAdapter;

fn write_rows<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<(), StratsearchError> {
    let report_err = |e: csv::Error| StratsearchError::Report {
        reason: format!("failed to write {}: {}", path.display(), e),
    };
    let mut writer = csv::Writer::from_path(path).map_err(report_err)?;
    for row in rows {
        writer.serialize(row).map_err(report_err)?;
    }
    writer.flush()?;
    Ok(())
}

impl ReportPort for CsvReportAdapter {
    fn write_backtest(&self, results: &DetailedResults, output_dir: &Path) -> Result<(), StratsearchError> {
        fs::create_dir_all(output_dir)?;
        let perf = &results.performance;
        let risk = &results.risk_metrics;
        write_rows(
            &output_dir.join("summary.csv"),
            [RiskRow {
                total_return: perf.total_return,
                win_rate: perf.win_rate,
                sharpe_ratio: perf.sharpe_ratio,
                max_drawdown: perf.max_drawdown,
                trades: perf.trades,
                value_at_risk_95: risk.value_at_risk_95,
                expected_shortfall_95: risk.expected_shortfall_95,
                value_at_risk_99: risk.value_at_risk_99,
                expected_shortfall_99: risk.expected_shortfall_99,
                diversification_score: risk.diversification_score,
            }],
        )?;
        self.write_trades(&results.trades, &output_dir.join("trades.csv"))?;
        write_rows(
            &output_dir.join("portfolio.csv"),
            results.portfolio_history.iter().map(SnapshotRow::from),
        )?;
        write_rows(&output_dir.join("assets.csv"), &results.asset_summaries)?;
        info!(dir = %output_dir.display(), "backtest report written");
        Ok(())
    }

    fn write_optimization(
        &self,
        result: &OptimizationResult,
        output_dir: &Path,
    ) -> Result<(), StratsearchError> {
        fs::create_dir_all(output_dir)?;
        let perf = &result.performance;
        write_rows(
            &output_dir.join("optimization.csv"),
            [OptimizationRow {
                method: result.method.name(),
                parameters: result.parameters.to_string(),
                score: result.score,
                total_return: perf.total_return,
                win_rate: perf.win_rate,
                sharpe_ratio: perf.sharpe_ratio,
                max_drawdown: perf.max_drawdown,
                trades: perf.trades,
                evaluations: result.evaluations,
                failures: result.failures,
                aborted: result.aborted,
            }],
        )?;
        write_rows(
            &output_dir.join("evaluations.csv"),
            result.history.iter().map(|r| EvaluationRow {
                index: r.index,
                generation: r.generation,
                score: r.score,
                failed: r.failed(),
                parameters: r.parameters.to_string(),
            }),
        )?;
        if !result.generations.is_empty() {
            write_rows(&output_dir.join("generations.csv"), &result.generations)?;
        }
        info!(dir = %output_dir.display(), "optimization report written");
        Ok(())
    }

    fn write_trades(&self, trades: &[Trade], path: &Path) -> Result<(), StratsearchError> {
        if trades.is_empty() {
            // csv only emits headers alongside the first record
            fs::write(path, "id,asset,side,amount,price,timestamp,strategy_tag,execution_tag\n")?;
            return Ok(());
        }
        write_rows(path, trades)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trade::Side;
    use tempfile::TempDir;

    fn trade(id: &str, side: Side) -> Trade {
        Trade {
            id: id.into(),
            asset: "BTC".into(),
            side,
            amount: 1.5,
            price: 100.0,
            timestamp: 0,
            strategy_tag: "trend".into(),
            execution_tag: "simulated".into(),
        }
    }

    #[test]
    fn trades_csv_has_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trades.csv");
        CsvReportAdapter
            .write_trades(&[trade("t1", Side::Buy), trade("t2", Side::Sell)], &path)
            .unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "id,asset,side,amount,price,timestamp,strategy_tag,execution_tag"
        );
        assert_eq!(lines[1], "t1,BTC,buy,1.5,100.0,0,trend,simulated");
        assert!(lines[2].contains(",sell,"));
    }

    #[test]
    fn empty_trades_still_write_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trades.csv");
        CsvReportAdapter.write_trades(&[], &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 1);
    }

    #[test]
    fn snapshot_row_flattens_allocation() {
        let s = PortfolioSnapshot::cash_only(5, 10.0)
            .with_position("ETH", 1.0, 20.0)
            .with_position("BTC", 2.0, 5.0);
        let row = SnapshotRow::from(&s);
        assert_eq!(row.allocation, "BTC=10;ETH=20");
        assert_eq!(row.total_value, 40.0);
    }
}
