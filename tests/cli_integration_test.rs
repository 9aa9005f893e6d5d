//! CLI integration tests for command orchestration.
//!
//! Tests cover:
//! - Config parsing (build_backtest_config, build_strategy_params, build_search_config)
//! - Parameter space and rebalance inputs from INI sections
//! - Data directory and asset resolution
//! - Dry-run and validate with real INI files on disk
//! - Backtest pipeline with MockDataPort
//! - Full commands against CSV data directories

mod common;

use clap::Parser;
use common::*;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use stratsearch::adapters::file_config_adapter::FileConfigAdapter;
use stratsearch::cli::{self, Cli};
use stratsearch::domain::error::StratsearchError;
use stratsearch::domain::metrics::WinRateMethod;
use stratsearch::domain::rebalance::FixedPriceEstimator;
use stratsearch::domain::strategy::StrategyParams;

fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn is_success(code: ExitCode) -> bool {
    format!("{code:?}") == format!("{:?}", ExitCode::SUCCESS)
}

fn same_code(code: ExitCode, expected: u8) -> bool {
    format!("{code:?}") == format!("{:?}", ExitCode::from(expected))
}

/// Writes `<SYMBOL>.csv` with one daily bar per close, starting 2024-01-01.
fn write_series(dir: &Path, symbol: &str, closes: &[f64]) {
    let mut content = String::from("timestamp,open,high,low,close,volume\n");
    for bar in bars_from_closes(closes) {
        content.push_str(&format!(
            "{},{},{},{},{},{}\n",
            bar.timestamp, bar.open, bar.high, bar.low, bar.close, bar.volume
        ));
    }
    fs::write(dir.join(format!("{symbol}.csv")), content).unwrap();
}

fn wave(count: usize, base: f64, amplitude: f64) -> Vec<f64> {
    wave_bars(count, base, amplitude).iter().map(|b| b.close).collect()
}

fn data_dir() -> tempfile::TempDir {
    let dir = tempfile::TempDir::new().unwrap();
    write_series(dir.path(), "BTC", &wave(60, 100.0, 15.0));
    write_series(dir.path(), "ETH", &wave(60, 40.0, 6.0));
    dir
}

const VALID_INI: &str = r#"
[backtest]
initial_cash = 100000.0
commission_per_trade = 1.0
commission_pct = 0.001
slippage_pct = 0.0005
risk_free_rate = 0.03
win_rate_method = fifo
start = 2024-01-01
end = 2024-02-29
assets = BTC, ETH

[strategy]
name = wave rider
fast_period = 5
slow_period = 15
rsi_period = 10
position_size = 0.3
min_confidence = 0.05

[search]
method = genetic
population_size = 6
generations = 3
elite_size = 1
iterations = 8
concurrency = 2
seed = 11

[param.fast_period]
min = 3
max = 6
step = 1

[param.position_size]
min = 0.1
max = 0.5
step = 0.2

[rebalance]
threshold = 0.05
cash = 1000
holding.BTC = 10
target.BTC = 0.4
target.ETH = 0.4
"#;

mod config_loading {
    use super::*;

    #[test]
    fn build_backtest_config_valid_full() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let config = cli::build_backtest_config(&adapter).unwrap();
        assert_eq!(config.start, T0);
        assert_eq!(config.end, T0 + 59 * DAY);
        assert_eq!(config.initial.cash, 100_000.0);
        assert_eq!(config.costs.commission_per_trade, 1.0);
        assert_eq!(config.costs.commission_pct, 0.001);
        assert_eq!(config.costs.slippage_pct, 0.0005);
        assert_eq!(config.risk_free_rate, 0.03);
        assert_eq!(config.win_rate_method, WinRateMethod::Fifo);
        assert_eq!(config.strategy_tag, "wave rider");
    }

    #[test]
    fn build_backtest_config_uses_defaults() {
        let ini = "[backtest]\ninitial_cash = 500\nstart = 2024-01-01\nend = 2024-01-31\n";
        let adapter = FileConfigAdapter::from_string(ini).unwrap();
        let config = cli::build_backtest_config(&adapter).unwrap();
        assert_eq!(config.costs.commission_pct, 0.0);
        assert_eq!(config.risk_free_rate, 0.02);
        assert_eq!(config.win_rate_method, WinRateMethod::Adjacent);
        assert_eq!(config.strategy_tag, "trend");
    }

    #[test]
    fn build_backtest_config_missing_start() {
        let adapter = FileConfigAdapter::from_string("[backtest]\ninitial_cash = 1\nend = 2024-01-31\n").unwrap();
        assert!(matches!(
            cli::build_backtest_config(&adapter),
            Err(StratsearchError::ConfigMissing { ref key, .. }) if key == "start"
        ));
    }

    #[test]
    fn build_backtest_config_invalid_date() {
        let ini = "[backtest]\ninitial_cash = 1\nstart = 01/01/2024\nend = 2024-01-31\n";
        let adapter = FileConfigAdapter::from_string(ini).unwrap();
        assert!(matches!(
            cli::build_backtest_config(&adapter),
            Err(StratsearchError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn build_strategy_params_overrides_defaults() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let params = cli::build_strategy_params(&adapter).unwrap();
        assert_eq!(params.name, "wave rider");
        assert_eq!(params.fast_period, 5);
        assert_eq!(params.slow_period, 15);
        assert_eq!(params.position_size, 0.3);
        assert_eq!(params.max_position_weight, StrategyParams::default().max_position_weight);
    }

    #[test]
    fn build_strategy_params_rejects_inverted_periods() {
        let adapter =
            FileConfigAdapter::from_string("[strategy]\nfast_period = 30\nslow_period = 10\n").unwrap();
        assert!(cli::build_strategy_params(&adapter).is_err());
    }

    #[test]
    fn build_search_config_and_space() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let search = cli::build_search_config(&adapter).unwrap();
        assert_eq!(search.population_size, 6);
        assert_eq!(search.elite_size, 1);
        assert_eq!(search.concurrency, 2);
        assert_eq!(search.seed, 11);

        let space = cli::build_parameter_space(&adapter).unwrap();
        assert_eq!(space.len(), 2);
        let spec = space.get("position_size").unwrap();
        assert_eq!((spec.min, spec.max, spec.step), (0.1, 0.5, 0.2));
    }

    #[test]
    fn build_parameter_space_requires_bounds() {
        let adapter = FileConfigAdapter::from_string("[param.fast_period]\nmin = 1\nmax = 5\n").unwrap();
        assert!(matches!(
            cli::build_parameter_space(&adapter),
            Err(StratsearchError::ConfigMissing { ref key, .. }) if key == "step"
        ));
    }

    #[test]
    fn build_rebalance_inputs_reads_prefixed_keys() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let inputs = cli::build_rebalance_inputs(&adapter).unwrap();
        assert_eq!(inputs.threshold, 0.05);
        assert_eq!(inputs.cash, 1000.0);
        assert_eq!(inputs.holdings.get("BTC"), Some(&10.0));
        assert_eq!(inputs.targets.len(), 2);
        assert_eq!(inputs.targets.get("ETH"), Some(&0.4));
    }

    #[test]
    fn current_snapshot_values_holdings() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let inputs = cli::build_rebalance_inputs(&adapter).unwrap();
        let estimator = FixedPriceEstimator::default().with("BTC", 50.0);
        let snapshot = cli::current_snapshot(&inputs, &estimator, T0).unwrap();
        assert_eq!(snapshot.total_value, 1500.0);
        assert_eq!(snapshot.allocation.get("BTC"), Some(&500.0));

        let unpriced = FixedPriceEstimator::default();
        assert!(matches!(
            cli::current_snapshot(&inputs, &unpriced, T0),
            Err(StratsearchError::NoData { .. })
        ));
    }
}

mod resolution {
    use super::*;

    #[test]
    fn assets_are_trimmed() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        assert_eq!(cli::resolve_assets(&adapter), vec!["BTC", "ETH"]);
        let empty = FileConfigAdapter::from_string("[backtest]\n").unwrap();
        assert!(cli::resolve_assets(&empty).is_empty());
    }

    #[test]
    fn data_dir_override_takes_precedence() {
        let adapter = FileConfigAdapter::from_string("[backtest]\ndata_dir = /srv/bars\n").unwrap();
        assert_eq!(
            cli::resolve_data_dir(Some(Path::new("/tmp/x")), &adapter),
            PathBuf::from("/tmp/x")
        );
        assert_eq!(cli::resolve_data_dir(None, &adapter), PathBuf::from("/srv/bars"));
        let bare = FileConfigAdapter::from_string("[backtest]\n").unwrap();
        assert_eq!(
            cli::resolve_data_dir(None, &bare),
            PathBuf::from(cli::DEFAULT_DATA_DIR)
        );
    }
}

mod dry_run {
    use super::*;

    #[test]
    fn dry_run_valid_config_succeeds() {
        let file = write_temp_ini(VALID_INI);
        assert!(cli::run_dry_run(file.path()).is_ok());
    }

    #[test]
    fn dry_run_missing_file_fails() {
        let result = cli::run_dry_run(Path::new("/nonexistent/path/config.ini"));
        assert!(matches!(result, Err(StratsearchError::ConfigParse { .. })));
    }

    #[test]
    fn validate_reports_bad_search_section_as_config_error() {
        let ini = VALID_INI.replace("method = genetic", "method = annealing");
        let file = write_temp_ini(&ini);
        let cli = Cli::try_parse_from(["stratsearch", "validate", "--config", file.path().to_str().unwrap()]).unwrap();
        assert!(same_code(cli::run(cli), 2));
    }

    #[test]
    fn validate_accepts_full_config() {
        let file = write_temp_ini(VALID_INI);
        let cli = Cli::try_parse_from(["stratsearch", "validate", "--config", file.path().to_str().unwrap()]).unwrap();
        assert!(is_success(cli::run(cli)));
    }
}

mod pipeline_mock {
    use super::*;

    #[test]
    fn pipeline_runs_with_mock_port() {
        let port = MockDataPort::new()
            .with_bars("BTC", wave_bars(60, 100.0, 15.0))
            .with_error("ETH", "feed offline");
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let backtest = cli::build_backtest_config(&adapter).unwrap();
        let strategy = cli::build_strategy_params(&adapter).unwrap();
        let assets = cli::resolve_assets(&adapter);

        let results = cli::run_backtest_pipeline(&port, backtest, &strategy, &assets).unwrap();
        assert_eq!(results.portfolio_history.len(), 60);
        assert!(results.trades.iter().all(|t| t.asset == "BTC"));
        assert!(results.trades.iter().all(|t| t.strategy_tag == "wave rider"));
    }

    #[test]
    fn pipeline_without_data_fails() {
        let port = MockDataPort::new();
        let backtest = stratsearch::domain::backtest::BacktestConfig::new(T0, T0 + DAY, 100.0);
        let result = cli::run_backtest_pipeline(
            &port,
            backtest,
            &StrategyParams::default(),
            &["BTC".to_string()],
        );
        assert!(matches!(result, Err(StratsearchError::NoData { .. })));
    }
}

mod commands {
    use super::*;

    fn run_args(args: &[&str]) -> ExitCode {
        let mut full = vec!["stratsearch"];
        full.extend_from_slice(args);
        cli::run(Cli::try_parse_from(full).unwrap())
    }

    #[test]
    fn backtest_writes_csv_report() {
        let data = data_dir();
        let ini = write_temp_ini(VALID_INI);
        let out = tempfile::TempDir::new().unwrap();
        let code = run_args(&[
            "backtest",
            "--config",
            ini.path().to_str().unwrap(),
            "--data-dir",
            data.path().to_str().unwrap(),
            "--output",
            out.path().to_str().unwrap(),
        ]);
        assert!(is_success(code));
        for file in ["summary.csv", "trades.csv", "portfolio.csv", "assets.csv"] {
            assert!(out.path().join(file).exists(), "{file} should be written");
        }
        let portfolio = fs::read_to_string(out.path().join("portfolio.csv")).unwrap();
        assert_eq!(portfolio.lines().count(), 61);
    }

    #[test]
    fn backtest_with_missing_data_exits_with_data_code() {
        let empty = tempfile::TempDir::new().unwrap();
        let ini = write_temp_ini(VALID_INI);
        let code = run_args(&[
            "backtest",
            "--config",
            ini.path().to_str().unwrap(),
            "--data-dir",
            empty.path().to_str().unwrap(),
        ]);
        assert!(same_code(code, 3));
    }

    #[test]
    fn optimize_writes_evaluations() {
        let data = data_dir();
        let ini = write_temp_ini(VALID_INI);
        let out = tempfile::TempDir::new().unwrap();
        let code = run_args(&[
            "optimize",
            "--config",
            ini.path().to_str().unwrap(),
            "--method",
            "grid",
            "--data-dir",
            data.path().to_str().unwrap(),
            "--output",
            out.path().to_str().unwrap(),
        ]);
        assert!(is_success(code));
        let evaluations = fs::read_to_string(out.path().join("evaluations.csv")).unwrap();
        // header + 4 fast periods x 3 position sizes
        assert_eq!(evaluations.lines().count(), 13);
        assert!(out.path().join("optimization.csv").exists());
    }

    #[test]
    fn optimize_rejects_unknown_method() {
        let data = data_dir();
        let ini = write_temp_ini(VALID_INI);
        let code = run_args(&[
            "optimize",
            "--config",
            ini.path().to_str().unwrap(),
            "--method",
            "annealing",
            "--data-dir",
            data.path().to_str().unwrap(),
        ]);
        assert!(same_code(code, 2));
    }

    #[test]
    fn rebalance_writes_planned_trades() {
        let data = data_dir();
        let ini = write_temp_ini(VALID_INI);
        let out = tempfile::TempDir::new().unwrap();
        let trades_path = out.path().join("trades.csv");
        let code = run_args(&[
            "rebalance",
            "--config",
            ini.path().to_str().unwrap(),
            "--data-dir",
            data.path().to_str().unwrap(),
            "--output",
            trades_path.to_str().unwrap(),
        ]);
        assert!(is_success(code));
        let content = fs::read_to_string(&trades_path).unwrap();
        assert!(content.contains(",ETH,buy,"));
        assert!(content.lines().skip(1).all(|l| l.contains("rebalance,planned")));
    }

    #[test]
    fn list_symbols_succeeds() {
        let data = data_dir();
        assert!(is_success(run_args(&[
            "list-symbols",
            "--data-dir",
            data.path().to_str().unwrap(),
        ])));
    }
}
