//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::warn;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::analysis::{Insight, MarketAnalyzer};
use crate::domain::backtest::{BacktestConfig, BacktestRunner, DetailedResults};
use crate::domain::clock::SystemClock;
use crate::domain::config_validation::{
    count_or, number_or, parameter_sections, parse_assets, read_number, read_timestamp,
    validate_backtest_config, validate_rebalance_config, validate_search_config,
    validate_strategy_config, TARGET_KEY_PREFIX,
};
use crate::domain::error::StratsearchError;
use crate::domain::metrics::{WinRateMethod, DEFAULT_RISK_FREE_RATE};
use crate::domain::portfolio::PortfolioSnapshot;
use crate::domain::rebalance::{LastClosePriceEstimator, PriceEstimator, Rebalancer};
use crate::domain::search::parameters::{ParameterSpace, ParameterSpec};
use crate::domain::search::{OptimizationResult, SearchConfig, SearchEngine};
use crate::domain::series::{into_historical, HistoricalData};
use crate::domain::sizing::ExecutionCosts;
use crate::domain::strategy::{StrategyFactory, StrategyParams};
use crate::domain::trade::Trade;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

pub const DEFAULT_DATA_DIR: &str = "data";
const HOLDING_KEY_PREFIX: &str = "holding.";

#[derive(Parser, Debug)]
#[command(name = "stratsearch", about = "Multi-asset backtester and strategy parameter search")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a single backtest with the [strategy] parameters
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Directory for CSV reports
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Overrides [backtest] data_dir
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Search the [param.*] space for the best strategy parameters
    Optimize {
        #[arg(short, long)]
        config: PathBuf,
        /// Overrides [search] method
        #[arg(short, long)]
        method: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Plan trades that move current holdings toward [rebalance] targets
    Rebalance {
        #[arg(short, long)]
        config: PathBuf,
        /// CSV file for the planned trades
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Validate every section of a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List assets with data files
    ListSymbols {
        #[arg(long)]
        data_dir: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            config,
            output,
            data_dir,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config)
            } else {
                run_backtest(&config, output.as_deref(), data_dir.as_deref())
            }
        }
        Command::Optimize {
            config,
            method,
            output,
            data_dir,
        } => run_optimize(&config, method.as_deref(), output.as_deref(), data_dir.as_deref()),
        Command::Rebalance {
            config,
            output,
            data_dir,
        } => run_rebalance(&config, output.as_deref(), data_dir.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::ListSymbols { data_dir } => run_list_symbols(&data_dir),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, StratsearchError> {
    FileConfigAdapter::from_file(path)
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, StratsearchError> {
    let start = read_timestamp(adapter, "backtest", "start")?;
    let end = read_timestamp(adapter, "backtest", "end")?;
    let initial_cash = read_number(adapter, "backtest", "initial_cash")?.ok_or_else(|| {
        StratsearchError::ConfigMissing {
            section: "backtest".into(),
            key: "initial_cash".into(),
        }
    })?;
    let win_rate_method = match adapter.get_string("backtest", "win_rate_method") {
        Some(s) => s
            .parse::<WinRateMethod>()
            .map_err(|reason| StratsearchError::ConfigInvalid {
                section: "backtest".into(),
                key: "win_rate_method".into(),
                reason,
            })?,
        None => WinRateMethod::default(),
    };

    Ok(BacktestConfig {
        start,
        end,
        initial: PortfolioSnapshot::cash_only(start, initial_cash),
        costs: ExecutionCosts {
            commission_per_trade: number_or(adapter, "backtest", "commission_per_trade", 0.0)?,
            commission_pct: number_or(adapter, "backtest", "commission_pct", 0.0)?,
            slippage_pct: number_or(adapter, "backtest", "slippage_pct", 0.0)?,
        },
        risk_free_rate: number_or(adapter, "backtest", "risk_free_rate", DEFAULT_RISK_FREE_RATE)?,
        win_rate_method,
        strategy_tag: adapter
            .get_string("strategy", "name")
            .unwrap_or_else(|| StrategyParams::default().name),
    })
}

pub fn build_strategy_params(adapter: &dyn ConfigPort) -> Result<StrategyParams, StratsearchError> {
    let d = StrategyParams::default();
    let params = StrategyParams {
        name: adapter.get_string("strategy", "name").unwrap_or(d.name),
        fast_period: count_or(adapter, "strategy", "fast_period", d.fast_period)?,
        slow_period: count_or(adapter, "strategy", "slow_period", d.slow_period)?,
        rsi_period: count_or(adapter, "strategy", "rsi_period", d.rsi_period)?,
        position_size: number_or(adapter, "strategy", "position_size", d.position_size)?,
        min_confidence: number_or(adapter, "strategy", "min_confidence", d.min_confidence)?,
        max_position_weight: number_or(
            adapter,
            "strategy",
            "max_position_weight",
            d.max_position_weight,
        )?,
        max_drawdown_halt: number_or(adapter, "strategy", "max_drawdown_halt", d.max_drawdown_halt)?,
    };
    params.validate()?;
    Ok(params)
}

pub fn build_search_config(adapter: &dyn ConfigPort) -> Result<SearchConfig, StratsearchError> {
    let d = SearchConfig::default();
    let seed = match adapter.get_string("search", "seed") {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| StratsearchError::ConfigInvalid {
                section: "search".into(),
                key: "seed".into(),
                reason: format!("'{raw}' is not a valid seed"),
            })?,
        None => d.seed,
    };
    let config = SearchConfig {
        population_size: count_or(adapter, "search", "population_size", d.population_size)?,
        generations: count_or(adapter, "search", "generations", d.generations)?,
        mutation_rate: number_or(adapter, "search", "mutation_rate", d.mutation_rate)?,
        elite_size: count_or(adapter, "search", "elite_size", d.elite_size)?,
        iterations: count_or(adapter, "search", "iterations", d.iterations)?,
        concurrency: count_or(adapter, "search", "concurrency", d.concurrency)?,
        seed,
    };
    config.validate()?;
    Ok(config)
}

pub fn build_parameter_space(adapter: &dyn ConfigPort) -> Result<ParameterSpace, StratsearchError> {
    let mut space = ParameterSpace::new();
    for (section, name) in parameter_sections(adapter) {
        let bound = |key: &str| -> Result<f64, StratsearchError> {
            read_number(adapter, &section, key)?.ok_or_else(|| StratsearchError::ConfigMissing {
                section: section.clone(),
                key: key.to_string(),
            })
        };
        space.insert(&name, ParameterSpec::new(bound("min")?, bound("max")?, bound("step")?));
    }
    space.validate()?;
    Ok(space)
}

/// Inputs for the `rebalance` command.
#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceInputs {
    pub threshold: f64,
    pub targets: BTreeMap<String, f64>,
    /// Units held per asset.
    pub holdings: BTreeMap<String, f64>,
    pub cash: f64,
}

pub fn build_rebalance_inputs(adapter: &dyn ConfigPort) -> Result<RebalanceInputs, StratsearchError> {
    let mut targets = BTreeMap::new();
    let mut holdings = BTreeMap::new();
    for key in adapter.keys("rebalance") {
        if let Some(asset) = key.strip_prefix(TARGET_KEY_PREFIX) {
            targets.insert(asset.to_string(), number_or(adapter, "rebalance", &key, 0.0)?);
        } else if let Some(asset) = key.strip_prefix(HOLDING_KEY_PREFIX) {
            holdings.insert(asset.to_string(), number_or(adapter, "rebalance", &key, 0.0)?);
        }
    }
    Ok(RebalanceInputs {
        threshold: number_or(adapter, "rebalance", "threshold", 0.05)?,
        targets,
        holdings,
        cash: number_or(adapter, "rebalance", "cash", 0.0)?,
    })
}

pub fn resolve_assets(adapter: &dyn ConfigPort) -> Vec<String> {
    adapter
        .get_string("backtest", "assets")
        .map(|s| parse_assets(&s))
        .unwrap_or_default()
}

pub fn resolve_data_dir(override_dir: Option<&Path>, adapter: &dyn ConfigPort) -> PathBuf {
    override_dir
        .map(Path::to_path_buf)
        .or_else(|| adapter.get_string("backtest", "data_dir").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

/// Load every asset; assets that fail to load are skipped with a warning.
pub fn load_historical(
    data_port: &dyn DataPort,
    assets: &[String],
    start: i64,
    end: i64,
) -> Result<HistoricalData, StratsearchError> {
    let mut series = Vec::with_capacity(assets.len());
    for asset in assets {
        match data_port.load_series(asset, start, end) {
            Ok(s) => series.push(s),
            Err(e) => warn!(asset = %asset, error = %e, "skipping asset"),
        }
    }
    if series.is_empty() {
        return Err(StratsearchError::NoData {
            asset: assets.join(","),
        });
    }
    into_historical(series)
}

fn print_detailed(results: &DetailedResults) {
    let perf = &results.performance;
    let risk = &results.risk_metrics;
    eprintln!("\n=== Backtest Results ===");
    eprintln!("Total Return:     {:.2}%", perf.total_return * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", perf.sharpe_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", perf.max_drawdown * 100.0);
    eprintln!("Total Trades:     {}", perf.trades);
    eprintln!("Win Rate:         {:.1}%", perf.win_rate * 100.0);
    eprintln!("VaR (95%):        {:.2}%", risk.value_at_risk_95 * 100.0);
    eprintln!("ES (95%):         {:.2}%", risk.expected_shortfall_95 * 100.0);
    eprintln!("Diversification:  {:.2}", risk.diversification_score);

    if !results.asset_summaries.is_empty() {
        eprintln!("\n=== Per-Asset Summary ===");
        for s in &results.asset_summaries {
            eprintln!(
                "  {}:  {} trades ({} buys, {} sells), ${:.0} traded",
                s.asset, s.trades, s.buys, s.sells, s.notional
            );
        }
    }
}

fn print_optimization(result: &OptimizationResult) {
    let perf = &result.performance;
    eprintln!("\n=== Optimization Results ({}) ===", result.method);
    eprintln!("Best Parameters:  {}", result.parameters);
    eprintln!("Score:            {:.4}", result.score);
    eprintln!("Total Return:     {:.2}%", perf.total_return * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", perf.sharpe_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", perf.max_drawdown * 100.0);
    eprintln!("Win Rate:         {:.1}%", perf.win_rate * 100.0);
    eprintln!(
        "Evaluations:      {} ({} failed)",
        result.evaluations, result.failures
    );
    if result.aborted {
        eprintln!("Search stopped early; best result so far shown.");
    }
}

pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    backtest: BacktestConfig,
    strategy: &StrategyParams,
    assets: &[String],
) -> Result<DetailedResults, StratsearchError> {
    let data = Arc::new(load_historical(data_port, assets, backtest.start, backtest.end)?);
    eprintln!(
        "Running backtest: {} assets, {} to {}",
        data.len(),
        backtest.start,
        backtest.end
    );
    let collaborators = strategy.build(&Default::default())?;
    let mut runner = BacktestRunner::new(data, backtest, collaborators);
    runner.run()?;
    Ok(runner.detailed_results())
}

fn run_backtest(
    config_path: &Path,
    output: Option<&Path>,
    data_dir: Option<&Path>,
) -> Result<(), StratsearchError> {
    let adapter = load_config(config_path)?;
    validate_backtest_config(&adapter)?;
    validate_strategy_config(&adapter)?;

    let backtest = build_backtest_config(&adapter)?;
    let strategy = build_strategy_params(&adapter)?;
    let data_port = CsvAdapter::new(resolve_data_dir(data_dir, &adapter));
    let results = run_backtest_pipeline(&data_port, backtest, &strategy, &resolve_assets(&adapter))?;
    print_detailed(&results);

    if let Some(dir) = output {
        CsvReportAdapter.write_backtest(&results, dir)?;
        eprintln!("\nReport written to: {}", dir.display());
    }
    Ok(())
}

pub fn run_dry_run(config_path: &Path) -> Result<(), StratsearchError> {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;
    validate_backtest_config(&adapter)?;
    validate_strategy_config(&adapter)?;
    eprintln!("Config validated successfully");

    let strategy = build_strategy_params(&adapter)?;
    eprintln!("\nStrategy: {}", strategy.name);
    eprintln!(
        "  fast/slow/rsi periods: {}/{}/{}",
        strategy.fast_period, strategy.slow_period, strategy.rsi_period
    );
    eprintln!("\nAssets: {}", resolve_assets(&adapter).join(", "));
    eprintln!("\nDry run complete: configuration is valid");
    Ok(())
}

fn run_optimize(
    config_path: &Path,
    method: Option<&str>,
    output: Option<&Path>,
    data_dir: Option<&Path>,
) -> Result<(), StratsearchError> {
    let adapter = load_config(config_path)?;
    validate_backtest_config(&adapter)?;
    validate_strategy_config(&adapter)?;
    validate_search_config(&adapter)?;

    let backtest = build_backtest_config(&adapter)?;
    let strategy = build_strategy_params(&adapter)?;
    let search = build_search_config(&adapter)?;
    let space = build_parameter_space(&adapter)?;
    let method = method
        .map(str::to_string)
        .or_else(|| adapter.get_string("search", "method"))
        .unwrap_or_else(|| "grid".into());

    let data_port = CsvAdapter::new(resolve_data_dir(data_dir, &adapter));
    let (start, end) = (backtest.start, backtest.end);
    let data = Arc::new(load_historical(&data_port, &resolve_assets(&adapter), start, end)?);
    eprintln!(
        "Optimizing {} parameters over {} assets with {} search",
        space.len(),
        data.len(),
        method
    );

    let mut engine = SearchEngine::new(data, backtest, strategy, search);
    let result = engine.optimize_strategy(start, end, &method, &space)?;
    print_optimization(&result);

    if let Some(dir) = output {
        CsvReportAdapter.write_optimization(&result, dir)?;
        eprintln!("\nReport written to: {}", dir.display());
    }
    Ok(())
}

/// Latest insight per asset as of `as_of`; failed analyses are left out.
pub fn current_insights(
    analyzer: &dyn MarketAnalyzer,
    data: &HistoricalData,
    as_of: i64,
) -> BTreeMap<String, Insight> {
    let mut insights = BTreeMap::new();
    for (asset, series) in data {
        match analyzer.analyze(asset, series.visible_at(as_of)) {
            Ok(insight) => {
                insights.insert(asset.clone(), insight);
            }
            Err(e) => warn!(asset = %asset, error = %e, "no insight"),
        }
    }
    insights
}

/// Value `holdings` at the estimator's prices.
pub fn current_snapshot(
    inputs: &RebalanceInputs,
    estimator: &dyn PriceEstimator,
    as_of: i64,
) -> Result<PortfolioSnapshot, StratsearchError> {
    let mut snapshot = PortfolioSnapshot::cash_only(as_of, inputs.cash);
    for (asset, &units) in &inputs.holdings {
        let price = estimator
            .estimate_price(asset, None)
            .ok_or_else(|| StratsearchError::NoData {
                asset: asset.clone(),
            })?;
        snapshot = snapshot.with_position(asset, units, price);
    }
    Ok(snapshot)
}

fn print_trades(trades: &[Trade]) {
    if trades.is_empty() {
        eprintln!("Portfolio is within threshold; no trades planned.");
        return;
    }
    eprintln!("\n=== Planned Trades ===");
    for t in trades {
        eprintln!(
            "  {}  {:4} {:>14.6} {} @ {:.4}  (${:.2})",
            t.id,
            t.side,
            t.amount,
            t.asset,
            t.price,
            t.notional()
        );
    }
}

fn run_rebalance(
    config_path: &Path,
    output: Option<&Path>,
    data_dir: Option<&Path>,
) -> Result<(), StratsearchError> {
    let adapter = load_config(config_path)?;
    validate_backtest_config(&adapter)?;
    validate_strategy_config(&adapter)?;
    validate_rebalance_config(&adapter)?;

    let backtest = build_backtest_config(&adapter)?;
    let strategy = build_strategy_params(&adapter)?;
    let inputs = build_rebalance_inputs(&adapter)?;

    let mut assets = resolve_assets(&adapter);
    for asset in inputs.targets.keys().chain(inputs.holdings.keys()) {
        if !assets.contains(asset) {
            assets.push(asset.clone());
        }
    }
    let data_port = CsvAdapter::new(resolve_data_dir(data_dir, &adapter));
    let data = Arc::new(load_historical(&data_port, &assets, backtest.start, backtest.end)?);

    let estimator = LastClosePriceEstimator::new(Arc::clone(&data), backtest.end);
    let snapshot = current_snapshot(&inputs, &estimator, backtest.end)?;
    let insights = current_insights(&strategy.analyzer(), &data, backtest.end);
    eprintln!(
        "Rebalancing ${:.2} across {} targets (threshold {:.1}%)",
        snapshot.total_value,
        inputs.targets.len(),
        inputs.threshold * 100.0
    );

    let clock = SystemClock;
    let trades = Rebalancer::new(&estimator, &clock).rebalance(
        &snapshot,
        &inputs.targets,
        inputs.threshold,
        &insights,
    )?;
    print_trades(&trades);

    if let Some(path) = output {
        CsvReportAdapter.write_trades(&trades, path)?;
        eprintln!("\nTrades written to: {}", path.display());
    }
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), StratsearchError> {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = load_config(config_path)?;
    let sections = adapter.sections();
    let has = |name: &str| sections.iter().any(|s| s == name);

    validate_backtest_config(&adapter)?;
    eprintln!("  [backtest] ok");
    validate_strategy_config(&adapter)?;
    eprintln!("  [strategy] ok");
    if has("search") || !parameter_sections(&adapter).is_empty() {
        validate_search_config(&adapter)?;
        eprintln!("  [search] ok");
    }
    if has("rebalance") {
        validate_rebalance_config(&adapter)?;
        eprintln!("  [rebalance] ok");
    }
    eprintln!("\nConfiguration is valid.");
    Ok(())
}

fn run_list_symbols(data_dir: &Path) -> Result<(), StratsearchError> {
    let adapter = CsvAdapter::new(data_dir.to_path_buf());
    let symbols = adapter.list_symbols()?;
    if symbols.is_empty() {
        eprintln!("No data files in {}", data_dir.display());
    }
    for symbol in symbols {
        println!("{symbol}");
    }
    Ok(())
}
