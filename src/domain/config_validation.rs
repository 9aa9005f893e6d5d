//! Configuration validation.
//!
//! Checks every config field before a run and names the offending
//! section and key. The typed readers here are shared with the CLI builders.

use crate::domain::bar::parse_timestamp;
use crate::domain::error::StratsearchError;
use crate::domain::metrics::WinRateMethod;
use crate::domain::search::SearchMethod;
use crate::domain::strategy::KNOWN_PARAMETERS;
use crate::ports::config_port::ConfigPort;

pub const PARAM_SECTION_PREFIX: &str = "param.";
pub const TARGET_KEY_PREFIX: &str = "target.";

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> StratsearchError {
    StratsearchError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn missing(section: &str, key: &str) -> StratsearchError {
    StratsearchError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

/// Optional number; present but unparseable values are errors rather than
/// silently falling back to a default.
pub fn read_number(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<f64>, StratsearchError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| invalid(section, key, format!("'{raw}' is not a number"))),
    }
}

pub fn number_or(config: &dyn ConfigPort, section: &str, key: &str, default: f64) -> Result<f64, StratsearchError> {
    Ok(read_number(config, section, key)?.unwrap_or(default))
}

pub fn count_or(config: &dyn ConfigPort, section: &str, key: &str, default: usize) -> Result<usize, StratsearchError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .map_err(|_| invalid(section, key, format!("'{raw}' is not a whole number"))),
    }
}

pub fn read_timestamp(config: &dyn ConfigPort, section: &str, key: &str) -> Result<i64, StratsearchError> {
    let raw = config
        .get_string(section, key)
        .ok_or_else(|| missing(section, key))?;
    parse_timestamp(&raw).ok_or_else(|| {
        invalid(
            section,
            key,
            format!("'{raw}' is not epoch milliseconds, RFC 3339 or YYYY-MM-DD"),
        )
    })
}

/// Comma-separated, trimmed, empty entries dropped.
pub fn parse_assets(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), StratsearchError> {
    let cash = read_number(config, "backtest", "initial_cash")?
        .ok_or_else(|| missing("backtest", "initial_cash"))?;
    if cash <= 0.0 {
        return Err(invalid("backtest", "initial_cash", "initial_cash must be positive"));
    }
    for key in ["commission_per_trade", "commission_pct", "slippage_pct"] {
        if number_or(config, "backtest", key, 0.0)? < 0.0 {
            return Err(invalid("backtest", key, format!("{key} must be non-negative")));
        }
    }
    let rate = number_or(config, "backtest", "risk_free_rate", 0.0)?;
    if !(0.0..1.0).contains(&rate) {
        return Err(invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    if let Some(method) = config.get_string("backtest", "win_rate_method") {
        method
            .parse::<WinRateMethod>()
            .map_err(|reason| invalid("backtest", "win_rate_method", reason))?;
    }

    let start = read_timestamp(config, "backtest", "start")?;
    let end = read_timestamp(config, "backtest", "end")?;
    if start > end {
        return Err(invalid("backtest", "start", "start must not be after end"));
    }

    match config.get_string("backtest", "assets") {
        Some(s) if !parse_assets(&s).is_empty() => Ok(()),
        _ => Err(missing("backtest", "assets")),
    }
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), StratsearchError> {
    for key in ["fast_period", "slow_period", "rsi_period"] {
        if config.get_string("strategy", key).is_some() && count_or(config, "strategy", key, 1)? == 0 {
            return Err(invalid("strategy", key, format!("{key} must be at least 1")));
        }
    }
    let fast = count_or(config, "strategy", "fast_period", 12)?;
    let slow = count_or(config, "strategy", "slow_period", 26)?;
    if fast >= slow {
        return Err(invalid(
            "strategy",
            "fast_period",
            "fast_period must be shorter than slow_period",
        ));
    }
    for key in ["position_size", "max_position_weight"] {
        if read_number(config, "strategy", key)?.is_some_and(|v| !(v > 0.0 && v <= 1.0)) {
            return Err(invalid("strategy", key, format!("{key} must be in (0, 1]")));
        }
    }
    if read_number(config, "strategy", "min_confidence")?.is_some_and(|v| !(0.0..=1.0).contains(&v)) {
        return Err(invalid("strategy", "min_confidence", "min_confidence must be in [0, 1]"));
    }
    if read_number(config, "strategy", "max_drawdown_halt")?.is_some_and(|v| !(0.0..1.0).contains(&v)) {
        return Err(invalid(
            "strategy",
            "max_drawdown_halt",
            "max_drawdown_halt must be in [0, 1)",
        ));
    }
    Ok(())
}

/// `[param.<name>]` sections, in name order.
pub fn parameter_sections(config: &dyn ConfigPort) -> Vec<(String, String)> {
    config
        .sections()
        .into_iter()
        .filter_map(|section| {
            let name = section.strip_prefix(PARAM_SECTION_PREFIX)?.to_string();
            Some((section, name))
        })
        .collect()
}

pub fn validate_search_config(config: &dyn ConfigPort) -> Result<(), StratsearchError> {
    let method = config.get_string("search", "method").unwrap_or_else(|| "grid".into());
    method.parse::<SearchMethod>()?;

    for key in ["population_size", "generations", "iterations", "concurrency"] {
        if config.get_string("search", key).is_some() && count_or(config, "search", key, 1)? == 0 {
            return Err(invalid("search", key, format!("{key} must be at least 1")));
        }
    }
    let population = count_or(config, "search", "population_size", 20)?;
    if count_or(config, "search", "elite_size", 2)? > population {
        return Err(invalid("search", "elite_size", "elite_size must not exceed population_size"));
    }
    let rate = number_or(config, "search", "mutation_rate", 0.1)?;
    if !(0.0..=1.0).contains(&rate) {
        return Err(invalid("search", "mutation_rate", "mutation_rate must be in [0, 1]"));
    }
    if let Some(raw) = config.get_string("search", "seed") {
        raw.trim()
            .parse::<u64>()
            .map_err(|_| invalid("search", "seed", format!("'{raw}' is not a valid seed")))?;
    }

    let params = parameter_sections(config);
    if params.is_empty() {
        return Err(missing("param.<name>", "min"));
    }
    for (section, name) in &params {
        if !KNOWN_PARAMETERS.contains(&name.as_str()) {
            return Err(invalid(
                section,
                name,
                format!("unknown parameter '{name}' (known: {})", KNOWN_PARAMETERS.join(", ")),
            ));
        }
        let min = read_number(config, section, "min")?.ok_or_else(|| missing(section, "min"))?;
        let max = read_number(config, section, "max")?.ok_or_else(|| missing(section, "max"))?;
        let step = read_number(config, section, "step")?.ok_or_else(|| missing(section, "step"))?;
        if min > max {
            return Err(invalid(section, "min", "min must not exceed max"));
        }
        if step <= 0.0 {
            return Err(invalid(section, "step", "step must be positive"));
        }
    }
    Ok(())
}

pub fn validate_rebalance_config(config: &dyn ConfigPort) -> Result<(), StratsearchError> {
    let threshold = number_or(config, "rebalance", "threshold", 0.05)?;
    if threshold < 0.0 {
        return Err(invalid("rebalance", "threshold", "threshold must be non-negative"));
    }
    let mut total = 0.0;
    let mut count = 0;
    for key in config.keys("rebalance") {
        if !key.starts_with(TARGET_KEY_PREFIX) {
            continue;
        }
        let weight = number_or(config, "rebalance", &key, 0.0)?;
        if !(0.0..=1.0).contains(&weight) {
            return Err(invalid("rebalance", &key, "target weight must be in [0, 1]"));
        }
        total += weight;
        count += 1;
    }
    if count == 0 {
        return Err(missing("rebalance", "target.<ASSET>"));
    }
    if total > 1.0 + 1e-9 {
        return Err(invalid(
            "rebalance",
            "target",
            format!("target weights sum to {total}, above 1"),
        ));
    }
    Ok(())
}
