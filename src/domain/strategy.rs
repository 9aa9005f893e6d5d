//! Built-in strategy parameters and the collaborators they configure.

use super::analysis::{MarketAnalyzer, TrendAnalyzer};
use super::error::StratsearchError;
use super::risk::{ExposureRiskGate, RiskGate};
use super::search::parameters::ParameterSet;
use super::sizing::{ConfidenceSizer, TradeSizer};

/// Parameter names understood by [`StrategyParams::from_parameters`].
pub const KNOWN_PARAMETERS: &[&str] = &[
    "fast_period",
    "slow_period",
    "rsi_period",
    "position_size",
    "min_confidence",
    "max_position_weight",
    "max_drawdown_halt",
];

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyParams {
    pub name: String,
    pub fast_period: usize,
    pub slow_period: usize,
    pub rsi_period: usize,
    pub position_size: f64,
    pub min_confidence: f64,
    pub max_position_weight: f64,
    pub max_drawdown_halt: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        StrategyParams {
            name: "trend".into(),
            fast_period: 12,
            slow_period: 26,
            rsi_period: 14,
            position_size: 0.25,
            min_confidence: 0.1,
            max_position_weight: 0.5,
            max_drawdown_halt: 0.0,
        }
    }
}

impl StrategyParams {
    /// Overlay `params` on `self`. Periods are rounded to whole bars.
    pub fn from_parameters(&self, params: &ParameterSet) -> Result<Self, StratsearchError> {
        let period = |name: &str, default: usize| -> usize {
            params
                .get(name)
                .map(|v| v.round().max(1.0) as usize)
                .unwrap_or(default)
        };
        let value = |name: &str, default: f64| params.get(name).unwrap_or(default);

        let out = StrategyParams {
            name: self.name.clone(),
            fast_period: period("fast_period", self.fast_period),
            slow_period: period("slow_period", self.slow_period),
            rsi_period: period("rsi_period", self.rsi_period),
            position_size: value("position_size", self.position_size),
            min_confidence: value("min_confidence", self.min_confidence),
            max_position_weight: value("max_position_weight", self.max_position_weight),
            max_drawdown_halt: value("max_drawdown_halt", self.max_drawdown_halt),
        };
        out.validate()?;
        Ok(out)
    }

    pub fn validate(&self) -> Result<(), StratsearchError> {
        let invalid = |name: &str, reason: &str| StratsearchError::InvalidParameter {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if self.fast_period >= self.slow_period {
            return Err(invalid("fast_period", "must be shorter than slow_period"));
        }
        if !(self.position_size > 0.0 && self.position_size <= 1.0) {
            return Err(invalid("position_size", "must be in (0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(invalid("min_confidence", "must be in [0, 1]"));
        }
        if !(self.max_position_weight > 0.0 && self.max_position_weight <= 1.0) {
            return Err(invalid("max_position_weight", "must be in (0, 1]"));
        }
        if !(0.0..1.0).contains(&self.max_drawdown_halt) {
            return Err(invalid("max_drawdown_halt", "must be in [0, 1)"));
        }
        Ok(())
    }

    pub fn analyzer(&self) -> TrendAnalyzer {
        TrendAnalyzer {
            fast_period: self.fast_period,
            slow_period: self.slow_period,
            rsi_period: self.rsi_period,
            lookback: (self.slow_period * 4).max(50),
        }
    }

    pub fn sizer(&self) -> ConfidenceSizer {
        ConfidenceSizer {
            position_size: self.position_size,
            min_confidence: self.min_confidence,
        }
    }

    pub fn risk_gate(&self) -> ExposureRiskGate {
        ExposureRiskGate::new(self.max_position_weight, self.max_drawdown_halt)
    }
}

/// The pluggable pieces one backtest run needs.
pub struct Collaborators {
    pub analyzer: Box<dyn MarketAnalyzer>,
    pub sizer: Box<dyn TradeSizer>,
    pub risk_gate: Box<dyn RiskGate>,
}

/// Builds fresh collaborators for a parameter set. Each call must return
/// instances that share no mutable state with earlier ones.
pub trait StrategyFactory: Send + Sync {
    fn build(&self, params: &ParameterSet) -> Result<Collaborators, StratsearchError>;

    fn tag(&self) -> String;
}

impl<T: StrategyFactory + ?Sized> StrategyFactory for &T {
    fn build(&self, params: &ParameterSet) -> Result<Collaborators, StratsearchError> {
        (**self).build(params)
    }

    fn tag(&self) -> String {
        (**self).tag()
    }
}

impl StrategyFactory for StrategyParams {
    fn build(&self, params: &ParameterSet) -> Result<Collaborators, StratsearchError> {
        let resolved = self.from_parameters(params)?;
        Ok(Collaborators {
            analyzer: Box::new(resolved.analyzer()),
            sizer: Box::new(resolved.sizer()),
            risk_gate: Box::new(resolved.risk_gate()),
        })
    }

    fn tag(&self) -> String {
        self.name.clone()
    }
}
