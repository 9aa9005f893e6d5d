//! Market insight types and the analysis collaborator.
//!
//! Analysis payloads are a closed set of tagged variants so confidence
//! aggregation is checked exhaustively.

use super::bar::MarketBar;
use super::error::StratsearchError;
use super::indicator::{calculate_ema, calculate_rsi, latest};
use std::fmt;

/// Aggregate direction below this magnitude reads as neutral.
pub const NEUTRAL_BAND: f64 = 0.05;

const RSI_OVERBOUGHT: f64 = 70.0;
const RSI_OVERSOLD: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Bullish => write!(f, "bullish"),
            Trend::Bearish => write!(f, "bearish"),
            Trend::Neutral => write!(f, "neutral"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisSignal {
    Technical {
        fast_ema: f64,
        slow_ema: f64,
        rsi: Option<f64>,
    },
    Fundamental {
        fair_value: f64,
        price: f64,
    },
    /// `score` in [-1, 1], negative is bearish.
    Sentiment { score: f64 },
}

impl AnalysisSignal {
    /// Directional reading in [-1, 1].
    pub fn direction(&self) -> f64 {
        match *self {
            AnalysisSignal::Technical {
                fast_ema,
                slow_ema,
                rsi,
            } => {
                if slow_ema <= 0.0 {
                    return 0.0;
                }
                // a 5% EMA spread saturates the signal
                let mut d = ((fast_ema - slow_ema) / slow_ema * 20.0).clamp(-1.0, 1.0);
                match rsi {
                    Some(r) if r > RSI_OVERBOUGHT && d > 0.0 => d *= 0.5,
                    Some(r) if r < RSI_OVERSOLD && d < 0.0 => d *= 0.5,
                    _ => {}
                }
                d
            }
            AnalysisSignal::Fundamental { fair_value, price } => {
                if price <= 0.0 {
                    return 0.0;
                }
                ((fair_value - price) / price * 5.0).clamp(-1.0, 1.0)
            }
            AnalysisSignal::Sentiment { score } => score.clamp(-1.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insight {
    pub asset: String,
    pub timestamp: i64,
    pub trend: Trend,
    /// In [0, 1].
    pub confidence: f64,
    /// Latest observed price, when the analyzer saw one.
    pub reference_price: Option<f64>,
    pub signals: Vec<AnalysisSignal>,
}

impl Insight {
    pub fn neutral(asset: &str, timestamp: i64, reference_price: Option<f64>) -> Self {
        Insight {
            asset: asset.to_string(),
            timestamp,
            trend: Trend::Neutral,
            confidence: 0.0,
            reference_price,
            signals: Vec::new(),
        }
    }

    /// Average the signals' directions into a trend and a confidence.
    pub fn from_signals(
        asset: &str,
        timestamp: i64,
        reference_price: Option<f64>,
        signals: Vec<AnalysisSignal>,
    ) -> Self {
        if signals.is_empty() {
            return Insight::neutral(asset, timestamp, reference_price);
        }
        let mean = signals.iter().map(AnalysisSignal::direction).sum::<f64>() / signals.len() as f64;
        let trend = if mean > NEUTRAL_BAND {
            Trend::Bullish
        } else if mean < -NEUTRAL_BAND {
            Trend::Bearish
        } else {
            Trend::Neutral
        };
        Insight {
            asset: asset.to_string(),
            timestamp,
            trend,
            confidence: mean.abs().clamp(0.0, 1.0),
            reference_price,
            signals,
        }
    }
}

/// Produces an insight from the bars visible at the current step.
pub trait MarketAnalyzer: Send + Sync {
    fn analyze(&self, asset: &str, window: &[MarketBar]) -> Result<Insight, StratsearchError>;
}

/// EMA crossover with an RSI damper.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendAnalyzer {
    pub fast_period: usize,
    pub slow_period: usize,
    pub rsi_period: usize,
    /// Maximum trailing bars fed to the indicators.
    pub lookback: usize,
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        TrendAnalyzer {
            fast_period: 12,
            slow_period: 26,
            rsi_period: 14,
            lookback: 200,
        }
    }
}

impl MarketAnalyzer for TrendAnalyzer {
    fn analyze(&self, asset: &str, window: &[MarketBar]) -> Result<Insight, StratsearchError> {
        let last = window.last().ok_or_else(|| StratsearchError::NoData {
            asset: asset.to_string(),
        })?;
        let start = window.len().saturating_sub(self.lookback.max(self.slow_period));
        let closes: Vec<f64> = window[start..].iter().map(|b| b.close).collect();

        let fast = latest(&calculate_ema(&closes, self.fast_period));
        let slow = latest(&calculate_ema(&closes, self.slow_period));
        let rsi = latest(&calculate_rsi(&closes, self.rsi_period));

        let (fast_ema, slow_ema) = match (fast, slow) {
            (Some(f), Some(s)) => (f, s),
            _ => return Ok(Insight::neutral(asset, last.timestamp, Some(last.close))),
        };

        Ok(Insight::from_signals(
            asset,
            last.timestamp,
            Some(last.close),
            vec![AnalysisSignal::Technical {
                fast_ema,
                slow_ema,
                rsi,
            }],
        ))
    }
}
