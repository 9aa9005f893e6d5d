//! Risk gate collaborator: admits or rejects candidate trades and scores
//! portfolio concentration.

use super::portfolio::PortfolioSnapshot;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RiskAssessment {
    pub risk_score: f64,
    pub recommendations: Vec<String>,
}

pub trait RiskGate: Send {
    /// Refresh portfolio-level constraints from the latest snapshot.
    fn update_portfolio(&mut self, snapshot: &PortfolioSnapshot);

    /// Whether a signed `amount` of `asset` at `price` may be opened.
    fn can_open_position(&self, asset: &str, amount: f64, price: f64) -> bool;

    /// Score a snapshot. Defaults to the Herfindahl concentration of its weights.
    fn assess(&self, snapshot: &PortfolioSnapshot) -> RiskAssessment {
        RiskAssessment {
            risk_score: concentration(snapshot),
            recommendations: Vec::new(),
        }
    }

    /// Forget state carried from a previous run.
    fn reset(&mut self) {}
}

/// Sum of squared allocation weights; 0 for an empty or worthless portfolio.
pub fn concentration(snapshot: &PortfolioSnapshot) -> f64 {
    snapshot.weights().values().map(|w| w * w).sum()
}

/// Caps single-asset exposure and blocks new buys once drawdown passes a halt level.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureRiskGate {
    pub max_position_weight: f64,
    pub max_drawdown_halt: f64,
    peak_value: f64,
    current: Option<PortfolioSnapshot>,
}

impl ExposureRiskGate {
    pub fn new(max_position_weight: f64, max_drawdown_halt: f64) -> Self {
        ExposureRiskGate {
            max_position_weight,
            max_drawdown_halt,
            peak_value: 0.0,
            current: None,
        }
    }

    pub fn drawdown(&self) -> f64 {
        match &self.current {
            Some(s) if self.peak_value > 0.0 => {
                ((self.peak_value - s.total_value) / self.peak_value).max(0.0)
            }
            _ => 0.0,
        }
    }

    pub fn is_halted(&self) -> bool {
        self.max_drawdown_halt > 0.0 && self.drawdown() >= self.max_drawdown_halt
    }
}

impl Default for ExposureRiskGate {
    fn default() -> Self {
        ExposureRiskGate::new(0.5, 0.0)
    }
}

impl RiskGate for ExposureRiskGate {
    fn update_portfolio(&mut self, snapshot: &PortfolioSnapshot) {
        self.peak_value = self.peak_value.max(snapshot.total_value);
        self.current = Some(snapshot.clone());
    }

    fn can_open_position(&self, asset: &str, amount: f64, price: f64) -> bool {
        if amount <= 0.0 {
            return true;
        }
        let Some(snapshot) = &self.current else {
            return false;
        };
        if self.is_halted() || snapshot.total_value <= 0.0 || price <= 0.0 {
            return false;
        }
        let notional = amount * price;
        if notional > snapshot.cash {
            return false;
        }
        let held = snapshot.allocation.get(asset).copied().unwrap_or(0.0);
        (held + notional) / snapshot.total_value <= self.max_position_weight + 1e-12
    }

    fn assess(&self, snapshot: &PortfolioSnapshot) -> RiskAssessment {
        let mut recommendations = Vec::new();
        for (asset, weight) in snapshot.weights() {
            if weight > self.max_position_weight {
                recommendations.push(format!(
                    "reduce {asset} exposure ({:.1}% > {:.1}%)",
                    weight * 100.0,
                    self.max_position_weight * 100.0
                ));
            }
        }
        if self.is_halted() {
            recommendations.push(format!(
                "drawdown {:.1}% past halt level; new positions blocked",
                self.drawdown() * 100.0
            ));
        }
        RiskAssessment {
            risk_score: concentration(snapshot),
            recommendations,
        }
    }

    fn reset(&mut self) {
        self.peak_value = 0.0;
        self.current = None;
    }
}
