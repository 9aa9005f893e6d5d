//! The scalar every search method maximizes.

use crate::domain::metrics::PerformanceReport;

pub const RETURN_WEIGHT: f64 = 0.4;
pub const SHARPE_WEIGHT: f64 = 0.3;
pub const DRAWDOWN_WEIGHT: f64 = 0.2;
pub const WIN_RATE_WEIGHT: f64 = 0.1;

/// Score assigned to failed or unusable candidates.
pub const WORST_SCORE: f64 = f64::NEG_INFINITY;

/// `0.4*return + 0.3*sharpe + 0.2*(1 - drawdown) + 0.1*win_rate`.
///
/// A non-finite blend maps to [`WORST_SCORE`] so it can never win a comparison.
pub fn objective_score(report: &PerformanceReport) -> f64 {
    let score = RETURN_WEIGHT * report.total_return
        + SHARPE_WEIGHT * report.sharpe_ratio
        + DRAWDOWN_WEIGHT * (1.0 - report.max_drawdown)
        + WIN_RATE_WEIGHT * report.win_rate;
    if score.is_nan() { WORST_SCORE } else { score }
}
