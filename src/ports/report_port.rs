//! Result output port trait.

use crate::domain::backtest::DetailedResults;
use crate::domain::error::StratsearchError;
use crate::domain::search::OptimizationResult;
use crate::domain::trade::Trade;
use std::path::Path;

/// Port for persisting run results. Implementations choose the file layout
/// under `output_dir`.
pub trait ReportPort {
    fn write_backtest(&self, results: &DetailedResults, output_dir: &Path) -> Result<(), StratsearchError>;

    fn write_optimization(
        &self,
        result: &OptimizationResult,
        output_dir: &Path,
    ) -> Result<(), StratsearchError>;

    fn write_trades(&self, trades: &[Trade], path: &Path) -> Result<(), StratsearchError>;
}
