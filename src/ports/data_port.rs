//! Market data access port trait.

use crate::domain::error::StratsearchError;
use crate::domain::series::AssetSeries;

pub trait DataPort {
    /// Bars for `symbol` with `start <= timestamp <= end`, oldest first.
    fn load_series(&self, symbol: &str, start: i64, end: i64) -> Result<AssetSeries, StratsearchError>;

    fn list_symbols(&self) -> Result<Vec<String>, StratsearchError>;
}
