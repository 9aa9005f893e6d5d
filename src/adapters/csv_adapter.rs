//! CSV file market data adapter.
//!
//! One file per asset, `<SYMBOL>.csv`, with a header row
//! `timestamp,open,high,low,close,volume`. Timestamps may be epoch
//! milliseconds, RFC 3339, or `YYYY-MM-DD`.

use crate::domain::bar::{parse_timestamp, MarketBar};
use crate::domain::error::StratsearchError;
use crate::domain::series::AssetSeries;
use crate::ports::data_port::DataPort;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct BarRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}.csv"))
    }
}

impl DataPort for CsvAdapter {
    fn load_series(&self, symbol: &str, start: i64, end: i64) -> Result<AssetSeries, StratsearchError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| StratsearchError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for (line, result) in rdr.deserialize::<BarRow>().enumerate() {
            let row = result.map_err(|e| StratsearchError::Data {
                reason: format!("{}: CSV parse error: {}", path.display(), e),
            })?;
            let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| StratsearchError::Data {
                reason: format!(
                    "{}: row {}: invalid timestamp '{}'",
                    path.display(),
                    line + 1,
                    row.timestamp
                ),
            })?;
            if timestamp < start || timestamp > end {
                continue;
            }
            bars.push(MarketBar {
                timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }

        if bars.is_empty() {
            return Err(StratsearchError::NoData {
                asset: symbol.to_string(),
            });
        }
        bars.sort_by_key(|b| b.timestamp);
        debug!(asset = symbol, bars = bars.len(), "loaded series");
        AssetSeries::new(symbol, bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, StratsearchError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| StratsearchError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StratsearchError::Data {
                reason: format!("directory entry error: {e}"),
            })?;
            let name = entry.file_name();
            if let Some(symbol) = name.to_string_lossy().strip_suffix(".csv") {
                symbols.push(symbol.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}
