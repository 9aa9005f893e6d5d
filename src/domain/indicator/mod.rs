//! Technical indicators over close-price slices.
//!
//! Each calculator returns one entry per input price; warmup entries are `None`.

pub mod ema;
pub mod rsi;

pub use ema::calculate_ema;
pub use rsi::calculate_rsi;

/// Last valid value of an indicator series.
pub fn latest(values: &[Option<f64>]) -> Option<f64> {
    values.last().copied().flatten()
}
