//! Core domain types and logic.

pub mod analysis;
pub mod backtest;
pub mod bar;
pub mod clock;
pub mod config_validation;
pub mod error;
pub mod indicator;
pub mod metrics;
pub mod portfolio;
pub mod rebalance;
pub mod risk;
pub mod search;
pub mod series;
pub mod sizing;
pub mod strategy;
pub mod trade;
