//! Core domain types and logic.

pub mod ohlcv;
pub mod indicator;
pub mod signal;
pub mod risk;
pub mod position;
pub mod portfolio;
pub mod instrument;
pub mod universe;
pub mod config;
pub mod backtest;
pub mod metrics;
pub mod error;
