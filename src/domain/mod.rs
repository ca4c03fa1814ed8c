//! Core domain types and logic.

pub mod candle;
pub mod indicator;
pub mod snapshot;
pub mod signal;
pub mod position;
pub mod risk;
pub mod exits;
pub mod execution;
pub mod engine_config;
pub mod config_validation;
pub mod backtest;
pub mod metrics;
pub mod sweep;
pub mod error;
