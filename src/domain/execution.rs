//! Fill simulation and fees.
//!
//! Slippage always moves the fill against the trader: buys fill higher,
//! sells fill lower.

use serde::{Deserialize, Serialize};

use crate::domain::position::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillAction {
    Entry,
    Exit,
}

/// Answers "can `size` be filled at roughly `reference`, and at what price".
pub trait FillModel: Send + Sync {
    fn fill(&self, side: Side, action: FillAction, reference: f64, size: f64) -> Option<f64>;
}

/// Long entry (buy): execution_price = market_price * (1 + slippage_pct / 100)
pub fn apply_slippage_long_entry(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 + slippage_pct / 100.0)
}

/// Short entry (sell short): execution_price = market_price * (1 - slippage_pct / 100)
pub fn apply_slippage_short_entry(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 - slippage_pct / 100.0)
}

/// Long exit (sell): execution_price = market_price * (1 - slippage_pct / 100)
pub fn apply_slippage_long_exit(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 - slippage_pct / 100.0)
}

/// Short exit (buy to cover): execution_price = market_price * (1 + slippage_pct / 100)
pub fn apply_slippage_short_exit(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 + slippage_pct / 100.0)
}

/// Percentage slippage with an optional per-order size limit.
#[derive(Debug, Clone, PartialEq)]
pub struct SlippageFill {
    pub slippage_pct: f64,
    pub max_size: Option<f64>,
}

impl SlippageFill {
    pub fn new(slippage_pct: f64) -> Self {
        Self {
            slippage_pct,
            max_size: None,
        }
    }
}

impl FillModel for SlippageFill {
    fn fill(&self, side: Side, action: FillAction, reference: f64, size: f64) -> Option<f64> {
        if !reference.is_finite() || reference <= 0.0 || !size.is_finite() || size <= 0.0 {
            return None;
        }
        if self.max_size.is_some_and(|max| size > max) {
            return None;
        }
        let pct = self.slippage_pct;
        let price = match (side, action) {
            (Side::Long, FillAction::Entry) => apply_slippage_long_entry(reference, pct),
            (Side::Short, FillAction::Entry) => apply_slippage_short_entry(reference, pct),
            (Side::Long, FillAction::Exit) => apply_slippage_long_exit(reference, pct),
            (Side::Short, FillAction::Exit) => apply_slippage_short_exit(reference, pct),
        };
        Some(price)
    }
}

/// Fee on one side of a trade: fee_rate × notional.
pub fn calculate_fee(price: f64, size: f64, fee_rate: f64) -> f64 {
    (price * size).abs() * fee_rate
}
