//! Position sizing and stop/target placement.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::position::Side;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Fraction of capital lost if the stop is hit (before leverage).
    pub risk_fraction: f64,
    pub leverage: f64,
    /// Notional cap as a fraction of capital.
    pub max_exposure_fraction: f64,
    pub stop_atr_multiplier: f64,
    pub risk_reward_ratio: f64,
    pub min_notional: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_fraction: 0.01,
            leverage: 5.0,
            max_exposure_fraction: 0.75,
            stop_atr_multiplier: 2.0,
            risk_reward_ratio: 2.0,
            min_notional: 10.0,
        }
    }
}

/// Why an entry was refused. These are outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryRejection {
    DegenerateStop,
    InsufficientCapital,
    BelowMinNotional,
}

impl fmt::Display for EntryRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryRejection::DegenerateStop => write!(f, "stop distance is zero or not finite"),
            EntryRejection::InsufficientCapital => write!(f, "capital below minimum notional"),
            EntryRejection::BelowMinNotional => write!(f, "position notional below minimum"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Levels {
    pub stop_loss: f64,
    pub take_profit: f64,
    pub stop_distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryPlan {
    pub size: f64,
    pub levels: Levels,
}

/// stop = entry ∓ ATR × multiplier, target = entry ± distance × R:R.
pub fn place_levels(
    side: Side,
    entry: f64,
    atr: f64,
    config: &RiskConfig,
) -> Result<Levels, EntryRejection> {
    let stop_distance = atr * config.stop_atr_multiplier;
    if !stop_distance.is_finite() || stop_distance <= 0.0 || !entry.is_finite() {
        return Err(EntryRejection::DegenerateStop);
    }
    let target_distance = stop_distance * config.risk_reward_ratio;
    let sign = side.sign();
    Ok(Levels {
        stop_loss: entry - sign * stop_distance,
        take_profit: entry + sign * target_distance,
        stop_distance,
    })
}

/// size = capital × risk × leverage / stop_distance, capped so that
/// size × entry ≤ capital × max_exposure_fraction.
pub fn size_position(
    capital: f64,
    entry: f64,
    stop_distance: f64,
    config: &RiskConfig,
) -> Result<f64, EntryRejection> {
    if !stop_distance.is_finite() || stop_distance <= 0.0 {
        return Err(EntryRejection::DegenerateStop);
    }
    if capital < config.min_notional || capital <= 0.0 {
        return Err(EntryRejection::InsufficientCapital);
    }

    let risk_amount = capital * config.risk_fraction;
    let mut size = risk_amount * config.leverage / stop_distance;
    let max_notional = capital * config.max_exposure_fraction;
    if size * entry > max_notional {
        size = max_notional / entry;
    }

    if !size.is_finite() || size * entry < config.min_notional {
        return Err(EntryRejection::BelowMinNotional);
    }
    Ok(size)
}

pub fn plan_entry(
    side: Side,
    entry: f64,
    atr: f64,
    capital: f64,
    config: &RiskConfig,
) -> Result<EntryPlan, EntryRejection> {
    let levels = place_levels(side, entry, atr, config)?;
    let size = size_position(capital, entry, levels.stop_distance, config)?;
    Ok(EntryPlan { size, levels })
}
