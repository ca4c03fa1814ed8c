//! Technical indicator implementations.
//!
//! Every indicator is a pure function from a candle window to an
//! [`IndicatorSeries`] aligned 1:1 with the window. Points inside the warmup
//! period carry `valid = false`; readers go through [`IndicatorSeries::latest`]
//! or [`IndicatorPoint::simple`] so an unavailable value surfaces as `None`
//! rather than as zero.

pub mod atr;
pub mod ema;
pub mod pivot;
pub mod rsi;
pub mod supertrend;
pub mod volume;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::candle::Candle;

/// Direction of a trend-following overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trend {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub timestamp: DateTime<Utc>,
    pub valid: bool,
    pub value: IndicatorValue,
}

impl IndicatorPoint {
    pub(crate) fn invalid(timestamp: DateTime<Utc>) -> Self {
        IndicatorPoint {
            timestamp,
            valid: false,
            value: IndicatorValue::Simple(0.0),
        }
    }

    pub(crate) fn simple(timestamp: DateTime<Utc>, value: f64) -> Self {
        IndicatorPoint {
            timestamp,
            valid: true,
            value: IndicatorValue::Simple(value),
        }
    }

    /// The scalar value, if this point is valid and holds one.
    pub fn as_simple(&self) -> Option<f64> {
        match (self.valid, &self.value) {
            (true, IndicatorValue::Simple(v)) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Band {
        level: f64,
        upper: f64,
        lower: f64,
        trend: Trend,
    },
    Pivot {
        high: Option<f64>,
        low: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Ema(usize),
    Rsi(usize),
    Atr(usize),
    VolumeSma(usize),
    Pivot(usize),
    SuperTrend {
        atr_period: usize,
        factor_x100: u32,
    },
    PivotSuperTrend {
        pivot_period: usize,
        atr_period: usize,
        factor_x100: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    pub(crate) fn empty(indicator_type: IndicatorType) -> Self {
        IndicatorSeries {
            indicator_type,
            values: Vec::new(),
        }
    }

    pub(crate) fn all_invalid(candles: &[Candle], indicator_type: IndicatorType) -> Self {
        IndicatorSeries {
            indicator_type,
            values: candles
                .iter()
                .map(|c| IndicatorPoint::invalid(c.timestamp))
                .collect(),
        }
    }

    /// The point at the last index, only if it is valid.
    pub fn latest(&self) -> Option<&IndicatorPoint> {
        self.values.last().filter(|p| p.valid)
    }

    pub fn latest_simple(&self) -> Option<f64> {
        self.latest().and_then(IndicatorPoint::as_simple)
    }

    pub fn simple_at(&self, index: usize) -> Option<f64> {
        self.values.get(index).and_then(IndicatorPoint::as_simple)
    }
}

pub(crate) fn factor_to_x100(factor: f64) -> u32 {
    (factor * 100.0).round().max(0.0) as u32
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::VolumeSma(period) => write!(f, "VOLUME_SMA({})", period),
            IndicatorType::Pivot(period) => write!(f, "PIVOT({})", period),
            IndicatorType::SuperTrend {
                atr_period,
                factor_x100,
            } => {
                let factor = *factor_x100 as f64 / 100.0;
                write!(f, "SUPERTREND({},{})", atr_period, factor)
            }
            IndicatorType::PivotSuperTrend {
                pivot_period,
                atr_period,
                factor_x100,
            } => {
                let factor = *factor_x100 as f64 / 100.0;
                write!(
                    f,
                    "PIVOT_SUPERTREND({},{},{})",
                    pivot_period, atr_period, factor
                )
            }
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Up => write!(f, "up"),
            Trend::Down => write!(f, "down"),
            Trend::Flat => write!(f, "flat"),
        }
    }
}
