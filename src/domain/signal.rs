//! Triple-EMA signal generator.
//!
//! A long signal needs `fast > mid > slow`, a close at or above the fast EMA
//! within a tolerance band, and RSI inside the long range. Short mirrors it.
//! Confidence is the sum of the weights of the sub-conditions that hold,
//! clipped to `[0, 1]`.

use serde::{Deserialize, Serialize};

use crate::domain::candle::Candle;
use crate::domain::indicator::Trend;
use crate::domain::position::Side;
use crate::domain::snapshot::IndicatorSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
    None,
}

impl Direction {
    pub fn side(self) -> Option<Side> {
        match self {
            Direction::Long => Some(Side::Long),
            Direction::Short => Some(Side::Short),
            Direction::None => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalReason {
    EmaAlignment,
    PriceNearFastEma,
    RsiInRange,
    RsiOptimal,
    CandleColor,
    EmaSpread,
    VolumeStrength,
    TrendAgreement,
}

/// Open RSI band: a reading on either bound is outside.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RsiRange {
    pub low: f64,
    pub high: f64,
}

impl RsiRange {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, rsi: f64) -> bool {
        rsi > self.low && rsi < self.high
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Fractional distance the close may sit on the wrong side of the fast EMA.
    pub tolerance: f64,
    pub long_rsi_range: RsiRange,
    pub short_rsi_range: RsiRange,
    pub long_rsi_optimal: RsiRange,
    pub short_rsi_optimal: RsiRange,
    /// When set, volume must exceed its average by this multiple to signal at all.
    pub volume_filter_multiple: Option<f64>,
    pub require_trend_agreement: bool,
    pub base_weight: f64,
    pub candle_color_weight: f64,
    pub ema_spread_weight: f64,
    pub min_ema_spread: f64,
    pub volume_weight: f64,
    pub volume_strength_multiple: f64,
    pub rsi_optimal_weight: f64,
    pub trend_weight: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.002,
            long_rsi_range: RsiRange::new(40.0, 80.0),
            short_rsi_range: RsiRange::new(20.0, 60.0),
            long_rsi_optimal: RsiRange::new(50.0, 70.0),
            short_rsi_optimal: RsiRange::new(30.0, 50.0),
            volume_filter_multiple: None,
            require_trend_agreement: false,
            base_weight: 0.70,
            candle_color_weight: 0.10,
            ema_spread_weight: 0.10,
            min_ema_spread: 0.0015,
            volume_weight: 0.05,
            volume_strength_multiple: 1.2,
            rsi_optimal_weight: 0.10,
            trend_weight: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub direction: Direction,
    pub confidence: f64,
    pub reasons: Vec<SignalReason>,
}

impl Signal {
    pub fn none() -> Self {
        Self {
            direction: Direction::None,
            confidence: 0.0,
            reasons: Vec::new(),
        }
    }

    pub fn is_actionable(&self, threshold: f64) -> bool {
        self.direction != Direction::None && self.confidence >= threshold
    }
}

pub fn generate_signal(
    snapshot: &IndicatorSnapshot,
    candle: &Candle,
    config: &SignalConfig,
) -> Signal {
    let Some((fast, mid, slow)) = snapshot.emas() else {
        return Signal::none();
    };
    let Some(rsi) = snapshot.rsi else {
        return Signal::none();
    };
    if config.require_trend_agreement && snapshot.trend.is_none() {
        return Signal::none();
    }
    if let Some(multiple) = config.volume_filter_multiple {
        match snapshot.volume_avg {
            Some(avg) if candle.volume > avg * multiple => {}
            _ => return Signal::none(),
        }
    }

    let close = candle.close;
    let direction = if fast > mid
        && mid > slow
        && close >= fast * (1.0 - config.tolerance)
        && config.long_rsi_range.contains(rsi)
    {
        Direction::Long
    } else if fast < mid
        && mid < slow
        && close <= fast * (1.0 + config.tolerance)
        && config.short_rsi_range.contains(rsi)
    {
        Direction::Short
    } else {
        return Signal::none();
    };

    let wanted_trend = match direction {
        Direction::Long => Trend::Up,
        _ => Trend::Down,
    };
    let trend_agrees = snapshot.trend == Some(wanted_trend);
    if config.require_trend_agreement && !trend_agrees {
        return Signal::none();
    }

    let mut reasons = vec![
        SignalReason::EmaAlignment,
        SignalReason::PriceNearFastEma,
        SignalReason::RsiInRange,
    ];
    let mut confidence = config.base_weight;

    let colour_matches = match direction {
        Direction::Long => candle.is_bullish(),
        _ => candle.is_bearish(),
    };
    if colour_matches {
        confidence += config.candle_color_weight;
        reasons.push(SignalReason::CandleColor);
    }

    if slow > 0.0 && (fast - slow).abs() / slow > config.min_ema_spread {
        confidence += config.ema_spread_weight;
        reasons.push(SignalReason::EmaSpread);
    }

    if let Some(avg) = snapshot.volume_avg {
        if candle.volume > avg * config.volume_strength_multiple {
            confidence += config.volume_weight;
            reasons.push(SignalReason::VolumeStrength);
        }
    }

    let optimal = match direction {
        Direction::Long => config.long_rsi_optimal,
        _ => config.short_rsi_optimal,
    };
    if optimal.contains(rsi) {
        confidence += config.rsi_optimal_weight;
        reasons.push(SignalReason::RsiOptimal);
    }

    if trend_agrees {
        confidence += config.trend_weight;
        reasons.push(SignalReason::TrendAgreement);
    }

    Signal {
        direction,
        confidence: confidence.clamp(0.0, 1.0),
        reasons,
    }
}
