//! Reduces a candle window to the indicator readings at its last bar.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::candle::Candle;
use crate::domain::indicator::Trend;
use crate::domain::indicator::atr::calculate_atr;
use crate::domain::indicator::ema::calculate_ema;
use crate::domain::indicator::pivot::calculate_pivot_supertrend;
use crate::domain::indicator::rsi::calculate_rsi;
use crate::domain::indicator::supertrend::{band_at, calculate_supertrend};
use crate::domain::indicator::volume::calculate_volume_sma;

/// Which overlay supplies the snapshot's trend flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendSource {
    /// Classic SuperTrend around hl2.
    AtrBands,
    /// SuperTrend centered on confirmed pivot points.
    Pivot,
}

impl std::str::FromStr for TrendSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "atr" | "atr_bands" | "supertrend" => Ok(TrendSource::AtrBands),
            "pivot" | "pivot_supertrend" => Ok(TrendSource::Pivot),
            other => Err(format!("unknown trend source '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub ema_fast: usize,
    pub ema_mid: usize,
    pub ema_slow: usize,
    pub rsi_period: usize,
    pub atr_period: usize,
    pub volume_period: usize,
    pub supertrend_factor: f64,
    pub pivot_period: usize,
    pub trend_source: TrendSource,
    /// Upper bound on the number of trailing candles fed to the indicators.
    pub lookback: Option<usize>,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            ema_fast: 9,
            ema_mid: 21,
            ema_slow: 50,
            rsi_period: 14,
            atr_period: 14,
            volume_period: 20,
            supertrend_factor: 3.0,
            pivot_period: 2,
            trend_source: TrendSource::AtrBands,
            lookback: None,
        }
    }
}

/// Latest indicator values for one bar. `None` means insufficient history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub timestamp: DateTime<Utc>,
    pub ema_fast: Option<f64>,
    pub ema_mid: Option<f64>,
    pub ema_slow: Option<f64>,
    pub rsi: Option<f64>,
    pub atr: Option<f64>,
    pub volume_avg: Option<f64>,
    pub trend: Option<Trend>,
    pub supertrend: Option<f64>,
}

impl IndicatorSnapshot {
    pub fn emas(&self) -> Option<(f64, f64, f64)> {
        Some((self.ema_fast?, self.ema_mid?, self.ema_slow?))
    }
}

/// Computes every configured indicator over `window` and keeps the last
/// reading. Returns `None` for an empty window.
pub fn build_snapshot(window: &[Candle], config: &IndicatorConfig) -> Option<IndicatorSnapshot> {
    let window = match config.lookback {
        Some(n) if n > 0 && window.len() > n => &window[window.len() - n..],
        _ => window,
    };
    let last = window.last()?;

    let trend_series = match config.trend_source {
        TrendSource::AtrBands => {
            calculate_supertrend(window, config.atr_period, config.supertrend_factor)
        }
        TrendSource::Pivot => calculate_pivot_supertrend(
            window,
            config.pivot_period,
            config.atr_period,
            config.supertrend_factor,
        ),
    };
    let band = band_at(&trend_series, window.len() - 1);

    Some(IndicatorSnapshot {
        timestamp: last.timestamp,
        ema_fast: calculate_ema(window, config.ema_fast).latest_simple(),
        ema_mid: calculate_ema(window, config.ema_mid).latest_simple(),
        ema_slow: calculate_ema(window, config.ema_slow).latest_simple(),
        rsi: calculate_rsi(window, config.rsi_period).latest_simple(),
        atr: calculate_atr(window, config.atr_period).latest_simple(),
        volume_avg: calculate_volume_sma(window, config.volume_period).latest_simple(),
        trend: band.map(|(trend, _)| trend),
        supertrend: band.map(|(_, level)| level),
    })
}
