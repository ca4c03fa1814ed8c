//! Candle representation and the immutable, time-ordered candle store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Why a candle cannot be used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandleDefect {
    NonFinite,
    NegativeVolume,
    HighBelowLow,
    BodyOutsideRange,
}

impl fmt::Display for CandleDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandleDefect::NonFinite => write!(f, "non-finite price or volume"),
            CandleDefect::NegativeVolume => write!(f, "negative volume"),
            CandleDefect::HighBelowLow => write!(f, "high below low"),
            CandleDefect::BodyOutsideRange => write!(f, "open/close outside high-low range"),
        }
    }
}

impl Candle {
    /// (high + low) / 2
    pub fn hl2(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    pub fn defect(&self) -> Option<CandleDefect> {
        let fields = [self.open, self.high, self.low, self.close, self.volume];
        if fields.iter().any(|v| !v.is_finite()) {
            return Some(CandleDefect::NonFinite);
        }
        if self.volume < 0.0 {
            return Some(CandleDefect::NegativeVolume);
        }
        if self.high < self.low {
            return Some(CandleDefect::HighBelowLow);
        }
        let in_range = |p: f64| p >= self.low && p <= self.high;
        if !in_range(self.open) || !in_range(self.close) {
            return Some(CandleDefect::BodyOutsideRange);
        }
        None
    }
}

/// Candles ordered by non-decreasing timestamp. Never mutated after construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(candles: Vec<Candle>) -> Result<Self, EngineError> {
        if let Some(i) = candles
            .windows(2)
            .position(|w| w[1].timestamp < w[0].timestamp)
        {
            return Err(EngineError::UnorderedCandles { index: i + 1 });
        }
        Ok(Self { candles })
    }

    /// Sorts by timestamp before storing. Equal timestamps keep their input order.
    pub fn from_unsorted(mut candles: Vec<Candle>) -> Self {
        candles.sort_by_key(|c| c.timestamp);
        Self { candles }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// All candles up to and including `index`.
    pub fn window(&self, index: usize) -> &[Candle] {
        let end = (index + 1).min(self.candles.len());
        &self.candles[..end]
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candle> {
        self.candles.iter()
    }
}

impl<'a> IntoIterator for &'a CandleSeries {
    type Item = &'a Candle;
    type IntoIter = std::slice::Iter<'a, Candle>;

    fn into_iter(self) -> Self::IntoIter {
        self.candles.iter()
    }
}
