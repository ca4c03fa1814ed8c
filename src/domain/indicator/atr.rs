//! Average True Range.
//!
//! TR[0] = high - low, TR[i] = max(H-L, |H-prevC|, |L-prevC|).
//! Seed is the mean of the first n TRs, then Wilder smoothing:
//! ATR[i] = (ATR[i-1] * (n-1) + TR[i]) / n. Warmup: first (n-1) bars are invalid.

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};

pub(crate) fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if i == 0 {
                c.high - c.low
            } else {
                c.true_range(candles[i - 1].close)
            }
        })
        .collect()
}

pub fn calculate_atr(candles: &[Candle], period: usize) -> IndicatorSeries {
    if period == 0 {
        return IndicatorSeries::empty(IndicatorType::Atr(period));
    }

    let tr = true_ranges(candles);
    let mut values = Vec::with_capacity(candles.len());
    let mut atr = 0.0;

    for (i, candle) in candles.iter().enumerate() {
        if i < period - 1 {
            values.push(IndicatorPoint::invalid(candle.timestamp));
        } else if i == period - 1 {
            atr = tr[..=i].iter().sum::<f64>() / period as f64;
            values.push(IndicatorPoint::simple(candle.timestamp, atr));
        } else {
            atr = (atr * (period - 1) as f64 + tr[i]) / period as f64;
            values.push(IndicatorPoint::simple(candle.timestamp, atr));
        }
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Atr(period),
        values,
    }
}
