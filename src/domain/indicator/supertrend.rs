//! SuperTrend overlay.
//!
//! Basic bands are `center ± factor × ATR`, with `center = hl2` for the classic
//! variant. Final bands ratchet: the lower band only rises while the previous
//! close stays above it, the upper band only falls while the previous close
//! stays below it. The trend flips down when the close breaks the previous
//! final lower band and up when it breaks the previous final upper band;
//! otherwise it keeps its previous value. Before the first flip it is `Flat`.

use crate::domain::candle::Candle;
use crate::domain::indicator::atr::calculate_atr;
use crate::domain::indicator::{
    IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue, Trend, factor_to_x100,
};

pub fn calculate_supertrend(candles: &[Candle], atr_period: usize, factor: f64) -> IndicatorSeries {
    let indicator_type = IndicatorType::SuperTrend {
        atr_period,
        factor_x100: factor_to_x100(factor),
    };
    if atr_period == 0 {
        return IndicatorSeries::empty(indicator_type);
    }

    let atr = calculate_atr(candles, atr_period);
    let bases: Vec<Option<(f64, f64)>> = candles
        .iter()
        .enumerate()
        .map(|(i, c)| atr.simple_at(i).map(|a| (c.hl2(), factor * a)))
        .collect();

    trace_bands(candles, &bases, indicator_type)
}

#[derive(Debug, Clone, Copy)]
struct BandState {
    upper: f64,
    lower: f64,
    trend: Trend,
}

/// Runs the ratchet and flip rules over per-bar `(center, offset)` pairs.
/// Bars without a base are invalid and do not reset the carried state.
pub(crate) fn trace_bands(
    candles: &[Candle],
    bases: &[Option<(f64, f64)>],
    indicator_type: IndicatorType,
) -> IndicatorSeries {
    let mut values = Vec::with_capacity(candles.len());
    let mut prev: Option<(BandState, f64)> = None;

    for (candle, base) in candles.iter().zip(bases) {
        let Some((center, offset)) = *base else {
            values.push(IndicatorPoint::invalid(candle.timestamp));
            continue;
        };
        let basic_upper = center + offset;
        let basic_lower = center - offset;

        let state = match prev {
            None => BandState {
                upper: basic_upper,
                lower: basic_lower,
                trend: Trend::Flat,
            },
            Some((last, prev_close)) => {
                let lower = if prev_close > last.lower {
                    basic_lower.max(last.lower)
                } else {
                    basic_lower
                };
                let upper = if prev_close < last.upper {
                    basic_upper.min(last.upper)
                } else {
                    basic_upper
                };
                let broke_up = candle.close > last.upper;
                let broke_down = candle.close < last.lower;
                let trend = match last.trend {
                    Trend::Up if broke_down => Trend::Down,
                    Trend::Down if broke_up => Trend::Up,
                    Trend::Flat if broke_up => Trend::Up,
                    Trend::Flat if broke_down => Trend::Down,
                    t => t,
                };
                BandState { upper, lower, trend }
            }
        };

        let level = match state.trend {
            Trend::Up => state.lower,
            Trend::Down => state.upper,
            Trend::Flat => (state.upper + state.lower) / 2.0,
        };
        values.push(IndicatorPoint {
            timestamp: candle.timestamp,
            valid: true,
            value: IndicatorValue::Band {
                level,
                upper: state.upper,
                lower: state.lower,
                trend: state.trend,
            },
        });
        prev = Some((state, candle.close));
    }

    IndicatorSeries {
        indicator_type,
        values,
    }
}

/// Trend and level of a band point, if valid.
pub fn band_at(series: &IndicatorSeries, index: usize) -> Option<(Trend, f64)> {
    match series.values.get(index) {
        Some(IndicatorPoint {
            valid: true,
            value: IndicatorValue::Band { trend, level, .. },
            ..
        }) => Some((*trend, *level)),
        _ => None,
    }
}
