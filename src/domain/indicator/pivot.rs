//! Pivot points and the pivot-centered SuperTrend.
//!
//! Bar `j` is a pivot high when its high is strictly greater than the highs of
//! the `period` bars on each side (pivot low mirrors with lows). A pivot at `j`
//! is confirmed at `j + period` and is reported at that index, so the point at
//! index `i` never depends on bars after `i`.

use crate::domain::candle::Candle;
use crate::domain::indicator::atr::calculate_atr;
use crate::domain::indicator::supertrend::trace_bands;
use crate::domain::indicator::{
    IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue, factor_to_x100,
};

fn is_pivot(
    candles: &[Candle],
    center: usize,
    period: usize,
    key: impl Fn(&Candle) -> f64,
    higher: bool,
) -> bool {
    let pivot = key(&candles[center]);
    (center - period..=center + period)
        .filter(|&k| k != center)
        .all(|k| {
            let other = key(&candles[k]);
            if higher { pivot > other } else { pivot < other }
        })
}

pub fn calculate_pivots(candles: &[Candle], period: usize) -> IndicatorSeries {
    if period == 0 {
        return IndicatorSeries::empty(IndicatorType::Pivot(period));
    }

    let values = candles
        .iter()
        .enumerate()
        .map(|(i, candle)| {
            if i < 2 * period {
                return IndicatorPoint::invalid(candle.timestamp);
            }
            let center = i - period;
            let high = is_pivot(candles, center, period, |c| c.high, true)
                .then_some(candles[center].high);
            let low = is_pivot(candles, center, period, |c| c.low, false)
                .then_some(candles[center].low);
            IndicatorPoint {
                timestamp: candle.timestamp,
                valid: true,
                value: IndicatorValue::Pivot { high, low },
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Pivot(period),
        values,
    }
}

/// SuperTrend whose center line is built from confirmed pivots: the first pivot
/// seeds it, each later one moves it by `center = (center × 2 + pivot) / 3`.
/// A pivot high takes precedence when both confirm on the same bar.
pub fn calculate_pivot_supertrend(
    candles: &[Candle],
    pivot_period: usize,
    atr_period: usize,
    factor: f64,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::PivotSuperTrend {
        pivot_period,
        atr_period,
        factor_x100: factor_to_x100(factor),
    };
    if pivot_period == 0 || atr_period == 0 {
        return IndicatorSeries::empty(indicator_type);
    }

    let pivots = calculate_pivots(candles, pivot_period);
    let atr = calculate_atr(candles, atr_period);

    let mut center: Option<f64> = None;
    let bases: Vec<Option<(f64, f64)>> = pivots
        .values
        .iter()
        .enumerate()
        .map(|(i, point)| {
            if let IndicatorValue::Pivot { high, low } = point.value {
                if let Some(pp) = high.or(low).filter(|_| point.valid) {
                    center = Some(match center {
                        None => pp,
                        Some(c) => (c * 2.0 + pp) / 3.0,
                    });
                }
            }
            match (center, atr.simple_at(i)) {
                (Some(c), Some(a)) => Some((c, factor * a)),
                _ => None,
            }
        })
        .collect();

    trace_bands(candles, &bases, indicator_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::Trend;
    use crate::domain::indicator::supertrend::band_at;
    use crate::domain::indicator::test_support::ohlc_candles;

    fn hl(high: f64, low: f64) -> (f64, f64, f64, f64) {
        let mid = (high + low) / 2.0;
        (mid, high, low, mid)
    }

    fn pivot_at(series: &IndicatorSeries, i: usize) -> (Option<f64>, Option<f64>) {
        match series.values[i].value {
            IndicatorValue::Pivot { high, low } => (high, low),
            _ => panic!("expected pivot value"),
        }
    }

    #[test]
    fn pivot_high_reported_at_confirmation() {
        let candles = ohlc_candles(&[
            hl(10.0, 5.0),
            hl(11.0, 6.0),
            hl(15.0, 7.0),
            hl(12.0, 6.5),
            hl(11.0, 6.0),
        ]);
        let series = calculate_pivots(&candles, 2);
        assert!(!series.values[3].valid);
        assert!(series.values[4].valid);
        assert_eq!(pivot_at(&series, 4), (Some(15.0), None));
    }

    #[test]
    fn pivot_low_mirrors() {
        let candles = ohlc_candles(&[
            hl(10.0, 5.0),
            hl(10.0, 4.0),
            hl(10.0, 2.0),
            hl(10.0, 3.0),
            hl(10.0, 4.5),
        ]);
        let series = calculate_pivots(&candles, 2);
        assert_eq!(pivot_at(&series, 4), (None, Some(2.0)));
    }

    #[test]
    fn equal_high_is_not_pivot() {
        let candles = ohlc_candles(&[
            hl(10.0, 5.0),
            hl(15.0, 6.0),
            hl(15.0, 7.0),
            hl(12.0, 6.5),
            hl(11.0, 6.0),
        ]);
        let series = calculate_pivots(&candles, 2);
        assert_eq!(pivot_at(&series, 4).0, None);
    }

    #[test]
    fn prefix_matches_full_series() {
        let rows: Vec<_> = (0..30)
            .map(|i| {
                let x = (i as f64 * 0.7).sin() * 5.0 + 100.0;
                hl(x + 1.0, x - 1.0)
            })
            .collect();
        let candles = ohlc_candles(&rows);
        let full = calculate_pivots(&candles, 2);
        for i in 0..candles.len() {
            let prefix = calculate_pivots(&candles[..=i], 2);
            assert_eq!(prefix.values[i], full.values[i]);
        }
    }

    #[test]
    fn pivot_supertrend_needs_a_pivot_first() {
        let rows: Vec<_> = (0..20)
            .map(|i| hl(100.0 + i as f64 + 1.0, 100.0 + i as f64 - 1.0))
            .collect();
        let candles = ohlc_candles(&rows);
        // A steady rise has no confirmed pivots, so the center never forms.
        let series = calculate_pivot_supertrend(&candles, 2, 10, 3.0);
        assert!(series.values.iter().all(|p| !p.valid));
    }

    #[test]
    fn pivot_supertrend_center_weighting() {
        // Pivot high 120 confirms at 4, pivot low 80 confirms at 10.
        let candles = ohlc_candles(&[
            hl(101.0, 99.0),
            hl(102.0, 99.0),
            hl(120.0, 100.0),
            hl(103.0, 98.0),
            hl(102.0, 97.0),
            hl(101.0, 96.0),
            hl(100.0, 95.0),
            hl(99.0, 94.0),
            hl(98.0, 80.0),
            hl(99.0, 90.0),
            hl(100.0, 91.0),
        ]);
        let series = calculate_pivot_supertrend(&candles, 2, 1, 0.0);
        // With a zero factor both bands sit on the center line.
        let upper_at = |i: usize| match series.values[i].value {
            IndicatorValue::Band { upper, .. } => upper,
            _ => panic!("expected band"),
        };
        assert!(!series.values[3].valid);
        assert!((upper_at(4) - 120.0).abs() < 1e-9);
        let expected = (120.0 * 2.0 + 80.0) / 3.0;
        let lower_at_10 = match series.values[10].value {
            IndicatorValue::Band { lower, .. } => lower,
            _ => panic!("expected band"),
        };
        assert!(series.values[10].valid);
        assert!(lower_at_10 <= expected + 1e-9);
        assert_eq!(band_at(&series, 4).unwrap().0, Trend::Flat);
    }

    #[test]
    fn zero_periods_are_empty() {
        let candles = ohlc_candles(&[hl(10.0, 5.0); 3]);
        assert!(calculate_pivots(&candles, 0).values.is_empty());
        assert!(calculate_pivot_supertrend(&candles, 2, 0, 3.0).values.is_empty());
    }
}
