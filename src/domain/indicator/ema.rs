//! Exponential Moving Average indicator.
//!
//! k = 2/(n+1), seed with the SMA of the first n closes, then
//! EMA[i] = C[i]*k + EMA[i-1]*(1-k). Warmup: first (n-1) bars are invalid.

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};

pub fn calculate_ema(candles: &[Candle], period: usize) -> IndicatorSeries {
    if period == 0 || candles.is_empty() {
        return IndicatorSeries::empty(IndicatorType::Ema(period));
    }

    let mut values = Vec::with_capacity(candles.len());
    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = 0.0;
    let mut sum = 0.0;

    for (i, candle) in candles.iter().enumerate() {
        if i < period - 1 {
            sum += candle.close;
            values.push(IndicatorPoint::invalid(candle.timestamp));
        } else if i == period - 1 {
            sum += candle.close;
            ema = sum / period as f64;
            values.push(IndicatorPoint::simple(candle.timestamp, ema));
        } else {
            ema = candle.close * k + ema * (1.0 - k);
            values.push(IndicatorPoint::simple(candle.timestamp, ema));
        }
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Ema(period),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::flat_candles;
    use proptest::prelude::*;

    /// Closed-form EMA of `closes` at the last index, written without recursion.
    fn ema_from_scratch(closes: &[f64], period: usize) -> f64 {
        let k = 2.0 / (period as f64 + 1.0);
        let seed = closes[..period].iter().sum::<f64>() / period as f64;
        let tail = &closes[period..];
        let n = tail.len() as i32;
        let mut value = seed * (1.0 - k).powi(n);
        for (j, c) in tail.iter().enumerate() {
            value += k * c * (1.0 - k).powi(n - 1 - j as i32);
        }
        value
    }

    #[test]
    fn ema_warmup() {
        let series = calculate_ema(&flat_candles(&[10.0, 20.0, 30.0, 40.0, 50.0]), 3);

        assert!(!series.values[0].valid);
        assert!(!series.values[1].valid);
        assert!(series.values[2].valid);
        assert!(series.values[3].valid);
        assert!(series.values[4].valid);
    }

    #[test]
    fn ema_period_1_tracks_close() {
        let series = calculate_ema(&flat_candles(&[10.0, 20.0, 30.0]), 1);
        assert_eq!(series.simple_at(0), Some(10.0));
        assert_eq!(series.simple_at(1), Some(20.0));
        assert_eq!(series.simple_at(2), Some(30.0));
    }

    #[test]
    fn ema_seed_is_sma() {
        let series = calculate_ema(&flat_candles(&[10.0, 20.0, 30.0]), 3);
        let v = series.simple_at(2).unwrap();
        assert!((v - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ema_recursive_calculation() {
        let series = calculate_ema(&flat_candles(&[10.0, 20.0, 30.0, 40.0, 50.0]), 3);

        let k = 2.0 / 4.0;
        let sma = 20.0;
        let ema_3 = 40.0 * k + sma * (1.0 - k);
        let ema_4 = 50.0 * k + ema_3 * (1.0 - k);

        assert!((series.simple_at(3).unwrap() - ema_3).abs() < f64::EPSILON);
        assert!((series.simple_at(4).unwrap() - ema_4).abs() < f64::EPSILON);
    }

    #[test]
    fn ema_equal_prices() {
        let series = calculate_ema(&flat_candles(&[100.0; 5]), 3);
        for i in 2..5 {
            assert!((series.simple_at(i).unwrap() - 100.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn ema_insufficient_history_is_unavailable() {
        let series = calculate_ema(&flat_candles(&[10.0, 20.0]), 5);
        assert_eq!(series.values.len(), 2);
        assert!(series.latest_simple().is_none());
    }

    #[test]
    fn ema_indicator_type() {
        let series = calculate_ema(&flat_candles(&[10.0, 20.0, 30.0]), 5);
        assert_eq!(series.indicator_type, IndicatorType::Ema(5));
    }

    #[test]
    fn ema_empty_candles() {
        assert!(calculate_ema(&[], 3).values.is_empty());
    }

    #[test]
    fn ema_period_0() {
        assert!(calculate_ema(&flat_candles(&[10.0, 20.0]), 0).values.is_empty());
    }

    proptest! {
        #[test]
        fn iterated_ema_matches_recomputation(
            closes in prop::collection::vec(1.0f64..1000.0, 1..80),
            period in 1usize..20,
        ) {
            prop_assume!(closes.len() >= period);
            let series = calculate_ema(&flat_candles(&closes), period);
            let iterated = series.latest_simple().unwrap();
            let direct = ema_from_scratch(&closes, period);
            prop_assert!((iterated - direct).abs() <= 1e-9 * direct.abs().max(1.0));
        }
    }
}
