//! Simple moving average of volume.

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};

pub fn calculate_volume_sma(candles: &[Candle], period: usize) -> IndicatorSeries {
    if period == 0 {
        return IndicatorSeries::empty(IndicatorType::VolumeSma(period));
    }

    let mut values = Vec::with_capacity(candles.len());
    let mut sum = 0.0;

    for (i, candle) in candles.iter().enumerate() {
        sum += candle.volume;
        if i >= period {
            sum -= candles[i - period].volume;
        }
        if i + 1 < period {
            values.push(IndicatorPoint::invalid(candle.timestamp));
        } else {
            values.push(IndicatorPoint::simple(candle.timestamp, sum / period as f64));
        }
    }

    IndicatorSeries {
        indicator_type: IndicatorType::VolumeSma(period),
        values,
    }
}
