#![allow(dead_code)]

use barbacktest::domain::candle::Candle;
use barbacktest::domain::engine_config::EngineConfig;
use chrono::{DateTime, Utc};

pub const START: i64 = 1_700_000_000;

pub fn ts(hours: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(START + hours * 3600, 0).unwrap()
}

pub fn bar(hour: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
    Candle {
        timestamp: ts(hour),
        open,
        high,
        low,
        close,
        volume: 1000.0,
    }
}

/// Hourly candles drifting by `step` per bar with a fixed one-unit range.
pub fn trending(n: usize, start: f64, step: f64) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let close = start + step * i as f64;
            let open = close - step * 0.2;
            bar(i as i64, open, open.max(close) + 0.5, open.min(close) - 0.5, close)
        })
        .collect()
}

/// Rises, falls, then rises again; long enough to open and close several trades.
pub fn swings(n: usize) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let x = i as f64;
            let close = 100.0 + (x / 6.0).sin() * 8.0 + x * 0.05;
            let open = close - (x / 6.0).cos() * 0.4;
            bar(i as i64, open, open.max(close) + 0.6, open.min(close) - 0.6, close)
        })
        .collect()
}

/// Short warmup periods so the tests reach signals quickly.
pub fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::new("TEST", 0.7);
    config.indicators.ema_fast = 3;
    config.indicators.ema_mid = 5;
    config.indicators.ema_slow = 8;
    config.indicators.rsi_period = 5;
    config.indicators.atr_period = 5;
    config.indicators.volume_period = 5;
    // Past the ends of the scale so one-way runs (RSI 100 or 0) still qualify.
    config.signal.long_rsi_range.high = 101.0;
    config.signal.short_rsi_range.low = -1.0;
    config.risk.min_notional = 1.0;
    config.equity_cadence = 10;
    config
}
