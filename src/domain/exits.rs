//! Per-bar exit evaluation for the open position.
//!
//! Conditions are checked in a fixed order and the first match wins:
//! stop-loss, take-profit, signal reversal, oracle close, profit protection,
//! trailing stop, maximum holding time, emergency loss.

use serde::{Deserialize, Serialize};

use crate::domain::candle::Candle;
use crate::domain::indicator::Trend;
use crate::domain::position::{ExitReason, Position, Side};
use crate::domain::signal::Signal;
use crate::domain::snapshot::IndicatorSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitConfig {
    /// Opposite signals at or above this confidence close the position.
    pub reversal_confidence: Option<f64>,
    /// Exit once this favourable move is reached and the trend no longer agrees.
    pub profit_protection_pct: Option<f64>,
    /// Favourable move that arms the trailing stop. `None` disables trailing.
    pub trailing_activation_pct: Option<f64>,
    pub trailing_atr_multiplier: f64,
    pub max_holding_hours: Option<f64>,
    /// Unrealized loss, as a fraction of capital, that forces an exit.
    pub emergency_loss_fraction: Option<f64>,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            reversal_confidence: Some(0.85),
            profit_protection_pct: None,
            trailing_activation_pct: Some(0.01),
            trailing_atr_multiplier: 1.5,
            max_holding_hours: Some(24.0),
            emergency_loss_fraction: Some(0.05),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitDecision {
    pub reason: ExitReason,
    /// Reference fill price before slippage.
    pub price: f64,
}

/// Bar-local inputs to exit evaluation.
pub struct ExitContext<'a> {
    pub candle: &'a Candle,
    pub snapshot: Option<&'a IndicatorSnapshot>,
    pub signal: &'a Signal,
    pub oracle_close: bool,
    pub capital: f64,
}

/// Fill for a protective level: the level itself, or the open when the bar
/// gapped through it.
fn stop_fill(side: Side, level: f64, open: f64) -> f64 {
    match side {
        Side::Long if open <= level => open,
        Side::Short if open >= level => open,
        _ => level,
    }
}

fn target_fill(side: Side, level: f64, open: f64) -> f64 {
    match side {
        Side::Long if open >= level => open,
        Side::Short if open <= level => open,
        _ => level,
    }
}

fn trailing_breached(side: Side, level: f64, candle: &Candle) -> bool {
    match side {
        Side::Long => candle.low <= level,
        Side::Short => candle.high >= level,
    }
}

/// Moves the trailing stop toward price once armed. Never loosens it.
pub fn ratchet_trailing(
    position: &mut Position,
    close: f64,
    atr: Option<f64>,
    config: &ExitConfig,
) {
    let (Some(activation), Some(atr)) = (config.trailing_activation_pct, atr) else {
        return;
    };
    if position.unrealized_return(close) < activation {
        return;
    }
    let candidate = close - position.side.sign() * atr * config.trailing_atr_multiplier;
    position.trailing_stop = Some(match (position.side, position.trailing_stop) {
        (_, None) => candidate,
        (Side::Long, Some(current)) => current.max(candidate),
        (Side::Short, Some(current)) => current.min(candidate),
    });
}

pub fn evaluate_exit(
    position: &mut Position,
    ctx: &ExitContext<'_>,
    config: &ExitConfig,
) -> Option<ExitDecision> {
    let candle = ctx.candle;
    let side = position.side;
    let at_close = |reason| {
        Some(ExitDecision {
            reason,
            price: candle.close,
        })
    };

    if position.stop_hit(candle.low, candle.high) {
        return Some(ExitDecision {
            reason: ExitReason::StopLoss,
            price: stop_fill(side, position.stop_loss, candle.open),
        });
    }

    if position.target_hit(candle.low, candle.high) {
        return Some(ExitDecision {
            reason: ExitReason::TakeProfit,
            price: target_fill(side, position.take_profit, candle.open),
        });
    }

    if let Some(threshold) = config.reversal_confidence {
        let opposite = ctx.signal.direction.side() == Some(side.opposite());
        if opposite && ctx.signal.confidence >= threshold {
            return at_close(ExitReason::SignalReversal);
        }
    }

    if ctx.oracle_close {
        return at_close(ExitReason::OracleClose);
    }

    if let Some(pct) = config.profit_protection_pct {
        let favourable = match side {
            Side::Long => Trend::Up,
            Side::Short => Trend::Down,
        };
        let trend = ctx.snapshot.and_then(|s| s.trend);
        let weakening = matches!(trend, Some(t) if t != favourable);
        if position.unrealized_return(candle.close) >= pct && weakening {
            return at_close(ExitReason::ProfitProtection);
        }
    }

    if let Some(level) = position.trailing_stop {
        if trailing_breached(side, level, candle) {
            return Some(ExitDecision {
                reason: ExitReason::TrailingStop,
                price: stop_fill(side, level, candle.open),
            });
        }
    }
    ratchet_trailing(position, candle.close, ctx.snapshot.and_then(|s| s.atr), config);

    if let Some(hours) = config.max_holding_hours {
        let held = (candle.timestamp - position.entry_time).num_seconds() as f64 / 3600.0;
        if held >= hours {
            return at_close(ExitReason::MaxHolding);
        }
    }

    if let Some(fraction) = config.emergency_loss_fraction {
        if -position.unrealized_pnl(candle.close) > fraction * ctx.capital {
            return at_close(ExitReason::EmergencyLoss);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::RiskSnapshot;
    use crate::domain::signal::Direction;
    use chrono::{DateTime, Utc};

    fn ts(hours: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + hours * 3600, 0).unwrap()
    }

    fn position(side: Side) -> Position {
        let (stop_loss, take_profit) = match side {
            Side::Long => (97.0, 106.0),
            Side::Short => (103.0, 94.0),
        };
        Position {
            symbol: "ETH_USDT".into(),
            side,
            entry_price: 100.0,
            entry_time: ts(0),
            entry_bar: 0,
            size: 10.0,
            stop_loss,
            take_profit,
            trailing_stop: None,
            confidence: 0.8,
            risk: RiskSnapshot {
                capital: 10_000.0,
                risk_fraction: 0.01,
                leverage: 1.0,
                atr: 2.0,
                stop_distance: 3.0,
            },
            entry_fee: 0.0,
            entry_reasons: Vec::new(),
        }
    }

    fn bar(hour: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: ts(hour),
            open,
            high,
            low,
            close,
            volume: 1000.0,
        }
    }

    fn snapshot(atr: f64, trend: Trend) -> IndicatorSnapshot {
        IndicatorSnapshot {
            timestamp: ts(1),
            ema_fast: None,
            ema_mid: None,
            ema_slow: None,
            rsi: None,
            atr: Some(atr),
            volume_avg: None,
            trend: Some(trend),
            supertrend: None,
        }
    }

    fn eval(
        pos: &mut Position,
        candle: &Candle,
        snap: Option<&IndicatorSnapshot>,
        signal: &Signal,
    ) -> Option<ExitDecision> {
        let ctx = ExitContext {
            candle,
            snapshot: snap,
            signal,
            oracle_close: false,
            capital: 10_000.0,
        };
        evaluate_exit(pos, &ctx, &ExitConfig::default())
    }

    #[test]
    fn long_stop_loss_at_level() {
        let mut pos = position(Side::Long);
        let candle = bar(1, 99.0, 100.0, 96.5, 98.0);
        let exit = eval(&mut pos, &candle, None, &Signal::none()).unwrap();
        assert_eq!(exit.reason, ExitReason::StopLoss);
        assert!((exit.price - 97.0).abs() < f64::EPSILON);
    }

    #[test]
    fn long_stop_gap_fills_at_open() {
        let mut pos = position(Side::Long);
        let candle = bar(1, 95.0, 96.0, 94.0, 95.5);
        let exit = eval(&mut pos, &candle, None, &Signal::none()).unwrap();
        assert!((exit.price - 95.0).abs() < f64::EPSILON);
    }

    #[test]
    fn long_take_profit() {
        let mut pos = position(Side::Long);
        let candle = bar(1, 104.0, 106.5, 103.5, 105.0);
        let exit = eval(&mut pos, &candle, None, &Signal::none()).unwrap();
        assert_eq!(exit.reason, ExitReason::TakeProfit);
        assert!((exit.price - 106.0).abs() < f64::EPSILON);
    }

    #[test]
    fn short_stop_and_target_mirror() {
        let mut pos = position(Side::Short);
        let up = bar(1, 101.0, 103.5, 100.5, 102.0);
        let exit = eval(&mut pos, &up, None, &Signal::none()).unwrap();
        assert_eq!(exit.reason, ExitReason::StopLoss);

        let mut pos = position(Side::Short);
        let down = bar(1, 93.0, 95.0, 92.5, 94.5);
        let exit = eval(&mut pos, &down, None, &Signal::none()).unwrap();
        assert_eq!(exit.reason, ExitReason::TakeProfit);
        // Opened through the target: fills at the better open.
        assert!((exit.price - 93.0).abs() < f64::EPSILON);
    }

    #[test]
    fn stop_wins_when_both_levels_touched() {
        let mut pos = position(Side::Long);
        let wide = bar(1, 100.0, 107.0, 96.0, 101.0);
        let exit = eval(&mut pos, &wide, None, &Signal::none()).unwrap();
        assert_eq!(exit.reason, ExitReason::StopLoss);
    }

    #[test]
    fn reversal_needs_high_confidence() {
        let mut pos = position(Side::Long);
        let candle = bar(1, 100.0, 101.0, 99.0, 100.5);
        let weak = Signal {
            direction: Direction::Short,
            confidence: 0.80,
            reasons: Vec::new(),
        };
        assert_eq!(eval(&mut pos, &candle, None, &weak), None);

        let strong = Signal {
            confidence: 0.90,
            ..weak
        };
        let exit = eval(&mut pos, &candle, None, &strong).unwrap();
        assert_eq!(exit.reason, ExitReason::SignalReversal);
        assert!((exit.price - 100.5).abs() < f64::EPSILON);
    }

    #[test]
    fn oracle_close_exits_at_close() {
        let mut pos = position(Side::Long);
        let candle = bar(1, 100.0, 101.0, 99.0, 100.5);
        let signal = Signal::none();
        let ctx = ExitContext {
            candle: &candle,
            snapshot: None,
            signal: &signal,
            oracle_close: true,
            capital: 10_000.0,
        };
        let exit = evaluate_exit(&mut pos, &ctx, &ExitConfig::default()).unwrap();
        assert_eq!(exit.reason, ExitReason::OracleClose);
    }

    #[test]
    fn trailing_arms_then_only_tightens() {
        let mut pos = position(Side::Long);
        pos.take_profit = 200.0;
        let snap = snapshot(2.0, Trend::Up);

        // +3% at the close arms the trail at 103 - 3 = 100.
        let c1 = bar(1, 101.0, 103.5, 100.5, 103.0);
        assert_eq!(eval(&mut pos, &c1, Some(&snap), &Signal::none()), None);
        assert_eq!(pos.trailing_stop, Some(100.0));

        // A lower close does not loosen it.
        let c2 = bar(2, 102.5, 102.8, 101.5, 102.0);
        assert_eq!(eval(&mut pos, &c2, Some(&snap), &Signal::none()), None);
        assert_eq!(pos.trailing_stop, Some(100.0));

        let c3 = bar(3, 101.0, 101.2, 99.5, 100.2);
        let exit = eval(&mut pos, &c3, Some(&snap), &Signal::none()).unwrap();
        assert_eq!(exit.reason, ExitReason::TrailingStop);
        assert!((exit.price - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn trailing_short_mirror() {
        let mut pos = position(Side::Short);
        pos.take_profit = 10.0;
        let snap = snapshot(2.0, Trend::Down);
        let c1 = bar(1, 99.0, 99.5, 96.5, 97.0);
        assert_eq!(eval(&mut pos, &c1, Some(&snap), &Signal::none()), None);
        assert_eq!(pos.trailing_stop, Some(100.0));
        let c2 = bar(2, 97.0, 98.0, 95.0, 95.5);
        eval(&mut pos, &c2, Some(&snap), &Signal::none());
        assert_eq!(pos.trailing_stop, Some(98.5));
    }

    #[test]
    fn trailing_not_armed_below_activation() {
        let mut pos = position(Side::Long);
        let snap = snapshot(2.0, Trend::Up);
        let candle = bar(1, 100.0, 100.8, 99.5, 100.5);
        eval(&mut pos, &candle, Some(&snap), &Signal::none());
        assert_eq!(pos.trailing_stop, None);
    }

    #[test]
    fn max_holding_exit() {
        let mut pos = position(Side::Long);
        let early = bar(23, 100.0, 100.5, 99.5, 100.2);
        assert_eq!(eval(&mut pos, &early, None, &Signal::none()), None);
        let late = bar(24, 100.0, 100.5, 99.5, 100.2);
        let exit = eval(&mut pos, &late, None, &Signal::none()).unwrap();
        assert_eq!(exit.reason, ExitReason::MaxHolding);
    }

    #[test]
    fn emergency_loss_exit() {
        let mut pos = position(Side::Long);
        pos.size = 300.0;
        pos.stop_loss = 90.0;
        // 300 units * -2 = -600 > 5% of 10,000.
        let candle = bar(1, 99.0, 99.0, 97.5, 98.0);
        let exit = eval(&mut pos, &candle, None, &Signal::none()).unwrap();
        assert_eq!(exit.reason, ExitReason::EmergencyLoss);
    }

    #[test]
    fn profit_protection_on_trend_weakness() {
        let config = ExitConfig {
            profit_protection_pct: Some(0.03),
            ..ExitConfig::default()
        };
        let mut pos = position(Side::Long);
        pos.take_profit = 200.0;
        let candle = bar(1, 102.0, 103.5, 101.5, 103.2);
        let signal = Signal::none();

        let up = snapshot(2.0, Trend::Up);
        let ctx = ExitContext {
            candle: &candle,
            snapshot: Some(&up),
            signal: &signal,
            oracle_close: false,
            capital: 10_000.0,
        };
        assert_eq!(evaluate_exit(&mut pos, &ctx, &config), None);

        let flat = snapshot(2.0, Trend::Flat);
        let ctx = ExitContext {
            snapshot: Some(&flat),
            ..ctx
        };
        assert_eq!(
            evaluate_exit(&mut pos, &ctx, &config).unwrap().reason,
            ExitReason::ProfitProtection
        );
    }

    #[test]
    fn profit_protection_waits_for_a_known_trend() {
        let config = ExitConfig {
            profit_protection_pct: Some(0.03),
            ..ExitConfig::default()
        };
        let mut pos = position(Side::Long);
        pos.take_profit = 200.0;
        let candle = bar(1, 102.0, 103.5, 101.5, 103.2);
        let signal = Signal::none();

        let mut warming = snapshot(2.0, Trend::Up);
        warming.trend = None;
        let ctx = ExitContext {
            candle: &candle,
            snapshot: Some(&warming),
            signal: &signal,
            oracle_close: false,
            capital: 10_000.0,
        };
        assert_eq!(evaluate_exit(&mut pos, &ctx, &config), None);

        let mut pos = position(Side::Long);
        pos.take_profit = 200.0;
        let ctx = ExitContext {
            snapshot: None,
            ..ctx
        };
        assert_eq!(evaluate_exit(&mut pos, &ctx, &config), None);
    }
}
