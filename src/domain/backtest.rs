//! Bar-by-bar backtest runner.
//!
//! Per accepted bar, in order: validate the candle, rebuild the indicator
//! snapshot over all accepted candles up to this bar, evaluate exits for the
//! open position, look for an entry when flat, and record equity at the
//! configured cadence. Capital only changes when a trade closes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::candle::{Candle, CandleDefect};
use crate::domain::engine_config::EngineConfig;
use crate::domain::execution::{FillAction, FillModel, SlippageFill, calculate_fee};
use crate::domain::exits::{ExitContext, ExitDecision, evaluate_exit};
use crate::domain::metrics::Summary;
use crate::domain::position::{ExitReason, Position, RiskSnapshot, Side, Trade};
use crate::domain::risk::{EntryRejection, place_levels, plan_entry};
use crate::domain::signal::{Signal, generate_signal};
use crate::domain::snapshot::{IndicatorSnapshot, build_snapshot};
use crate::ports::decision_port::{Decision, DecisionOracle, OracleQuery};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WarningKind {
    MalformedCandle { defect: CandleDefect },
    OutOfOrderCandle,
    EntryRejected { rejection: EntryRejection },
    OracleUnavailable { reason: String },
    FillRejected { side: Side, action: FillAction },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunWarning {
    /// Index of the bar in the input sequence.
    pub bar: usize,
    pub timestamp: Option<DateTime<Utc>>,
    pub kind: WarningKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub bar: usize,
    pub timestamp: DateTime<Utc>,
    pub capital: f64,
    /// Capital plus the open position marked to the bar close.
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub symbol: String,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub warnings: Vec<RunWarning>,
    pub bars_processed: usize,
    pub bars_skipped: usize,
    /// Left open when `close_at_end` is off or the run was stopped early.
    pub open_position: Option<Position>,
}

impl BacktestResult {
    /// Trade statistics. Drawdown runs over closed-trade capital merged in
    /// time order with the marked-to-market equity curve.
    pub fn summary(&self) -> Summary {
        let summary = Summary::from_trades(self.initial_capital, &self.trades);
        if self.equity_curve.is_empty() {
            return summary;
        }
        summary.with_drawdown_over(&self.marked_path())
    }

    fn marked_path(&self) -> Vec<f64> {
        let mut points = Vec::with_capacity(self.trades.len() + self.equity_curve.len());
        let mut capital = self.initial_capital;
        for trade in &self.trades {
            capital += trade.pnl;
            points.push((trade.exit_time, capital));
        }
        points.extend(self.equity_curve.iter().map(|p| (p.timestamp, p.equity)));
        // Stable: a close sorts before the equity point of the same bar.
        points.sort_by_key(|(timestamp, _)| *timestamp);
        std::iter::once(self.initial_capital)
            .chain(points.into_iter().map(|(_, value)| value))
            .collect()
    }
}

/// Runner state: flat, or owning the single open position.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerState {
    Flat,
    Open(Position),
}

impl RunnerState {
    pub fn position(&self) -> Option<&Position> {
        match self {
            RunnerState::Flat => None,
            RunnerState::Open(p) => Some(p),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, RunnerState::Open(_))
    }
}

pub struct Runner {
    config: EngineConfig,
    fill_model: Box<dyn FillModel>,
    oracle: Option<Box<dyn DecisionOracle>>,
}

/// Mutable state of one run.
struct Ledger {
    capital: f64,
    state: RunnerState,
    accepted: Vec<Candle>,
    trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
    warnings: Vec<RunWarning>,
    skipped: usize,
}

impl Ledger {
    fn warn(&mut self, bar: usize, timestamp: Option<DateTime<Utc>>, kind: WarningKind) {
        self.warnings.push(RunWarning {
            bar,
            timestamp,
            kind,
        });
    }
}

impl Runner {
    pub fn new(config: EngineConfig) -> Self {
        let fill_model = Box::new(SlippageFill::new(config.slippage_pct));
        Self {
            config,
            fill_model,
            oracle: None,
        }
    }

    pub fn with_fill_model(mut self, model: impl FillModel + 'static) -> Self {
        self.fill_model = Box::new(model);
        self
    }

    pub fn with_oracle(mut self, oracle: impl DecisionOracle + 'static) -> Self {
        self.oracle = Some(Box::new(oracle));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn run(&self, candles: &[Candle]) -> BacktestResult {
        self.run_until(candles, |_, _| true)
    }

    /// Runs until the candles are exhausted or `should_continue` returns
    /// false. The predicate is polled before each bar with the bar index and
    /// the state left by the previous bar.
    pub fn run_until<F>(&self, candles: &[Candle], mut should_continue: F) -> BacktestResult
    where
        F: FnMut(usize, &RunnerState) -> bool,
    {
        let symbol = self.config.symbol.as_str();
        let mut ledger = Ledger {
            capital: self.config.initial_capital,
            state: RunnerState::Flat,
            accepted: Vec::with_capacity(candles.len()),
            trades: Vec::new(),
            equity_curve: Vec::new(),
            warnings: Vec::new(),
            skipped: 0,
        };
        let mut stopped_early = false;

        info!(symbol, bars = candles.len(), capital = ledger.capital, "backtest started");

        for (bar, candle) in candles.iter().enumerate() {
            if !should_continue(bar, &ledger.state) {
                info!(symbol, bar, "backtest stopped by caller");
                stopped_early = true;
                break;
            }
            self.step(bar, candle, &mut ledger);
        }

        if self.config.close_at_end && !stopped_early {
            self.close_at_end(&mut ledger, candles.len().saturating_sub(1));
        }

        let bars_processed = ledger.accepted.len();
        let open_position = match ledger.state {
            RunnerState::Open(p) => Some(p),
            RunnerState::Flat => None,
        };
        info!(
            symbol,
            trades = ledger.trades.len(),
            final_capital = ledger.capital,
            bars_processed,
            bars_skipped = ledger.skipped,
            "backtest finished"
        );

        BacktestResult {
            symbol: self.config.symbol.clone(),
            initial_capital: self.config.initial_capital,
            final_capital: ledger.capital,
            trades: ledger.trades,
            equity_curve: ledger.equity_curve,
            warnings: ledger.warnings,
            bars_processed,
            bars_skipped: ledger.skipped,
            open_position,
        }
    }

    fn step(&self, bar: usize, candle: &Candle, ledger: &mut Ledger) {
        let symbol = self.config.symbol.as_str();

        if let Some(defect) = candle.defect() {
            warn!(symbol, bar, reason = %defect, "skipping malformed candle");
            ledger.skipped += 1;
            ledger.warn(bar, Some(candle.timestamp), WarningKind::MalformedCandle { defect });
            return;
        }
        if ledger
            .accepted
            .last()
            .is_some_and(|prev| candle.timestamp < prev.timestamp)
        {
            warn!(symbol, bar, "skipping out-of-order candle");
            ledger.skipped += 1;
            ledger.warn(bar, Some(candle.timestamp), WarningKind::OutOfOrderCandle);
            return;
        }

        ledger.accepted.push(*candle);
        let snapshot = build_snapshot(&ledger.accepted, &self.config.indicators);
        let signal = match &snapshot {
            Some(s) => generate_signal(s, candle, &self.config.signal),
            None => Signal::none(),
        };
        debug!(
            symbol,
            bar,
            price = candle.close,
            direction = ?signal.direction,
            confidence = signal.confidence,
            "bar evaluated"
        );

        let mut oracle_decision: Option<Decision> = None;

        if let RunnerState::Open(position) = &mut ledger.state {
            let mut oracle_close = false;
            if self.oracle.is_some() {
                let context = tail(&ledger.accepted, self.config.oracle_context_bars);
                let (decision, warning) =
                    self.consult(bar, candle, Some(position.clone()), context);
                ledger.warnings.extend(warning);
                oracle_close = decision == Decision::Close;
                oracle_decision = Some(decision);
            }

            let ctx = ExitContext {
                candle,
                snapshot: snapshot.as_ref(),
                signal: &signal,
                oracle_close,
                capital: ledger.capital,
            };
            if let Some(exit) = evaluate_exit(position, &ctx, &self.config.exits) {
                self.close_position(bar, candle.timestamp, exit, ledger);
            }
        }

        if !ledger.state.is_open() {
            self.try_enter(bar, candle, snapshot.as_ref(), &signal, oracle_decision, ledger);
        }

        self.record_equity(bar, candle, ledger);
    }

    /// Asks the oracle, mapping any failure to `Hold` plus a warning.
    fn consult(
        &self,
        bar: usize,
        candle: &Candle,
        position: Option<Position>,
        context: &[Candle],
    ) -> (Decision, Option<RunWarning>) {
        let Some(oracle) = &self.oracle else {
            return (Decision::Hold, None);
        };
        let query = OracleQuery {
            symbol: self.config.symbol.clone(),
            candles: context.to_vec(),
            position,
        };
        match oracle.decide(&query) {
            Ok(d) => {
                let symbol = self.config.symbol.as_str();
                debug!(symbol, bar, decision = ?d.decision, "oracle answered");
                (d.decision, None)
            }
            Err(e) => {
                let symbol = self.config.symbol.as_str();
                warn!(symbol, bar, reason = %e, "oracle unavailable, holding");
                let warning = RunWarning {
                    bar,
                    timestamp: Some(candle.timestamp),
                    kind: WarningKind::OracleUnavailable {
                        reason: e.to_string(),
                    },
                };
                (Decision::Hold, Some(warning))
            }
        }
    }

    fn close_position(
        &self,
        bar: usize,
        timestamp: DateTime<Utc>,
        exit: ExitDecision,
        ledger: &mut Ledger,
    ) {
        let RunnerState::Open(position) = &ledger.state else {
            return;
        };
        let side = position.side;
        let size = position.size;

        let price = match self.fill_model.fill(side, FillAction::Exit, exit.price, size) {
            Some(p) => p,
            None if exit.reason == ExitReason::EndOfData => exit.price,
            None => {
                let symbol = self.config.symbol.as_str();
                warn!(symbol, bar, reason = %exit.reason, "exit fill rejected");
                let kind = WarningKind::FillRejected {
                    side,
                    action: FillAction::Exit,
                };
                ledger.warn(bar, Some(timestamp), kind);
                return;
            }
        };

        let RunnerState::Open(position) = std::mem::replace(&mut ledger.state, RunnerState::Flat)
        else {
            return;
        };
        let exit_fee = calculate_fee(price, size, self.config.fee_rate);
        let trade = position.close(price, timestamp, exit_fee, exit.reason);
        ledger.capital += trade.pnl;

        info!(
            symbol = %trade.symbol,
            bar,
            side = %trade.side,
            price = trade.exit_price,
            pnl = trade.pnl,
            reason = %trade.exit_reason,
            capital = ledger.capital,
            "position closed"
        );
        ledger.trades.push(trade);
    }

    fn try_enter(
        &self,
        bar: usize,
        candle: &Candle,
        snapshot: Option<&IndicatorSnapshot>,
        signal: &Signal,
        oracle_decision: Option<Decision>,
        ledger: &mut Ledger,
    ) {
        if !signal.is_actionable(self.config.confidence_threshold) {
            return;
        }
        let Some(side) = signal.direction.side() else {
            return;
        };
        if side == Side::Short && !self.config.allow_short {
            return;
        }

        if self.oracle.is_some() {
            let decision = match oracle_decision {
                Some(d) => d,
                None => {
                    let context = tail(&ledger.accepted, self.config.oracle_context_bars);
                    let (decision, warning) = self.consult(bar, candle, None, context);
                    ledger.warnings.extend(warning);
                    decision
                }
            };
            let confirmed = matches!(
                (side, decision),
                (Side::Long, Decision::Long) | (Side::Short, Decision::Short)
            );
            if !confirmed {
                let symbol = self.config.symbol.as_str();
                debug!(symbol, bar, ?decision, "oracle did not confirm entry");
                return;
            }
        }

        let atr = snapshot.and_then(|s| s.atr).unwrap_or(f64::NAN);
        let plan = match plan_entry(side, candle.close, atr, ledger.capital, &self.config.risk) {
            Ok(plan) => plan,
            Err(rejection) => {
                warn!(symbol = %self.config.symbol, bar, reason = %rejection, "entry rejected");
                let kind = WarningKind::EntryRejected { rejection };
                ledger.warn(bar, Some(candle.timestamp), kind);
                return;
            }
        };

        let Some(entry_price) =
            self.fill_model
                .fill(side, FillAction::Entry, candle.close, plan.size)
        else {
            warn!(symbol = %self.config.symbol, bar, "entry fill rejected");
            let kind = WarningKind::FillRejected {
                side,
                action: FillAction::Entry,
            };
            ledger.warn(bar, Some(candle.timestamp), kind);
            return;
        };
        let levels = place_levels(side, entry_price, atr, &self.config.risk).unwrap_or(plan.levels);
        let entry_fee = calculate_fee(entry_price, plan.size, self.config.fee_rate);

        let position = Position {
            symbol: self.config.symbol.clone(),
            side,
            entry_price,
            entry_time: candle.timestamp,
            entry_bar: bar,
            size: plan.size,
            stop_loss: levels.stop_loss,
            take_profit: levels.take_profit,
            trailing_stop: None,
            confidence: signal.confidence,
            risk: RiskSnapshot {
                capital: ledger.capital,
                risk_fraction: self.config.risk.risk_fraction,
                leverage: self.config.risk.leverage,
                atr,
                stop_distance: levels.stop_distance,
            },
            entry_fee,
            entry_reasons: signal.reasons.clone(),
        };

        info!(
            symbol = %position.symbol,
            bar,
            side = %side,
            price = entry_price,
            size = position.size,
            stop = position.stop_loss,
            target = position.take_profit,
            confidence = position.confidence,
            "position opened"
        );
        ledger.state = RunnerState::Open(position);
    }

    fn record_equity(&self, bar: usize, candle: &Candle, ledger: &mut Ledger) {
        let cadence = self.config.equity_cadence;
        if cadence == 0 || ledger.accepted.len() % cadence != 0 {
            return;
        }
        let open_pnl = ledger
            .state
            .position()
            .map(|p| p.unrealized_pnl(candle.close))
            .unwrap_or(0.0);
        ledger.equity_curve.push(EquityPoint {
            bar,
            timestamp: candle.timestamp,
            capital: ledger.capital,
            equity: ledger.capital + open_pnl,
        });
    }

    fn close_at_end(&self, ledger: &mut Ledger, last_bar: usize) {
        if !ledger.state.is_open() {
            return;
        }
        let Some(last) = ledger.accepted.last().copied() else {
            return;
        };
        let exit = ExitDecision {
            reason: ExitReason::EndOfData,
            price: last.close,
        };
        self.close_position(last_bar, last.timestamp, exit, ledger);
    }
}

fn tail(accepted: &[Candle], bars: usize) -> &[Candle] {
    let start = accepted.len().saturating_sub(bars.max(1));
    &accepted[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::OracleError;
    use crate::ports::decision_port::OracleDecision;
    use std::cell::Cell;
    use std::rc::Rc;

    fn ts(hours: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + hours * 3600, 0).unwrap()
    }

    fn candle(hour: i64, close: f64) -> Candle {
        Candle {
            timestamp: ts(hour),
            open: close - 0.2,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 1000.0,
        }
    }

    fn small_config() -> EngineConfig {
        let mut config = EngineConfig::new("TEST", 0.7);
        config.indicators.ema_fast = 2;
        config.indicators.ema_mid = 3;
        config.indicators.ema_slow = 4;
        config.indicators.rsi_period = 3;
        config.indicators.atr_period = 3;
        config.indicators.volume_period = 3;
        config.signal.long_rsi_range.high = 101.0;
        config.risk.min_notional = 1.0;
        config.risk.risk_reward_ratio = 50.0;
        config.exits.reversal_confidence = None;
        config.exits.emergency_loss_fraction = None;
        config.exits.trailing_activation_pct = None;
        config.exits.max_holding_hours = None;
        config
    }

    fn rising(n: i64) -> Vec<Candle> {
        (0..n).map(|i| candle(i, 100.0 + i as f64)).collect()
    }

    #[test]
    fn empty_input() {
        let result = Runner::new(small_config()).run(&[]);
        assert!(result.trades.is_empty());
        assert_eq!(result.final_capital, result.initial_capital);
        assert_eq!(result.bars_processed, 0);
        assert!(result.open_position.is_none());
    }

    #[test]
    fn rising_market_opens_a_long_and_closes_at_end() {
        let result = Runner::new(small_config()).run(&rising(12));
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.side, Side::Long);
        assert_eq!(trade.exit_reason, ExitReason::EndOfData);
        assert!(trade.pnl > 0.0);
        assert!((result.final_capital - (result.initial_capital + trade.pnl)).abs() < 1e-9);
    }

    #[test]
    fn close_at_end_disabled_leaves_position_open() {
        let mut config = small_config();
        config.close_at_end = false;
        let result = Runner::new(config).run(&rising(12));
        assert!(result.trades.is_empty());
        assert!(result.open_position.is_some());
        assert_eq!(result.final_capital, result.initial_capital);
    }

    #[test]
    fn malformed_and_out_of_order_bars_are_skipped() {
        let mut candles = rising(6);
        candles[2].high = candles[2].low - 1.0;
        candles.insert(4, candle(-5, 50.0));
        let result = Runner::new(small_config()).run(&candles);
        assert_eq!(result.bars_skipped, 2);
        assert_eq!(result.bars_processed, 5);
        assert!(matches!(
            result.warnings[0].kind,
            WarningKind::MalformedCandle {
                defect: CandleDefect::HighBelowLow
            }
        ));
        assert_eq!(result.warnings[1].kind, WarningKind::OutOfOrderCandle);
        assert_eq!(result.warnings[1].bar, 4);
    }

    #[test]
    fn shorts_disabled() {
        let mut config = small_config();
        config.allow_short = false;
        config.signal.short_rsi_range.low = -1.0;
        let falling: Vec<Candle> = (0..12).map(|i| candle(i, 200.0 - i as f64)).collect();
        let result = Runner::new(config).run(&falling);
        assert!(result.trades.is_empty());
    }

    #[test]
    fn run_until_stops_early() {
        let result = Runner::new(small_config()).run_until(&rising(12), |bar, _| bar < 5);
        assert_eq!(result.bars_processed, 5);
        assert!(result.trades.is_empty());
    }

    #[test]
    fn equity_cadence() {
        let mut config = small_config();
        config.equity_cadence = 4;
        let result = Runner::new(config).run(&rising(12));
        let bars: Vec<usize> = result.equity_curve.iter().map(|p| p.bar).collect();
        assert_eq!(bars, vec![3, 7, 11]);
        let last = result.equity_curve.last().unwrap();
        assert!(last.equity > last.capital);
    }

    #[test]
    fn summary_drawdown_sees_open_position_dips() {
        let point = |bar: i64, equity: f64| EquityPoint {
            bar: bar as usize,
            timestamp: candle(bar, 100.0).timestamp,
            capital: 1_000.0,
            equity,
        };
        let result = BacktestResult {
            symbol: "TEST".into(),
            initial_capital: 1_000.0,
            final_capital: 1_000.0,
            trades: Vec::new(),
            equity_curve: vec![point(0, 1_000.0), point(1, 900.0), point(2, 1_050.0)],
            warnings: Vec::new(),
            bars_processed: 3,
            bars_skipped: 0,
            open_position: None,
        };
        let summary = result.summary();
        assert!((summary.max_drawdown - 100.0).abs() < 1e-9);
        assert!((summary.max_drawdown_pct - 10.0).abs() < 1e-9);

        let no_curve = BacktestResult {
            equity_curve: Vec::new(),
            ..result
        };
        assert!((no_curve.summary().max_drawdown - 0.0).abs() < f64::EPSILON);
    }

    struct Scripted {
        answer: Result<&'static str, OracleError>,
        calls: Rc<Cell<usize>>,
    }

    impl DecisionOracle for Scripted {
        fn decide(&self, _query: &OracleQuery) -> Result<OracleDecision, OracleError> {
            self.calls.set(self.calls.get() + 1);
            match &self.answer {
                Ok(action) => OracleDecision::parse(action, "scripted"),
                Err(e) => Err(e.clone()),
            }
        }
    }

    #[test]
    fn oracle_must_confirm_entry() {
        let calls = Rc::new(Cell::new(0));
        let oracle = Scripted {
            answer: Ok("HOLD"),
            calls: Rc::clone(&calls),
        };
        let result = Runner::new(small_config()).with_oracle(oracle).run(&rising(12));
        assert!(result.trades.is_empty());
        assert!(calls.get() > 0);
    }

    #[test]
    fn oracle_failure_degrades_to_hold() {
        let oracle = Scripted {
            answer: Err(OracleError::Timeout { millis: 10 }),
            calls: Rc::new(Cell::new(0)),
        };
        let result = Runner::new(small_config()).with_oracle(oracle).run(&rising(12));
        assert!(result.trades.is_empty());
        assert!(result
            .warnings
            .iter()
            .any(|w| matches!(w.kind, WarningKind::OracleUnavailable { .. })));
    }

    #[test]
    fn oracle_close_exits_position() {
        struct CloseWhenOpen;
        impl DecisionOracle for CloseWhenOpen {
            fn decide(&self, query: &OracleQuery) -> Result<OracleDecision, OracleError> {
                let action = if query.position.is_some() { "CLOSE" } else { "LONG" };
                OracleDecision::parse(action, "")
            }
        }
        let result = Runner::new(small_config())
            .with_oracle(CloseWhenOpen)
            .run(&rising(12));
        assert!(!result.trades.is_empty());
        assert_eq!(result.trades[0].exit_reason, ExitReason::OracleClose);
    }

    #[test]
    fn fill_rejection_blocks_entry() {
        let model = SlippageFill {
            slippage_pct: 0.0,
            max_size: Some(0.0001),
        };
        let result = Runner::new(small_config()).with_fill_model(model).run(&rising(12));
        assert!(result.trades.is_empty());
        assert!(result
            .warnings
            .iter()
            .any(|w| matches!(
                w.kind,
                WarningKind::FillRejected {
                    action: FillAction::Entry,
                    ..
                }
            )));
    }
}
