//! Typed engine configuration and the named strategy presets.
//!
//! Each preset is only data: the same runner executes every variant.

use serde::{Deserialize, Serialize};

use crate::domain::config_validation::validate_engine_config;
use crate::domain::error::EngineError;
use crate::domain::exits::ExitConfig;
use crate::domain::risk::RiskConfig;
use crate::domain::signal::{RsiRange, SignalConfig};
use crate::domain::snapshot::{IndicatorConfig, TrendSource};
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub symbol: String,
    pub initial_capital: f64,
    /// Fee per side as a fraction of notional.
    pub fee_rate: f64,
    pub slippage_pct: f64,
    pub allow_short: bool,
    /// Bars between equity snapshots. 0 disables the curve.
    pub equity_cadence: usize,
    pub close_at_end: bool,
    /// Minimum signal confidence for an entry. Has no default.
    pub confidence_threshold: f64,
    pub oracle_context_bars: usize,
    pub indicators: IndicatorConfig,
    pub signal: SignalConfig,
    pub risk: RiskConfig,
    pub exits: ExitConfig,
}

impl EngineConfig {
    pub fn new(symbol: impl Into<String>, confidence_threshold: f64) -> Self {
        Self {
            symbol: symbol.into(),
            initial_capital: 10_000.0,
            fee_rate: 0.0005,
            slippage_pct: 0.0,
            allow_short: true,
            equity_cadence: 24,
            close_at_end: true,
            confidence_threshold,
            oracle_context_bars: 50,
            indicators: IndicatorConfig::default(),
            signal: SignalConfig::default(),
            risk: RiskConfig::default(),
            exits: ExitConfig::default(),
        }
    }

    /// Hourly triple EMA (9/21/50): 5x leverage, 2 ATR stop at 1:2, 24h time exit.
    pub fn triple_ema_1h(symbol: impl Into<String>) -> Self {
        Self::new(symbol, 0.80)
    }

    /// Wider targets, larger risk per trade and a profit-protection exit.
    pub fn aggressive(symbol: impl Into<String>) -> Self {
        let mut config = Self::new(symbol, 0.75);
        config.risk = RiskConfig {
            risk_fraction: 0.03,
            leverage: 1.0,
            max_exposure_fraction: 0.95,
            stop_atr_multiplier: 1.5,
            risk_reward_ratio: 4.0,
            ..RiskConfig::default()
        };
        config.exits = ExitConfig {
            profit_protection_pct: Some(0.03),
            trailing_activation_pct: Some(0.0),
            trailing_atr_multiplier: 1.0,
            max_holding_hours: Some(18.0),
            ..ExitConfig::default()
        };
        config.indicators.trend_source = TrendSource::AtrBands;
        config
    }

    /// 15-minute bars: 1.5 ATR stop at 1:2, notional capped at 0.7x capital
    /// per unit of leverage, 4h time exit and reversal exit at 0.80.
    pub fn fifteen_minute(symbol: impl Into<String>) -> Self {
        let mut config = Self::new(symbol, 0.75);
        config.equity_cadence = 96;
        config.risk.stop_atr_multiplier = 1.5;
        config.risk.risk_reward_ratio = 2.0;
        config.risk.max_exposure_fraction = 0.7 * config.risk.leverage;
        config.exits.max_holding_hours = Some(4.0);
        config.exits.reversal_confidence = Some(0.80);
        config.signal.tolerance = 0.001;
        config
    }

    /// Validates then builds from `[engine]`, `[indicators]`, `[signal]`,
    /// `[risk]` and `[exits]`. Absent keys fall back to the defaults above,
    /// except `[signal] confidence_threshold`.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, EngineError> {
        validate_engine_config(config)?;

        let threshold = config
            .get_double_opt("signal", "confidence_threshold")
            .ok_or_else(|| EngineError::missing("signal", "confidence_threshold"))?;
        let symbol = config
            .get_string("engine", "symbol")
            .map(|s| s.trim().to_string())
            .ok_or_else(|| EngineError::missing("engine", "symbol"))?;

        let base = Self::new(symbol, threshold);
        let int = |section: &str, key: &str, default: usize| {
            config.get_int(section, key, default as i64).max(0) as usize
        };
        let opt = |section: &str, key: &str, default: Option<f64>| {
            if config.has_key(section, key) {
                config.get_double_opt(section, key).filter(|v| *v > 0.0)
            } else {
                default
            }
        };

        let d = &base.indicators;
        let indicators = IndicatorConfig {
            ema_fast: int("indicators", "ema_fast", d.ema_fast),
            ema_mid: int("indicators", "ema_mid", d.ema_mid),
            ema_slow: int("indicators", "ema_slow", d.ema_slow),
            rsi_period: int("indicators", "rsi_period", d.rsi_period),
            atr_period: int("indicators", "atr_period", d.atr_period),
            volume_period: int("indicators", "volume_period", d.volume_period),
            supertrend_factor: config.get_double(
                "indicators",
                "supertrend_factor",
                d.supertrend_factor,
            ),
            pivot_period: int("indicators", "pivot_period", d.pivot_period),
            trend_source: match config.get_string("indicators", "trend_source") {
                Some(s) => s
                    .parse()
                    .map_err(|reason| EngineError::invalid("indicators", "trend_source", reason))?,
                None => d.trend_source,
            },
            lookback: match int("indicators", "lookback", 0) {
                0 => None,
                n => Some(n),
            },
        };

        let s = &base.signal;
        let range = |prefix: &str, default: RsiRange| RsiRange {
            low: config.get_double("signal", &format!("{prefix}_low"), default.low),
            high: config.get_double("signal", &format!("{prefix}_high"), default.high),
        };
        let signal = SignalConfig {
            tolerance: config.get_double("signal", "tolerance", s.tolerance),
            long_rsi_range: range("long_rsi", s.long_rsi_range),
            short_rsi_range: range("short_rsi", s.short_rsi_range),
            long_rsi_optimal: range("long_rsi_optimal", s.long_rsi_optimal),
            short_rsi_optimal: range("short_rsi_optimal", s.short_rsi_optimal),
            volume_filter_multiple: opt("signal", "volume_filter_multiple", None),
            require_trend_agreement: config.get_bool(
                "signal",
                "require_trend_agreement",
                s.require_trend_agreement,
            ),
            base_weight: config.get_double("signal", "base_weight", s.base_weight),
            candle_color_weight: config.get_double(
                "signal",
                "candle_color_weight",
                s.candle_color_weight,
            ),
            ema_spread_weight: config.get_double(
                "signal",
                "ema_spread_weight",
                s.ema_spread_weight,
            ),
            min_ema_spread: config.get_double("signal", "min_ema_spread", s.min_ema_spread),
            volume_weight: config.get_double("signal", "volume_weight", s.volume_weight),
            volume_strength_multiple: config.get_double(
                "signal",
                "volume_strength_multiple",
                s.volume_strength_multiple,
            ),
            rsi_optimal_weight: config.get_double(
                "signal",
                "rsi_optimal_weight",
                s.rsi_optimal_weight,
            ),
            trend_weight: config.get_double("signal", "trend_weight", s.trend_weight),
        };

        let r = &base.risk;
        let risk = RiskConfig {
            risk_fraction: config.get_double("risk", "risk_fraction", r.risk_fraction),
            leverage: config.get_double("risk", "leverage", r.leverage),
            max_exposure_fraction: config.get_double(
                "risk",
                "max_exposure_fraction",
                r.max_exposure_fraction,
            ),
            stop_atr_multiplier: config.get_double(
                "risk",
                "stop_atr_multiplier",
                r.stop_atr_multiplier,
            ),
            risk_reward_ratio: config.get_double("risk", "risk_reward_ratio", r.risk_reward_ratio),
            min_notional: config.get_double("risk", "min_notional", r.min_notional),
        };

        let x = &base.exits;
        let exits = ExitConfig {
            reversal_confidence: opt("exits", "reversal_confidence", x.reversal_confidence),
            profit_protection_pct: opt("exits", "profit_protection_pct", x.profit_protection_pct),
            trailing_activation_pct: if config.get_bool("exits", "trailing_enabled", true) {
                config
                    .get_double_opt("exits", "trailing_activation_pct")
                    .or(x.trailing_activation_pct)
            } else {
                None
            },
            trailing_atr_multiplier: config.get_double(
                "exits",
                "trailing_atr_multiplier",
                x.trailing_atr_multiplier,
            ),
            max_holding_hours: opt("exits", "max_holding_hours", x.max_holding_hours),
            emergency_loss_fraction: opt(
                "exits",
                "emergency_loss_fraction",
                x.emergency_loss_fraction,
            ),
        };

        Ok(Self {
            initial_capital: config.get_double("engine", "initial_capital", base.initial_capital),
            fee_rate: config.get_double("engine", "fee_rate", base.fee_rate),
            slippage_pct: config.get_double("engine", "slippage_pct", base.slippage_pct),
            allow_short: config.get_bool("engine", "allow_short", base.allow_short),
            equity_cadence: int("engine", "equity_cadence", base.equity_cadence),
            close_at_end: config.get_bool("engine", "close_at_end", base.close_at_end),
            oracle_context_bars: int("engine", "oracle_context_bars", base.oracle_context_bars),
            indicators,
            signal,
            risk,
            exits,
            ..base
        })
    }
}
