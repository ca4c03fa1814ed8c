//! Configuration validation.
//!
//! Validates all config fields before a run.

use crate::domain::error::EngineError;
use crate::ports::config_port::ConfigPort;

pub fn validate_engine_config(config: &dyn ConfigPort) -> Result<(), EngineError> {
    validate_symbol(config)?;
    validate_engine_section(config)?;
    validate_indicators(config)?;
    validate_signal(config)?;
    validate_risk(config)?;
    validate_exits(config)?;
    Ok(())
}

/// A present key must parse as a number; an absent key is `None`.
fn number(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<f64>, EngineError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(EngineError::invalid(
                section,
                key,
                format!("'{}' is not a number", raw.trim()),
            )),
        },
    }
}

fn require(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    valid: impl Fn(f64) -> bool,
    reason: &str,
) -> Result<(), EngineError> {
    match number(config, section, key)? {
        Some(v) if !valid(v) => Err(EngineError::invalid(section, key, reason)),
        _ => Ok(()),
    }
}

fn validate_symbol(config: &dyn ConfigPort) -> Result<(), EngineError> {
    match config.get_string("engine", "symbol") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(EngineError::missing("engine", "symbol")),
    }
}

fn validate_engine_section(config: &dyn ConfigPort) -> Result<(), EngineError> {
    require(config, "engine", "initial_capital", |v| v > 0.0, "initial_capital must be positive")?;
    require(
        config,
        "engine",
        "fee_rate",
        |v| (0.0..1.0).contains(&v),
        "fee_rate must be in [0, 1)",
    )?;
    require(config, "engine", "slippage_pct", |v| v >= 0.0, "slippage_pct must be non-negative")?;
    require(
        config,
        "engine",
        "equity_cadence",
        |v| v >= 0.0 && v.fract() == 0.0,
        "equity_cadence must be a non-negative integer",
    )?;
    require(
        config,
        "engine",
        "oracle_context_bars",
        |v| v >= 1.0 && v.fract() == 0.0,
        "oracle_context_bars must be a positive integer",
    )?;
    Ok(())
}

fn validate_indicators(config: &dyn ConfigPort) -> Result<(), EngineError> {
    for key in [
        "ema_fast",
        "ema_mid",
        "ema_slow",
        "rsi_period",
        "atr_period",
        "volume_period",
        "pivot_period",
    ] {
        require(
            config,
            "indicators",
            key,
            |v| v >= 1.0 && v.fract() == 0.0,
            "period must be a positive integer",
        )?;
    }
    require(
        config,
        "indicators",
        "lookback",
        |v| v >= 0.0 && v.fract() == 0.0,
        "lookback must be a non-negative integer",
    )?;
    require(
        config,
        "indicators",
        "supertrend_factor",
        |v| v > 0.0,
        "supertrend_factor must be positive",
    )?;

    let fast = number(config, "indicators", "ema_fast")?.unwrap_or(9.0);
    let mid = number(config, "indicators", "ema_mid")?.unwrap_or(21.0);
    let slow = number(config, "indicators", "ema_slow")?.unwrap_or(50.0);
    if !(fast < mid && mid < slow) {
        return Err(EngineError::invalid(
            "indicators",
            "ema_fast",
            "EMA periods must satisfy fast < mid < slow",
        ));
    }
    Ok(())
}

fn validate_signal(config: &dyn ConfigPort) -> Result<(), EngineError> {
    match number(config, "signal", "confidence_threshold")? {
        None => return Err(EngineError::missing("signal", "confidence_threshold")),
        Some(v) if !(0.0..=1.0).contains(&v) => {
            return Err(EngineError::invalid(
                "signal",
                "confidence_threshold",
                "confidence_threshold must be between 0 and 1",
            ));
        }
        Some(_) => {}
    }
    require(
        config,
        "signal",
        "tolerance",
        |v| (0.0..1.0).contains(&v),
        "tolerance must be in [0, 1)",
    )?;

    for prefix in ["long_rsi", "short_rsi", "long_rsi_optimal", "short_rsi_optimal"] {
        let low_key = format!("{prefix}_low");
        let high_key = format!("{prefix}_high");
        let in_rsi = |v: f64| (0.0..=100.0).contains(&v);
        require(config, "signal", &low_key, in_rsi, "RSI bound must be between 0 and 100")?;
        require(config, "signal", &high_key, in_rsi, "RSI bound must be between 0 and 100")?;
        if let (Some(low), Some(high)) = (
            number(config, "signal", &low_key)?,
            number(config, "signal", &high_key)?,
        ) {
            if low > high {
                return Err(EngineError::invalid(
                    "signal",
                    &low_key,
                    "lower RSI bound must not exceed upper bound",
                ));
            }
        }
    }

    for key in [
        "base_weight",
        "candle_color_weight",
        "ema_spread_weight",
        "volume_weight",
        "rsi_optimal_weight",
        "trend_weight",
        "min_ema_spread",
        "volume_filter_multiple",
        "volume_strength_multiple",
    ] {
        require(config, "signal", key, |v| v >= 0.0, "value must be non-negative")?;
    }
    Ok(())
}

fn validate_risk(config: &dyn ConfigPort) -> Result<(), EngineError> {
    require(
        config,
        "risk",
        "risk_fraction",
        |v| v > 0.0 && v <= 1.0,
        "risk_fraction must be in (0, 1]",
    )?;
    require(config, "risk", "leverage", |v| v >= 1.0, "leverage must be at least 1")?;
    require(
        config,
        "risk",
        "max_exposure_fraction",
        |v| v > 0.0,
        "max_exposure_fraction must be positive",
    )?;
    require(
        config,
        "risk",
        "stop_atr_multiplier",
        |v| v > 0.0,
        "stop_atr_multiplier must be positive",
    )?;
    require(
        config,
        "risk",
        "risk_reward_ratio",
        |v| v > 0.0,
        "risk_reward_ratio must be positive",
    )?;
    require(config, "risk", "min_notional", |v| v >= 0.0, "min_notional must be non-negative")?;
    Ok(())
}

fn validate_exits(config: &dyn ConfigPort) -> Result<(), EngineError> {
    for key in [
        "reversal_confidence",
        "profit_protection_pct",
        "trailing_activation_pct",
        "max_holding_hours",
        "emergency_loss_fraction",
    ] {
        require(config, "exits", key, |v| v >= 0.0, "value must be non-negative")?;
    }
    require(
        config,
        "exits",
        "trailing_atr_multiplier",
        |v| v > 0.0,
        "trailing_atr_multiplier must be positive",
    )?;
    Ok(())
}
