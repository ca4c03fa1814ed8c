//! Open position and closed trade records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::signal::SignalReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    SignalReversal,
    OracleClose,
    ProfitProtection,
    TrailingStop,
    MaxHolding,
    EmergencyLoss,
    EndOfData,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::SignalReversal => "signal_reversal",
            ExitReason::OracleClose => "oracle_close",
            ExitReason::ProfitProtection => "profit_protection",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::MaxHolding => "max_holding",
            ExitReason::EmergencyLoss => "emergency_loss",
            ExitReason::EndOfData => "end_of_data",
        };
        write!(f, "{}", s)
    }
}

/// Risk inputs captured when the position was opened.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    pub capital: f64,
    pub risk_fraction: f64,
    pub leverage: f64,
    pub atr: f64,
    pub stop_distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub entry_bar: usize,
    pub size: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub trailing_stop: Option<f64>,
    pub confidence: f64,
    pub risk: RiskSnapshot,
    pub entry_fee: f64,
    pub entry_reasons: Vec<SignalReason>,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.side == Side::Long
    }

    pub fn is_short(&self) -> bool {
        self.side == Side::Short
    }

    pub fn notional(&self, price: f64) -> f64 {
        self.size * price
    }

    /// Price PnL before fees.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.side.sign() * (price - self.entry_price) * self.size
    }

    /// Favourable move as a fraction of the entry price.
    pub fn unrealized_return(&self, price: f64) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        self.side.sign() * (price - self.entry_price) / self.entry_price
    }

    pub fn stop_hit(&self, low: f64, high: f64) -> bool {
        match self.side {
            Side::Long => low <= self.stop_loss,
            Side::Short => high >= self.stop_loss,
        }
    }

    pub fn target_hit(&self, low: f64, high: f64) -> bool {
        match self.side {
            Side::Long => high >= self.take_profit,
            Side::Short => low <= self.take_profit,
        }
    }

    /// Converts the position into a trade closed at `exit_price`.
    pub fn close(
        self,
        exit_price: f64,
        exit_time: DateTime<Utc>,
        exit_fee: f64,
        exit_reason: ExitReason,
    ) -> Trade {
        let gross_pnl = self.unrealized_pnl(exit_price);
        let fees = self.entry_fee + exit_fee;
        let pnl = gross_pnl - fees;
        let entry_notional = self.notional(self.entry_price);
        let pnl_pct = if entry_notional > 0.0 {
            pnl / entry_notional * 100.0
        } else {
            0.0
        };
        let holding_secs = (exit_time - self.entry_time).num_seconds().max(0);

        Trade {
            symbol: self.symbol,
            side: self.side,
            entry_price: self.entry_price,
            exit_price,
            entry_time: self.entry_time,
            exit_time,
            size: self.size,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            confidence: self.confidence,
            gross_pnl,
            fees,
            pnl,
            pnl_pct,
            exit_reason,
            holding_secs,
            entry_reasons: self.entry_reasons,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub size: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub confidence: f64,
    pub gross_pnl: f64,
    pub fees: f64,
    /// Realized PnL net of fees.
    pub pnl: f64,
    pub pnl_pct: f64,
    pub exit_reason: ExitReason,
    pub holding_secs: i64,
    pub entry_reasons: Vec<SignalReason>,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn is_loss(&self) -> bool {
        self.pnl < 0.0
    }

    pub fn holding(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.holding_secs)
    }
}
