//! Performance summary computed from the trade ledger.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::position::Trade;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub initial_capital: f64,
    pub final_capital: f64,
    pub total_return: f64,
    pub total_return_pct: f64,
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    /// `INFINITY` when there are wins and no losses.
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub total_fees: f64,
    pub avg_holding_hours: f64,
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    /// Longest run of trades spent below a capital peak.
    pub max_drawdown_trades: usize,
    pub exit_reasons: BTreeMap<String, usize>,
}

impl Summary {
    pub fn from_trades(initial_capital: f64, trades: &[Trade]) -> Self {
        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut trades_breakeven = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut total_fees = 0.0_f64;
        let mut total_holding_secs = 0i64;
        let mut exit_reasons = BTreeMap::new();

        for trade in trades {
            let pnl = trade.pnl;
            if trade.is_win() {
                trades_won += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
            } else if trade.is_loss() {
                trades_lost += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            } else {
                trades_breakeven += 1;
            }
            total_fees += trade.fees;
            total_holding_secs += trade.holding_secs;
            *exit_reasons.entry(trade.exit_reason.to_string()).or_insert(0) += 1;
        }

        let total_trades = trades.len();
        let per_trade = |total: f64, count: usize| {
            if count > 0 { total / count as f64 } else { 0.0 }
        };

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let path = capital_path(initial_capital, trades);
        let final_capital = path.last().copied().unwrap_or(initial_capital);
        let total_return = final_capital - initial_capital;
        let drawdown = drawdown(&path);

        Summary {
            initial_capital,
            final_capital,
            total_return,
            total_return_pct: if initial_capital > 0.0 {
                total_return / initial_capital * 100.0
            } else {
                0.0
            },
            total_trades,
            trades_won,
            trades_lost,
            trades_breakeven,
            win_rate: per_trade(trades_won as f64, total_trades),
            profit_factor,
            avg_win: per_trade(total_wins, trades_won),
            avg_loss: per_trade(total_losses, trades_lost),
            largest_win,
            largest_loss,
            total_fees,
            avg_holding_hours: per_trade(total_holding_secs as f64 / 3600.0, total_trades),
            max_drawdown: drawdown.absolute,
            max_drawdown_pct: drawdown.fraction * 100.0,
            max_drawdown_trades: drawdown.duration,
            exit_reasons,
        }
    }
}

impl Summary {
    /// Replaces the drawdown figures with those of `path`, a time-ordered
    /// series that also sees declines while a position is open. The
    /// trade-count duration is left as computed from closed trades.
    pub fn with_drawdown_over(mut self, path: &[f64]) -> Self {
        let drawdown = drawdown(path);
        self.max_drawdown = drawdown.absolute;
        self.max_drawdown_pct = drawdown.fraction * 100.0;
        self
    }
}

/// Running capital: `initial`, then `initial + Σ pnl` after each trade.
pub fn capital_path(initial_capital: f64, trades: &[Trade]) -> Vec<f64> {
    let mut path = Vec::with_capacity(trades.len() + 1);
    let mut capital = initial_capital;
    path.push(capital);
    for trade in trades {
        capital += trade.pnl;
        path.push(capital);
    }
    path
}

/// Largest peak-to-trough decline of `values`, as a fraction of the peak.
pub fn max_drawdown(values: &[f64]) -> f64 {
    drawdown(values).fraction
}

struct Drawdown {
    absolute: f64,
    fraction: f64,
    duration: usize,
}

fn drawdown(values: &[f64]) -> Drawdown {
    let mut result = Drawdown {
        absolute: 0.0,
        fraction: 0.0,
        duration: 0,
    };
    let Some(&first) = values.first() else {
        return result;
    };

    let mut peak = first;
    let mut underwater = 0usize;
    for &value in values {
        if value >= peak {
            peak = value;
            underwater = 0;
            continue;
        }
        underwater += 1;
        result.duration = result.duration.max(underwater);
        let decline = peak - value;
        if decline > result.absolute {
            result.absolute = decline;
        }
        if peak > 0.0 {
            result.fraction = result.fraction.max(decline / peak);
        }
    }
    result
}
