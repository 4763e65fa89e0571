//! Performance statistics computed purely from the trade ledger.
//!
//! The equity curve used here is the realized one: initial capital plus the
//! cumulative P&L of trades in exit order. Risk-adjusted ratios are trade
//! based, annualized by the number of trades per year over the ledger span.
//! [`monthly_returns`] is the one statistic taken from the marked equity curve.

use std::collections::BTreeMap;

use chrono::Datelike;
use serde::Serialize;

use super::portfolio::EquityPoint;
use super::position::ClosedTrade;

const DAYS_PER_YEAR: f64 = 365.25;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub total_pnl: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub expectancy: f64,
    pub avg_holding_days: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub max_drawdown: f64,
    pub max_drawdown_amount: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub recovery_factor: f64,
}

impl Metrics {
    pub fn compute(ledger: &[ClosedTrade], initial_capital: f64) -> Self {
        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut trades_breakeven = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut total_holding_days = 0i64;
        let mut streak = Streak::default();

        for trade in ledger {
            let pnl = trade.pnl;
            if trade.is_win() {
                trades_won += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                trades_lost += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            } else {
                trades_breakeven += 1;
            }
            streak.push(pnl);
            total_holding_days += trade.holding_days;
        }

        let total_trades = ledger.len();
        let total_pnl = total_wins - total_losses;
        let per_trade = |total: f64, count: usize| {
            if count > 0 { total / count as f64 } else { 0.0 }
        };

        let win_rate = per_trade(trades_won as f64, total_trades);
        let avg_win = per_trade(total_wins, trades_won);
        let avg_loss = per_trade(total_losses, trades_lost);
        let loss_rate = per_trade(trades_lost as f64, total_trades);

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let total_return = if initial_capital > 0.0 {
            total_pnl / initial_capital
        } else {
            0.0
        };

        let years = ledger_years(ledger);
        let annualized_return = if years > 0.0 && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_amount) = realized_drawdown(ledger, initial_capital);
        let (sharpe_ratio, sortino_ratio) = trade_ratios(ledger, initial_capital, years);

        let calmar_ratio = if max_drawdown > 0.0 {
            annualized_return / max_drawdown
        } else {
            0.0
        };
        let recovery_factor = if max_drawdown_amount > 0.0 {
            total_pnl / max_drawdown_amount
        } else {
            0.0
        };

        Metrics {
            total_trades,
            trades_won,
            trades_lost,
            trades_breakeven,
            win_rate,
            profit_factor,
            total_pnl,
            total_return,
            annualized_return,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            expectancy: win_rate * avg_win - loss_rate * avg_loss,
            avg_holding_days: per_trade(total_holding_days as f64, total_trades),
            max_consecutive_wins: streak.max_wins,
            max_consecutive_losses: streak.max_losses,
            max_drawdown,
            max_drawdown_amount,
            sharpe_ratio,
            sortino_ratio,
            calmar_ratio,
            recovery_factor,
        }
    }
}

#[derive(Default)]
struct Streak {
    wins: usize,
    losses: usize,
    max_wins: usize,
    max_losses: usize,
}

impl Streak {
    fn push(&mut self, pnl: f64) {
        if pnl > 0.0 {
            self.wins += 1;
            self.losses = 0;
        } else if pnl < 0.0 {
            self.losses += 1;
            self.wins = 0;
        } else {
            self.wins = 0;
            self.losses = 0;
        }
        self.max_wins = self.max_wins.max(self.wins);
        self.max_losses = self.max_losses.max(self.losses);
    }
}

/// Years between the first entry and the last exit.
fn ledger_years(ledger: &[ClosedTrade]) -> f64 {
    let first = ledger.iter().map(|t| t.entry_date).min();
    let last = ledger.iter().map(|t| t.exit_date).max();
    match (first, last) {
        (Some(first), Some(last)) => (last - first).num_days().max(0) as f64 / DAYS_PER_YEAR,
        _ => 0.0,
    }
}

/// (fractional, absolute) peak-to-trough decline of the realized equity curve.
fn realized_drawdown(ledger: &[ClosedTrade], initial_capital: f64) -> (f64, f64) {
    let mut equity = initial_capital;
    let mut peak = initial_capital;
    let mut max_dd = 0.0_f64;
    let mut max_dd_amount = 0.0_f64;

    for trade in ledger {
        equity += trade.pnl;
        if equity > peak {
            peak = equity;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - equity) / peak);
            max_dd_amount = max_dd_amount.max(peak - equity);
        }
    }

    (max_dd, max_dd_amount)
}

/// Sharpe and Sortino over per-trade returns on the equity in place before
/// each trade.
fn trade_ratios(ledger: &[ClosedTrade], initial_capital: f64, years: f64) -> (f64, f64) {
    if ledger.len() < 2 || initial_capital <= 0.0 {
        return (0.0, 0.0);
    }

    let mut equity = initial_capital;
    let returns: Vec<f64> = ledger
        .iter()
        .map(|trade| {
            let r = if equity > 0.0 { trade.pnl / equity } else { 0.0 };
            equity += trade.pnl;
            r
        })
        .collect();

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    let downside_variance = returns
        .iter()
        .filter(|&&r| r < 0.0)
        .map(|r| r.powi(2))
        .sum::<f64>()
        / n;
    let downside_stddev = downside_variance.sqrt();

    let annualize = if years > 0.0 { (n / years).sqrt() } else { 1.0 };

    let sharpe = if stddev > 0.0 {
        mean / stddev * annualize
    } else {
        0.0
    };
    let sortino = if downside_stddev > 0.0 {
        mean / downside_stddev * annualize
    } else {
        0.0
    };

    (sharpe, sortino)
}

/// Equity at the last marked day of a calendar month and the return over the
/// previous month end (initial capital for the first month).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyReturn {
    pub year: i32,
    pub month: u32,
    pub end_equity: f64,
    pub return_pct: f64,
}

pub fn monthly_returns(equity_curve: &[EquityPoint], initial_capital: f64) -> Vec<MonthlyReturn> {
    let mut month_end: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for point in equity_curve {
        month_end.insert((point.date.year(), point.date.month()), point.equity);
    }

    let mut previous = initial_capital;
    month_end
        .into_iter()
        .map(|((year, month), end_equity)| {
            let return_pct = if previous > 0.0 {
                (end_equity - previous) / previous * 100.0
            } else {
                0.0
            };
            previous = end_equity;
            MonthlyReturn {
                year,
                month,
                end_equity,
                return_pct,
            }
        })
        .collect()
}
