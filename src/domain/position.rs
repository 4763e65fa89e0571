//! Long positions and closed-trade ledger records.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExitReason {
    #[serde(rename = "EXIT_STOP_LOSS")]
    StopLoss,
    #[serde(rename = "EXIT_TRAILING_STOP")]
    TrailingStop,
    #[serde(rename = "EXIT_TAKE_PROFIT")]
    TakeProfit,
    #[serde(rename = "EXIT_SIGNAL_REVERSAL")]
    SignalReversal,
    #[serde(rename = "EXIT_MAX_HOLDING_PERIOD")]
    MaxHoldingPeriod,
    #[serde(rename = "END_OF_DATA")]
    EndOfData,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::StopLoss => "EXIT_STOP_LOSS",
            ExitReason::TrailingStop => "EXIT_TRAILING_STOP",
            ExitReason::TakeProfit => "EXIT_TAKE_PROFIT",
            ExitReason::SignalReversal => "EXIT_SIGNAL_REVERSAL",
            ExitReason::MaxHoldingPeriod => "EXIT_MAX_HOLDING_PERIOD",
            ExitReason::EndOfData => "END_OF_DATA",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub quantity: u64,
    pub entry_price: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    /// Starts at the stop-loss level and only ever ratchets up.
    pub trailing_stop_price: f64,
    pub risk_amount: f64,
    pub opened_at: NaiveDate,
    pub status: PositionStatus,
}

impl Position {
    pub fn new(
        symbol: impl Into<String>,
        quantity: u64,
        entry_price: f64,
        stop_loss_price: f64,
        take_profit_price: f64,
        opened_at: NaiveDate,
    ) -> Self {
        Position {
            symbol: symbol.into(),
            quantity,
            entry_price,
            stop_loss_price,
            take_profit_price,
            trailing_stop_price: stop_loss_price,
            risk_amount: quantity as f64 * (entry_price - stop_loss_price),
            opened_at,
            status: PositionStatus::Open,
        }
    }

    pub fn notional(&self) -> f64 {
        self.quantity as f64 * self.entry_price
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.quantity as f64 * (price - self.entry_price)
    }

    /// The level a bar's low is tested against.
    pub fn effective_stop(&self) -> f64 {
        self.stop_loss_price.max(self.trailing_stop_price)
    }

    pub fn is_trailing_active(&self) -> bool {
        self.trailing_stop_price > self.stop_loss_price
    }

    pub fn holding_days(&self, date: NaiveDate) -> i64 {
        (date - self.opened_at).num_days()
    }
}

/// One ledger record per closed position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedTrade {
    pub symbol: String,
    pub quantity: u64,
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub exit_date: NaiveDate,
    pub exit_price: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub exit_reason: ExitReason,
    pub pnl: f64,
    pub return_pct: f64,
    pub holding_days: i64,
}

impl ClosedTrade {
    pub fn from_position(
        position: &Position,
        exit_price: f64,
        exit_date: NaiveDate,
        exit_reason: ExitReason,
    ) -> Self {
        let pnl = (exit_price - position.entry_price) * position.quantity as f64;
        let notional = position.notional();
        ClosedTrade {
            symbol: position.symbol.clone(),
            quantity: position.quantity,
            entry_date: position.opened_at,
            entry_price: position.entry_price,
            exit_date,
            exit_price,
            stop_loss_price: position.stop_loss_price,
            take_profit_price: position.take_profit_price,
            exit_reason,
            pnl,
            return_pct: if notional > 0.0 { pnl / notional } else { 0.0 },
            holding_days: position.holding_days(exit_date),
        }
    }

    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_position() -> Position {
        Position::new(
            "TCS.NS",
            100,
            50.0,
            46.0,
            58.0,
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        )
    }

    #[test]
    fn new_position_is_open_with_trailing_at_stop() {
        let pos = sample_position();
        assert_eq!(pos.status, PositionStatus::Open);
        assert!((pos.trailing_stop_price - 46.0).abs() < f64::EPSILON);
        assert!((pos.risk_amount - 400.0).abs() < f64::EPSILON);
        assert!(!pos.is_trailing_active());
    }

    #[test]
    fn market_value_and_unrealized() {
        let pos = sample_position();
        assert!((pos.market_value(55.0) - 5500.0).abs() < f64::EPSILON);
        assert!((pos.unrealized_pnl(55.0) - 500.0).abs() < f64::EPSILON);
        assert!((pos.unrealized_pnl(45.0) + 500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn effective_stop_uses_higher_level() {
        let mut pos = sample_position();
        pos.trailing_stop_price = 48.0;
        assert!((pos.effective_stop() - 48.0).abs() < f64::EPSILON);
        assert!(pos.is_trailing_active());
    }

    #[test]
    fn closed_trade_books_pnl() {
        let pos = sample_position();
        let exit = NaiveDate::from_ymd_opt(2024, 1, 25).unwrap();
        let trade = ClosedTrade::from_position(&pos, 58.0, exit, ExitReason::TakeProfit);
        assert!((trade.pnl - 800.0).abs() < f64::EPSILON);
        assert!((trade.return_pct - 0.16).abs() < 1e-12);
        assert_eq!(trade.holding_days, 10);
        assert!(trade.is_win());
    }

    #[test]
    fn exit_reason_labels() {
        assert_eq!(ExitReason::StopLoss.to_string(), "EXIT_STOP_LOSS");
        assert_eq!(ExitReason::EndOfData.to_string(), "END_OF_DATA");
    }
}
