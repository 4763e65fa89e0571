//! Portfolio state and equity tracking.
//!
//! Positions only enter and leave through [`PortfolioState::open`] and
//! [`PortfolioState::close`]; equity is always recomputed from realized P&L
//! and the latest marks, never accumulated.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use super::error::SwingError;
use super::position::{ClosedTrade, ExitReason, Position, PositionStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
    pub cash: f64,
    pub open_positions: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioState {
    pub initial_capital: f64,
    pub cash: f64,
    pub open_positions: BTreeMap<String, Position>,
    pub closed_positions: Vec<Position>,
    pub ledger: Vec<ClosedTrade>,
    pub realized_pnl: f64,
    marks: BTreeMap<String, f64>,
}

impl PortfolioState {
    pub fn new(initial_capital: f64) -> Self {
        PortfolioState {
            initial_capital,
            cash: initial_capital,
            open_positions: BTreeMap::new(),
            closed_positions: Vec::new(),
            ledger: Vec::new(),
            realized_pnl: 0.0,
            marks: BTreeMap::new(),
        }
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.open_positions.contains_key(symbol)
    }

    pub fn get_position(&self, symbol: &str) -> Option<&Position> {
        self.open_positions.get(symbol)
    }

    pub fn get_position_mut(&mut self, symbol: &str) -> Option<&mut Position> {
        self.open_positions.get_mut(symbol)
    }

    pub fn position_count(&self) -> usize {
        self.open_positions.len()
    }

    /// Sum of the risk committed by open positions at entry.
    pub fn open_risk(&self) -> f64 {
        self.open_positions.values().map(|p| p.risk_amount).sum()
    }

    pub fn open(&mut self, position: Position) -> Result<(), SwingError> {
        if self.has_position(&position.symbol) {
            return Err(SwingError::DuplicateInstrument {
                symbol: position.symbol,
            });
        }
        let notional = position.notional();
        if notional > self.cash {
            return Err(SwingError::degenerate(format!(
                "opening {} needs {:.2} but only {:.2} cash is available",
                position.symbol, notional, self.cash
            )));
        }

        self.cash -= notional;
        self.marks
            .insert(position.symbol.clone(), position.entry_price);
        self.open_positions.insert(position.symbol.clone(), position);
        Ok(())
    }

    pub fn close(
        &mut self,
        symbol: &str,
        exit_price: f64,
        exit_date: NaiveDate,
        reason: ExitReason,
    ) -> Result<ClosedTrade, SwingError> {
        let mut position =
            self.open_positions
                .remove(symbol)
                .ok_or_else(|| SwingError::PositionNotFound {
                    symbol: symbol.to_string(),
                })?;

        let trade = ClosedTrade::from_position(&position, exit_price, exit_date, reason);
        self.cash += position.market_value(exit_price);
        self.realized_pnl += trade.pnl;
        self.marks.remove(symbol);

        position.status = PositionStatus::Closed;
        self.closed_positions.push(position);
        self.ledger.push(trade.clone());
        Ok(trade)
    }

    /// Record the latest prices and return total unrealized P&L. Position
    /// records are left untouched; symbols without a price keep their last mark.
    pub fn mark_to_market(&mut self, prices: &BTreeMap<String, f64>) -> f64 {
        for symbol in self.open_positions.keys() {
            if let Some(&price) = prices.get(symbol) {
                self.marks.insert(symbol.clone(), price);
            }
        }
        self.unrealized_pnl()
    }

    pub fn mark(&self, symbol: &str) -> Option<f64> {
        self.marks.get(symbol).copied()
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.open_positions
            .values()
            .map(|p| p.unrealized_pnl(self.mark(&p.symbol).unwrap_or(p.entry_price)))
            .sum()
    }

    pub fn market_value(&self) -> f64 {
        self.open_positions
            .values()
            .map(|p| p.market_value(self.mark(&p.symbol).unwrap_or(p.entry_price)))
            .sum()
    }

    pub fn equity(&self) -> f64 {
        self.initial_capital + self.realized_pnl + self.unrealized_pnl()
    }

    pub fn equity_point(&self, date: NaiveDate) -> EquityPoint {
        EquityPoint {
            date,
            equity: self.equity(),
            cash: self.cash,
            open_positions: self.position_count(),
        }
    }
}
