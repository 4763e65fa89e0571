//! Position sizing, stop placement, exit evaluation and portfolio limits.
//!
//! Every operation here is a pure function of its inputs. The backtest engine
//! applies the resulting decisions to [`PortfolioState`].

use std::fmt;

use tracing::debug;

use super::error::SwingError;
use super::ohlcv::OhlcvBar;
use super::portfolio::PortfolioState;
use super::position::{ExitReason, Position};
use super::signal::AggregatedSignal;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizingMode {
    FixedFractional,
    /// Fractional Kelly: risk `fraction × (p − (1 − p) / b)` of equity, never
    /// more than the configured per-trade risk.
    Kelly {
        win_rate: f64,
        payoff_ratio: f64,
        fraction: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopMode {
    Percent,
    Atr { multiplier: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskConfig {
    pub risk_per_trade: f64,
    pub max_positions: usize,
    pub max_portfolio_risk: f64,
    pub cash_reserve_pct: f64,
    pub max_position_fraction: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub trailing_stop_pct: f64,
    pub min_risk_reward: f64,
    pub stop_mode: StopMode,
    pub sizing_mode: SizingMode,
    pub max_holding_days: Option<u32>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            risk_per_trade: 0.02,
            max_positions: 5,
            max_portfolio_risk: 0.10,
            cash_reserve_pct: 0.20,
            max_position_fraction: 0.10,
            stop_loss_pct: 0.08,
            take_profit_pct: 0.16,
            trailing_stop_pct: 0.04,
            min_risk_reward: 1.5,
            stop_mode: StopMode::Percent,
            sizing_mode: SizingMode::FixedFractional,
            max_holding_days: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopLevels {
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
}

impl StopLevels {
    /// Reward per unit of risk: (tp − entry) / (entry − stop).
    pub fn risk_reward(&self, entry_price: f64) -> f64 {
        let risk = entry_price - self.stop_loss_price;
        if risk <= 0.0 {
            return 0.0;
        }
        (self.take_profit_price - entry_price) / risk
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSizing {
    pub quantity: u64,
    pub entry_price: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub risk_amount: f64,
    pub risk_pct: f64,
    pub notional: f64,
    pub capped_by_notional: bool,
}

impl PositionSizing {
    /// Loss if the stop is hit at its level.
    pub fn committed_risk(&self) -> f64 {
        self.quantity as f64 * (self.entry_price - self.stop_loss_price)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrailingStopUpdate {
    Raised { from: f64, to: f64 },
    Unchanged { stop: f64 },
}

impl TrailingStopUpdate {
    pub fn stop(&self) -> f64 {
        match *self {
            TrailingStopUpdate::Raised { to, .. } => to,
            TrailingStopUpdate::Unchanged { stop } => stop,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitDecision {
    Hold,
    Exit { reason: ExitReason, price: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RejectionReason {
    ZeroQuantity,
    MaxPositions { open: usize, max: usize },
    PositionTooLarge { notional: f64, limit: f64 },
    PortfolioRisk { total: f64, limit: f64 },
    CashReserve { cash_after: f64, floor: f64 },
    RiskReward { ratio: f64, minimum: f64 },
    InvalidStops { reason: String },
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::ZeroQuantity => write!(f, "sized to zero shares"),
            RejectionReason::MaxPositions { open, max } => {
                write!(f, "max positions reached ({}/{})", open, max)
            }
            RejectionReason::PositionTooLarge { notional, limit } => {
                write!(f, "notional {:.2} exceeds position limit {:.2}", notional, limit)
            }
            RejectionReason::PortfolioRisk { total, limit } => {
                write!(f, "portfolio risk {:.2} exceeds limit {:.2}", total, limit)
            }
            RejectionReason::CashReserve { cash_after, floor } => {
                write!(f, "cash {:.2} would fall below reserve {:.2}", cash_after, floor)
            }
            RejectionReason::RiskReward { ratio, minimum } => {
                write!(f, "risk/reward {:.2} below minimum {:.2}", ratio, minimum)
            }
            RejectionReason::InvalidStops { reason } => write!(f, "invalid stops: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LimitDecision {
    Approved,
    Rejected(RejectionReason),
}

impl LimitDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, LimitDecision::Approved)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskManager {
    config: RiskConfig,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        RiskManager { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Risk fraction actually applied for `risk_pct` under the sizing mode.
    pub fn effective_risk_pct(&self, risk_pct: f64) -> f64 {
        match self.config.sizing_mode {
            SizingMode::FixedFractional => risk_pct,
            SizingMode::Kelly {
                win_rate,
                payoff_ratio,
                fraction,
            } => {
                let kelly = if payoff_ratio > 0.0 {
                    win_rate - (1.0 - win_rate) / payoff_ratio
                } else {
                    0.0
                };
                (fraction * kelly.max(0.0)).min(risk_pct)
            }
        }
    }

    pub fn size_position(
        &self,
        equity: f64,
        entry_price: f64,
        stop_loss_price: f64,
        risk_pct: f64,
    ) -> Result<PositionSizing, SwingError> {
        if !risk_pct.is_finite() || risk_pct <= 0.0 {
            return Err(SwingError::NonPositiveRiskPct { risk_pct });
        }
        if !equity.is_finite() || equity <= 0.0 {
            return Err(SwingError::degenerate(format!(
                "equity must be positive, got {}",
                equity
            )));
        }
        if !entry_price.is_finite() || entry_price <= 0.0 {
            return Err(SwingError::degenerate(format!(
                "entry price must be positive, got {}",
                entry_price
            )));
        }
        if !stop_loss_price.is_finite() || entry_price <= stop_loss_price {
            return Err(SwingError::InvalidStopDistance {
                entry_price,
                stop_loss_price,
            });
        }

        let applied_pct = self.effective_risk_pct(risk_pct);
        let distance = entry_price - stop_loss_price;
        let risk_amount = equity * applied_pct;
        let risk_quantity = (risk_amount / distance).floor();
        let cap_quantity = (equity * self.config.max_position_fraction / entry_price).floor();
        if !risk_quantity.is_finite() || !cap_quantity.is_finite() {
            return Err(SwingError::degenerate("position quantity is not finite"));
        }

        let capped_by_notional = risk_quantity > cap_quantity;
        let (quantity, risk_amount) = if capped_by_notional {
            let quantity = cap_quantity.max(0.0) as u64;
            (quantity, quantity as f64 * distance)
        } else {
            (risk_quantity.max(0.0) as u64, risk_amount)
        };

        Ok(PositionSizing {
            quantity,
            entry_price,
            stop_loss_price,
            take_profit_price: entry_price * (1.0 + self.config.take_profit_pct),
            risk_amount,
            risk_pct: applied_pct,
            notional: quantity as f64 * entry_price,
            capped_by_notional,
        })
    }

    /// Stop-loss and take-profit for a new long entry. `atr` is only read in
    /// ATR stop mode.
    pub fn place_stops(&self, entry_price: f64, atr: Option<f64>) -> Result<StopLevels, SwingError> {
        let stop_loss_price = match self.config.stop_mode {
            StopMode::Percent => entry_price * (1.0 - self.config.stop_loss_pct),
            StopMode::Atr { multiplier } => {
                let atr = atr.ok_or_else(|| SwingError::degenerate("ATR unavailable"))?;
                entry_price - multiplier * atr
            }
        };
        let take_profit_price = entry_price * (1.0 + self.config.take_profit_pct);

        if !(stop_loss_price.is_finite() && stop_loss_price > 0.0) {
            return Err(SwingError::degenerate(format!(
                "stop {:.4} for entry {:.4} is not positive",
                stop_loss_price, entry_price
            )));
        }
        if stop_loss_price >= entry_price {
            return Err(SwingError::InvalidStopDistance {
                entry_price,
                stop_loss_price,
            });
        }
        if take_profit_price <= entry_price {
            return Err(SwingError::degenerate(format!(
                "take profit {:.4} is not above entry {:.4}",
                take_profit_price, entry_price
            )));
        }

        Ok(StopLevels {
            stop_loss_price,
            take_profit_price,
        })
    }

    pub fn check_risk_reward(&self, entry_price: f64, levels: &StopLevels) -> LimitDecision {
        let ratio = levels.risk_reward(entry_price);
        if ratio + EPSILON < self.config.min_risk_reward {
            LimitDecision::Rejected(RejectionReason::RiskReward {
                ratio,
                minimum: self.config.min_risk_reward,
            })
        } else {
            LimitDecision::Approved
        }
    }

    /// Ratchet the trailing stop toward `price`. Never lowers it.
    pub fn update_trailing_stop(&self, position: &Position, price: f64) -> TrailingStopUpdate {
        let existing = position.trailing_stop_price;
        let candidate = price * (1.0 - self.config.trailing_stop_pct);
        if candidate.is_finite() && candidate > existing {
            TrailingStopUpdate::Raised {
                from: existing,
                to: candidate,
            }
        } else {
            TrailingStopUpdate::Unchanged { stop: existing }
        }
    }

    /// Exit check for one bar, worst case first: the stop is tested against
    /// the low before the take-profit is tested against the high.
    pub fn evaluate_exit(
        &self,
        position: &Position,
        bar: &OhlcvBar,
        signal: Option<&AggregatedSignal>,
    ) -> ExitDecision {
        let stop = position.effective_stop();
        if bar.low <= stop {
            let reason = if position.is_trailing_active() {
                ExitReason::TrailingStop
            } else {
                ExitReason::StopLoss
            };
            return ExitDecision::Exit {
                reason,
                price: bar.open.min(stop),
            };
        }

        if bar.high >= position.take_profit_price {
            return ExitDecision::Exit {
                reason: ExitReason::TakeProfit,
                price: bar.open.max(position.take_profit_price),
            };
        }

        if signal.is_some_and(|s| s.direction.is_sell()) {
            return ExitDecision::Exit {
                reason: ExitReason::SignalReversal,
                price: bar.close,
            };
        }

        if let Some(max_days) = self.config.max_holding_days {
            if position.holding_days(bar.date) >= i64::from(max_days) {
                return ExitDecision::Exit {
                    reason: ExitReason::MaxHoldingPeriod,
                    price: bar.close,
                };
            }
        }

        ExitDecision::Hold
    }

    pub fn check_portfolio_limits(
        &self,
        state: &PortfolioState,
        candidate: &PositionSizing,
    ) -> LimitDecision {
        let decision = self.limit_violation(state, candidate);
        if let LimitDecision::Rejected(reason) = &decision {
            debug!(%reason, quantity = candidate.quantity, "limit check rejected candidate");
        }
        decision
    }

    fn limit_violation(&self, state: &PortfolioState, candidate: &PositionSizing) -> LimitDecision {
        let cfg = &self.config;
        let equity = state.equity();

        if candidate.quantity == 0 {
            return LimitDecision::Rejected(RejectionReason::ZeroQuantity);
        }

        let open = state.position_count();
        if open >= cfg.max_positions {
            return LimitDecision::Rejected(RejectionReason::MaxPositions {
                open,
                max: cfg.max_positions,
            });
        }

        let position_limit = equity * cfg.max_position_fraction;
        if candidate.notional > position_limit + EPSILON {
            return LimitDecision::Rejected(RejectionReason::PositionTooLarge {
                notional: candidate.notional,
                limit: position_limit,
            });
        }

        let total_risk = state.open_risk() + candidate.committed_risk();
        let risk_limit = equity * cfg.max_portfolio_risk;
        if total_risk > risk_limit + EPSILON {
            return LimitDecision::Rejected(RejectionReason::PortfolioRisk {
                total: total_risk,
                limit: risk_limit,
            });
        }

        let cash_after = state.cash - candidate.notional;
        let floor = equity * cfg.cash_reserve_pct;
        if cash_after + EPSILON < floor {
            return LimitDecision::Rejected(RejectionReason::CashReserve { cash_after, floor });
        }

        LimitDecision::Approved
    }
}
