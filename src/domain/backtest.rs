//! Backtest engine and chronological event loop.
//!
//! Indicator frames are computed per instrument in parallel, then every bar
//! of the universe is replayed in date order against a single
//! [`PortfolioState`]. For each date: exits first, then trailing-stop
//! ratchets, then new signals, ranked entries and an equity mark.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::mpsc::Sender;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::config::EngineConfig;
use super::error::SwingError;
use super::instrument::{InstrumentData, InstrumentState, build_unified_timeline};
use super::metrics::{Metrics, MonthlyReturn, monthly_returns};
use super::portfolio::{EquityPoint, PortfolioState};
use super::position::{ClosedTrade, ExitReason, Position};
use super::risk::{ExitDecision, LimitDecision, PositionSizing, RejectionReason, RiskManager};
use super::signal::AggregatedSignal;
use super::universe::{LoadedUniverse, SkippedInstrument};

/// Processing order for same-day entry candidates. Every ranking breaks ties
/// by symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CandidateRanking {
    /// Highest confidence first.
    #[default]
    Confidence,
    /// Highest signed score first.
    Score,
    /// Symbol order only.
    Symbol,
}

impl FromStr for CandidateRanking {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "confidence" => Ok(CandidateRanking::Confidence),
            "score" => Ok(CandidateRanking::Score),
            "symbol" => Ok(CandidateRanking::Symbol),
            other => Err(format!(
                "expected 'confidence', 'score' or 'symbol', got '{}'",
                other
            )),
        }
    }
}

impl CandidateRanking {
    fn compare(self, a: &Candidate, b: &Candidate) -> Ordering {
        let primary = match self {
            CandidateRanking::Confidence => b.signal.confidence.total_cmp(&a.signal.confidence),
            CandidateRanking::Score => b.signal.score.total_cmp(&a.signal.score),
            CandidateRanking::Symbol => Ordering::Equal,
        };
        primary.then_with(|| a.symbol.cmp(&b.symbol))
    }
}

/// An actionable entry signal and, once it got that far, its sizing.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub date: NaiveDate,
    pub symbol: String,
    pub signal: AggregatedSignal,
    pub entry_price: f64,
    pub sizing: Option<PositionSizing>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedCandidate {
    pub date: NaiveDate,
    pub symbol: String,
    pub confidence: f64,
    pub reason: RejectionReason,
}

/// Immutable notifications emitted while the engine runs.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    SignalProduced {
        date: NaiveDate,
        symbol: String,
        signal: AggregatedSignal,
    },
    CandidateRejected(RejectedCandidate),
    PositionOpened {
        date: NaiveDate,
        symbol: String,
        quantity: u64,
        entry_price: f64,
        stop_loss_price: f64,
        take_profit_price: f64,
    },
    PositionClosed(ClosedTrade),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub instruments: usize,
    pub skipped: usize,
    pub bars_processed: usize,
    pub initial_capital: f64,
    pub final_equity: f64,
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub ledger: Vec<ClosedTrade>,
    pub rejected: Vec<RejectedCandidate>,
    pub candidates: Vec<Candidate>,
    pub skipped: Vec<SkippedInstrument>,
    pub equity_curve: Vec<EquityPoint>,
    pub monthly_returns: Vec<MonthlyReturn>,
    pub metrics: Metrics,
    pub summary: RunSummary,
}

pub struct BacktestEngine {
    config: EngineConfig,
    risk: RiskManager,
    events: Option<Sender<EngineEvent>>,
}

impl BacktestEngine {
    pub fn new(config: EngineConfig) -> Self {
        let risk = RiskManager::new(config.risk.clone());
        BacktestEngine {
            config,
            risk,
            events: None,
        }
    }

    /// Send engine events to `tx`. A dropped receiver is ignored.
    pub fn with_events(mut self, tx: Sender<EngineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Validate and compute frames for every series. Instruments with bad or
    /// short data are skipped, not fatal.
    fn prepare(&self, universe: LoadedUniverse) -> (Vec<InstrumentData>, Vec<SkippedInstrument>) {
        let settings = &self.config.indicators;
        let series: Vec<(String, Vec<_>)> = universe.series.into_iter().collect();

        let prepared: Vec<_> = series
            .into_par_iter()
            .map(|(symbol, bars)| {
                InstrumentData::prepare(&symbol, bars, settings).map_err(|e| (symbol, e))
            })
            .collect();

        let mut instruments = Vec::with_capacity(prepared.len());
        let mut skipped = universe.skipped;
        for outcome in prepared {
            match outcome {
                Ok(data) => instruments.push(data),
                Err((symbol, e)) => {
                    warn!(%symbol, error = %e, "skipping instrument");
                    skipped.push(SkippedInstrument {
                        symbol,
                        reason: e.to_string(),
                    });
                }
            }
        }
        (instruments, skipped)
    }

    fn signal_at(&self, data: &InstrumentData, index: usize) -> Option<AggregatedSignal> {
        if index + 1 < self.config.indicators.min_bars() {
            return None;
        }
        Some(self.config.signals.aggregate(data.frame.readings_at(index)))
    }

    pub fn run(&self, universe: LoadedUniverse) -> Result<BacktestResult, SwingError> {
        self.config.validate()?;

        let (instruments, skipped) = self.prepare(universe);
        let timeline = build_unified_timeline(&instruments);
        info!(
            instruments = instruments.len(),
            skipped = skipped.len(),
            dates = timeline.len(),
            "starting backtest"
        );

        let mut portfolio = PortfolioState::new(self.config.initial_capital);
        let mut equity_curve = Vec::with_capacity(timeline.len());
        let mut rejected = Vec::new();
        let mut candidates = Vec::new();
        let mut bars_processed = 0usize;

        for &date in &timeline {
            let mut exited_today = BTreeSet::new();

            for data in &instruments {
                let Some(index) = data.get_bar_index(date) else {
                    continue;
                };
                bars_processed += 1;
                if self.state_of(&portfolio, &data.symbol) == InstrumentState::PositionOpen
                    && self.manage_position(&mut portfolio, data, index)?
                {
                    exited_today.insert(data.symbol.clone());
                }
            }

            let mut today = Vec::new();
            for data in &instruments {
                let Some(index) = data.get_bar_index(date) else {
                    continue;
                };
                if self.state_of(&portfolio, &data.symbol) != InstrumentState::Scanning
                    || exited_today.contains(&data.symbol)
                {
                    continue;
                }
                let Some(signal) = self.signal_at(data, index) else {
                    continue;
                };
                self.emit(EngineEvent::SignalProduced {
                    date,
                    symbol: data.symbol.clone(),
                    signal: signal.clone(),
                });
                if signal.is_actionable(self.config.min_confidence) {
                    today.push((
                        Candidate {
                            date,
                            symbol: data.symbol.clone(),
                            entry_price: data.bars[index].close,
                            signal,
                            sizing: None,
                        },
                        data.frame.atr_at(index),
                    ));
                }
            }

            let ranking = self.config.ranking;
            today.sort_by(|(a, _), (b, _)| ranking.compare(a, b));

            for (candidate, atr) in today {
                let outcome = self.try_enter(&mut portfolio, candidate, atr)?;
                match outcome {
                    EntryOutcome::Opened(candidate) => candidates.push(candidate),
                    EntryOutcome::Rejected(candidate, reason) => {
                        let record = RejectedCandidate {
                            date,
                            symbol: candidate.symbol.clone(),
                            confidence: candidate.signal.confidence,
                            reason,
                        };
                        debug!(symbol = %record.symbol, reason = %record.reason, "candidate rejected");
                        self.emit(EngineEvent::CandidateRejected(record.clone()));
                        rejected.push(record);
                        candidates.push(candidate);
                    }
                }
            }

            let prices: BTreeMap<String, f64> = instruments
                .iter()
                .filter_map(|d| d.get_bar(date).map(|bar| (d.symbol.clone(), bar.close)))
                .collect();
            portfolio.mark_to_market(&prices);
            equity_curve.push(portfolio.equity_point(date));
        }

        self.close_remaining(&mut portfolio, &instruments)?;

        let metrics = Metrics::compute(&portfolio.ledger, portfolio.initial_capital);
        let monthly_returns = monthly_returns(&equity_curve, portfolio.initial_capital);
        let summary = RunSummary {
            instruments: instruments.len(),
            skipped: skipped.len(),
            bars_processed,
            initial_capital: portfolio.initial_capital,
            final_equity: portfolio.equity(),
        };
        info!(
            trades = metrics.total_trades,
            rejected = rejected.len(),
            final_equity = summary.final_equity,
            win_rate = metrics.win_rate,
            "backtest complete"
        );

        Ok(BacktestResult {
            ledger: portfolio.ledger,
            rejected,
            candidates,
            skipped,
            equity_curve,
            monthly_returns,
            metrics,
            summary,
        })
    }

    fn state_of(&self, portfolio: &PortfolioState, symbol: &str) -> InstrumentState {
        if portfolio.has_position(symbol) {
            InstrumentState::PositionOpen
        } else {
            InstrumentState::Scanning
        }
    }

    /// Exit check against the stops in force at the start of the bar, then
    /// ratchet the trailing stop with the bar's high. Returns whether the
    /// position was closed.
    fn manage_position(
        &self,
        portfolio: &mut PortfolioState,
        data: &InstrumentData,
        index: usize,
    ) -> Result<bool, SwingError> {
        let bar = &data.bars[index];
        let signal = self.signal_at(data, index);
        let Some(position) = portfolio.get_position(&data.symbol) else {
            return Ok(false);
        };

        match self.risk.evaluate_exit(position, bar, signal.as_ref()) {
            ExitDecision::Exit { reason, price } => {
                let trade = portfolio.close(&data.symbol, price, bar.date, reason)?;
                debug!(
                    symbol = %trade.symbol,
                    reason = %trade.exit_reason,
                    pnl = trade.pnl,
                    "position closed"
                );
                self.emit(EngineEvent::PositionClosed(trade));
                Ok(true)
            }
            ExitDecision::Hold => {
                let update = self.risk.update_trailing_stop(position, bar.high);
                if let Some(position) = portfolio.get_position_mut(&data.symbol) {
                    position.trailing_stop_price = update.stop();
                }
                Ok(false)
            }
        }
    }

    fn try_enter(
        &self,
        portfolio: &mut PortfolioState,
        mut candidate: Candidate,
        atr: Option<f64>,
    ) -> Result<EntryOutcome, SwingError> {
        let entry = candidate.entry_price;
        let levels = match self.risk.place_stops(entry, atr) {
            Ok(levels) => levels,
            Err(e) => {
                let reason = RejectionReason::InvalidStops {
                    reason: e.to_string(),
                };
                return Ok(EntryOutcome::Rejected(candidate, reason));
            }
        };
        if let LimitDecision::Rejected(reason) = self.risk.check_risk_reward(entry, &levels) {
            return Ok(EntryOutcome::Rejected(candidate, reason));
        }

        let sizing = self.risk.size_position(
            portfolio.equity(),
            entry,
            levels.stop_loss_price,
            self.config.risk.risk_per_trade,
        )?;
        candidate.sizing = Some(sizing);

        if let LimitDecision::Rejected(reason) = self.risk.check_portfolio_limits(portfolio, &sizing)
        {
            return Ok(EntryOutcome::Rejected(candidate, reason));
        }

        let position = Position::new(
            candidate.symbol.clone(),
            sizing.quantity,
            entry,
            levels.stop_loss_price,
            levels.take_profit_price,
            candidate.date,
        );
        portfolio.open(position)?;

        debug!(
            symbol = %candidate.symbol,
            quantity = sizing.quantity,
            entry,
            stop = levels.stop_loss_price,
            confidence = candidate.signal.confidence,
            "position opened"
        );
        self.emit(EngineEvent::PositionOpened {
            date: candidate.date,
            symbol: candidate.symbol.clone(),
            quantity: sizing.quantity,
            entry_price: entry,
            stop_loss_price: levels.stop_loss_price,
            take_profit_price: levels.take_profit_price,
        });
        Ok(EntryOutcome::Opened(candidate))
    }

    /// Force-close whatever is still open at each instrument's final close.
    fn close_remaining(
        &self,
        portfolio: &mut PortfolioState,
        instruments: &[InstrumentData],
    ) -> Result<(), SwingError> {
        let open: Vec<String> = portfolio.open_positions.keys().cloned().collect();
        for symbol in open {
            let Some(last) = instruments
                .iter()
                .find(|d| d.symbol == symbol)
                .and_then(InstrumentData::last_bar)
            else {
                continue;
            };
            let trade = portfolio.close(&symbol, last.close, last.date, ExitReason::EndOfData)?;
            debug!(symbol = %trade.symbol, pnl = trade.pnl, "closed at end of data");
            self.emit(EngineEvent::PositionClosed(trade));
        }
        Ok(())
    }
}

enum EntryOutcome {
    Opened(Candidate),
    Rejected(Candidate, RejectionReason),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::OhlcvBar;
    use crate::domain::signal::{
        IndicatorKind, IndicatorSettings, SignalAggregator, SignalDirection, SignalWeights,
    };
    use chrono::Duration;
    use std::sync::mpsc;

    fn small_config() -> EngineConfig {
        EngineConfig {
            indicators: IndicatorSettings {
                rsi_period: 2,
                macd_fast: 2,
                macd_slow: 3,
                macd_signal: 2,
                bollinger_period: 2,
                sma_short: 2,
                sma_long: 3,
                ema_short: 2,
                ema_long: 3,
                volume_period: 2,
                stochastic_k: 2,
                stochastic_d: 2,
                atr_period: 2,
                trend_full_scale: 0.002,
                ..IndicatorSettings::default()
            },
            // trend votes only, so a steady rise is a full-strength buy
            signals: SignalAggregator::new(SignalWeights {
                rsi: 0.0,
                macd: 0.0,
                bollinger: 0.0,
                sma_trend: 1.0,
                ema_trend: 1.0,
                volume: 0.0,
                stochastic: 0.0,
            }),
            ..EngineConfig::default()
        }
    }

    fn series(symbol: &str, closes: &[f64]) -> Vec<OhlcvBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| OhlcvBar {
                symbol: symbol.to_string(),
                date: start + Duration::days(i as i64),
                open: close,
                high: close * 1.005,
                low: close * 0.995,
                close,
                volume: 10_000,
            })
            .collect()
    }

    fn rising(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 * 1.01_f64.powi(i as i32)).collect()
    }

    fn universe(entries: Vec<(&str, Vec<f64>)>) -> LoadedUniverse {
        LoadedUniverse::from_series(
            entries
                .into_iter()
                .map(|(s, closes)| (s.to_string(), series(s, &closes)))
                .collect(),
        )
    }

    #[test]
    fn ranking_parses() {
        assert_eq!("Score".parse::<CandidateRanking>(), Ok(CandidateRanking::Score));
        assert!("best".parse::<CandidateRanking>().is_err());
    }

    #[test]
    fn rising_series_opens_and_force_closes() {
        let engine = BacktestEngine::new(small_config());
        let result = engine.run(universe(vec![("INFY.NS", rising(18))])).unwrap();

        assert_eq!(result.ledger.len(), 1);
        let trade = &result.ledger[0];
        assert_eq!(trade.exit_reason, ExitReason::EndOfData);
        assert!(trade.pnl > 0.0);
        assert_eq!(trade.entry_date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(trade.exit_date, NaiveDate::from_ymd_opt(2024, 1, 18).unwrap());
        assert_eq!(result.equity_curve.len(), 18);
        assert!(result.candidates[0].sizing.is_some());
        assert!((result.summary.final_equity - (100_000.0 + trade.pnl)).abs() < 1e-6);
    }

    #[test]
    fn short_history_is_skipped() {
        let engine = BacktestEngine::new(small_config());
        let result = engine
            .run(universe(vec![("INFY.NS", rising(20)), ("TINY.BO", rising(3))]))
            .unwrap();
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].symbol, "TINY.BO");
        assert_eq!(result.summary.instruments, 1);
    }

    #[test]
    fn gap_down_exits_at_open() {
        let mut closes = rising(10);
        closes.push(closes[9] * 0.85);
        let engine = BacktestEngine::new(small_config());
        let result = engine.run(universe(vec![("INFY.NS", closes.clone())])).unwrap();

        assert_eq!(result.ledger.len(), 1);
        let trade = &result.ledger[0];
        // the trailing stop has ratcheted above the original stop by then
        assert_eq!(trade.exit_reason, ExitReason::TrailingStop);
        assert_eq!(trade.exit_date, NaiveDate::from_ymd_opt(2024, 1, 11).unwrap());
        assert!((trade.exit_price - closes[10]).abs() < 1e-9);
        assert!(trade.pnl < 0.0);
    }

    #[test]
    fn exit_blocks_same_bar_reentry() {
        let closes = rising(12);
        let mut bars = series("INFY.NS", &closes);
        bars[8].low = 90.0;
        let engine = BacktestEngine::new(small_config());
        let result = engine
            .run(LoadedUniverse::from_series(BTreeMap::from([(
                "INFY.NS".to_string(),
                bars,
            )])))
            .unwrap();

        assert_eq!(result.ledger.len(), 2);
        assert_eq!(result.ledger[0].exit_reason, ExitReason::TrailingStop);
        assert_eq!(
            result.ledger[0].exit_date,
            NaiveDate::from_ymd_opt(2024, 1, 9).unwrap()
        );
        assert_eq!(
            result.ledger[1].entry_date,
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
        );
        assert_eq!(result.ledger[1].exit_reason, ExitReason::EndOfData);
    }

    #[test]
    fn ranking_orders_same_day_candidates() {
        let mut config = small_config();
        config.risk.max_positions = 1;
        config.ranking = CandidateRanking::Symbol;
        let engine = BacktestEngine::new(config);
        let result = engine
            .run(universe(vec![("ZEE.NS", rising(12)), ("ACC.NS", rising(12))]))
            .unwrap();

        assert_eq!(result.ledger.len(), 1);
        assert_eq!(result.ledger[0].symbol, "ACC.NS");
        assert!(result.rejected.iter().all(|r| r.symbol == "ZEE.NS"));
        assert!(matches!(
            result.rejected[0].reason,
            RejectionReason::MaxPositions { open: 1, max: 1 }
        ));
    }

    #[test]
    fn events_are_emitted() {
        let (tx, rx) = mpsc::channel();
        let engine = BacktestEngine::new(small_config()).with_events(tx);
        engine.run(universe(vec![("INFY.NS", rising(12))])).unwrap();
        drop(engine);

        let events: Vec<EngineEvent> = rx.iter().collect();
        assert!(matches!(events.first(), Some(EngineEvent::SignalProduced { .. })));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, EngineEvent::PositionOpened { .. }))
                .count(),
            1
        );
        assert!(matches!(events.last(), Some(EngineEvent::PositionClosed(_))));
    }

    #[test]
    fn default_weights_hold_back_on_overbought_uptrend() {
        let (tx, rx) = mpsc::channel();
        let engine = BacktestEngine::new(EngineConfig::default()).with_events(tx);
        let result = engine.run(universe(vec![("INFY.NS", rising(80))])).unwrap();
        drop(engine);

        assert!(result.ledger.is_empty());
        assert!(result.candidates.is_empty());
        assert!(result.rejected.is_empty());

        let signals: Vec<AggregatedSignal> = rx
            .iter()
            .filter_map(|e| match e {
                EngineEvent::SignalProduced { signal, .. } => Some(signal),
                _ => None,
            })
            .collect();
        // first full reading set is bar 50 of 80
        assert_eq!(signals.len(), 30);
        for signal in &signals {
            // RSI sell cancels the SMA buy, EMA buy alone: 1/6
            assert_eq!(signal.direction, SignalDirection::Neutral);
            assert!((signal.score - 1.0 / 6.0).abs() < 1e-9);
            assert_eq!(signal.readings.len(), IndicatorKind::ALL.len());
        }
    }

    #[test]
    fn invalid_config_is_fatal() {
        let mut config = small_config();
        config.risk.risk_per_trade = -0.01;
        let engine = BacktestEngine::new(config);
        let err = engine.run(universe(vec![("INFY.NS", rising(12))])).unwrap_err();
        assert!(matches!(err, SwingError::NonPositiveRiskPct { .. }));
    }
}
