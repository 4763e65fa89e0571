//! Indicator readings and weighted signal aggregation.
//!
//! An [`IndicatorFrame`] holds every configured indicator series for one
//! instrument. [`IndicatorFrame::readings_at`] turns one bar of that frame into
//! directional votes, and [`SignalAggregator::aggregate`] folds the votes into
//! a single [`AggregatedSignal`].

use std::fmt;

use serde::Serialize;

use crate::domain::error::DataError;
use crate::domain::indicator::{
    IndicatorSeries, IndicatorType, IndicatorValue, calculate_atr, calculate_bollinger,
    calculate_ema, calculate_macd, calculate_rsi, calculate_sma, calculate_stochastic,
    calculate_volume_sma, mean_stddev,
};
use crate::domain::ohlcv::OhlcvBar;

/// Relative band around zero that a MACD histogram must clear, as a
/// fraction of the close, before a sign change counts as a crossover.
const CROSSOVER_TOLERANCE: f64 = 1e-9;

/// Vote cast by a single indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Buy,
    Sell,
    Neutral,
}

impl Direction {
    fn sign(self) -> f64 {
        match self {
            Direction::Buy => 1.0,
            Direction::Sell => -1.0,
            Direction::Neutral => 0.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
            Direction::Neutral => "NEUTRAL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalDirection {
    StrongBuy,
    Buy,
    Neutral,
    Sell,
    StrongSell,
}

impl SignalDirection {
    pub fn is_buy(self) -> bool {
        matches!(self, SignalDirection::Buy | SignalDirection::StrongBuy)
    }

    pub fn is_sell(self) -> bool {
        matches!(self, SignalDirection::Sell | SignalDirection::StrongSell)
    }
}

impl fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalDirection::StrongBuy => "STRONG_BUY",
            SignalDirection::Buy => "BUY",
            SignalDirection::Neutral => "NEUTRAL",
            SignalDirection::Sell => "SELL",
            SignalDirection::StrongSell => "STRONG_SELL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndicatorKind {
    Rsi,
    Macd,
    Bollinger,
    SmaTrend,
    EmaTrend,
    Volume,
    Stochastic,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 7] = [
        IndicatorKind::Rsi,
        IndicatorKind::Macd,
        IndicatorKind::Bollinger,
        IndicatorKind::SmaTrend,
        IndicatorKind::EmaTrend,
        IndicatorKind::Volume,
        IndicatorKind::Stochastic,
    ];
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndicatorKind::Rsi => "RSI",
            IndicatorKind::Macd => "MACD",
            IndicatorKind::Bollinger => "BOLLINGER",
            IndicatorKind::SmaTrend => "SMA_TREND",
            IndicatorKind::EmaTrend => "EMA_TREND",
            IndicatorKind::Volume => "VOLUME",
            IndicatorKind::Stochastic => "STOCHASTIC",
        };
        f.write_str(s)
    }
}

/// One indicator's vote on one bar. `strength` is always in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorReading {
    pub kind: IndicatorKind,
    pub value: f64,
    pub direction: Direction,
    pub strength: f64,
}

impl IndicatorReading {
    fn new(kind: IndicatorKind, value: f64, direction: Direction, strength: f64) -> Self {
        let strength = if strength.is_finite() {
            strength.clamp(0.0, 1.0)
        } else {
            0.0
        };
        IndicatorReading {
            kind,
            value,
            direction,
            strength,
        }
    }

    fn neutral(kind: IndicatorKind, value: f64) -> Self {
        IndicatorReading::new(kind, value, Direction::Neutral, 0.0)
    }

    /// +strength for BUY, -strength for SELL, 0 for NEUTRAL.
    pub fn vote(&self) -> f64 {
        self.direction.sign() * self.strength
    }
}

/// Periods and thresholds for every indicator in the frame.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSettings {
    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger_period: usize,
    pub bollinger_mult_x100: u32,
    pub sma_short: usize,
    pub sma_long: usize,
    pub ema_short: usize,
    pub ema_long: usize,
    pub volume_period: usize,
    pub volume_spike_multiple: f64,
    /// Relative short/long spread that counts as a full-strength trend vote.
    pub trend_full_scale: f64,
    pub stochastic_k: usize,
    pub stochastic_d: usize,
    pub stochastic_oversold: f64,
    pub stochastic_overbought: f64,
    pub atr_period: usize,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        IndicatorSettings {
            rsi_period: 14,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bollinger_period: 20,
            bollinger_mult_x100: 200,
            sma_short: 20,
            sma_long: 50,
            ema_short: 9,
            ema_long: 21,
            volume_period: 20,
            volume_spike_multiple: 1.5,
            trend_full_scale: 0.05,
            stochastic_k: 14,
            stochastic_d: 3,
            stochastic_oversold: 20.0,
            stochastic_overbought: 80.0,
            atr_period: 14,
        }
    }
}

impl IndicatorSettings {
    /// Every indicator series the frame computes.
    pub fn indicator_types(&self) -> Vec<IndicatorType> {
        vec![
            IndicatorType::Rsi(self.rsi_period),
            IndicatorType::Macd {
                fast: self.macd_fast,
                slow: self.macd_slow,
                signal: self.macd_signal,
            },
            IndicatorType::Bollinger {
                period: self.bollinger_period,
                stddev_mult_x100: self.bollinger_mult_x100,
            },
            IndicatorType::Sma(self.sma_short),
            IndicatorType::Sma(self.sma_long),
            IndicatorType::Ema(self.ema_short),
            IndicatorType::Ema(self.ema_long),
            IndicatorType::VolumeSma(self.volume_period),
            IndicatorType::Stochastic {
                k_period: self.stochastic_k,
                d_period: self.stochastic_d,
            },
            IndicatorType::Atr(self.atr_period),
        ]
    }

    /// The indicator with the longest lookback.
    pub fn binding_indicator(&self) -> IndicatorType {
        self.indicator_types()
            .into_iter()
            .max_by_key(IndicatorType::lookback)
            .unwrap_or(IndicatorType::Sma(1))
    }

    /// Bars needed before the first complete set of readings. The extra bar
    /// gives MACD a previous value for crossover detection.
    pub fn min_bars(&self) -> usize {
        self.binding_indicator().lookback() + 1
    }
}

/// All indicator series for one instrument, aligned to its bars.
#[derive(Debug, Clone)]
pub struct IndicatorFrame {
    pub symbol: String,
    settings: IndicatorSettings,
    closes: Vec<f64>,
    volumes: Vec<f64>,
    rsi: IndicatorSeries,
    macd: IndicatorSeries,
    bollinger: IndicatorSeries,
    sma_short: IndicatorSeries,
    sma_long: IndicatorSeries,
    ema_short: IndicatorSeries,
    ema_long: IndicatorSeries,
    volume_sma: IndicatorSeries,
    stochastic: IndicatorSeries,
    atr: IndicatorSeries,
}

impl IndicatorFrame {
    pub fn compute(bars: &[OhlcvBar], settings: &IndicatorSettings) -> Result<Self, DataError> {
        let minimum = settings.min_bars();
        if bars.len() < minimum {
            return Err(DataError::InsufficientData {
                indicator: settings.binding_indicator().to_string(),
                bars: bars.len(),
                minimum,
            });
        }

        let s = settings;
        Ok(IndicatorFrame {
            symbol: bars.first().map(|b| b.symbol.clone()).unwrap_or_default(),
            closes: bars.iter().map(|b| b.close).collect(),
            volumes: bars.iter().map(|b| b.volume as f64).collect(),
            rsi: calculate_rsi(bars, s.rsi_period)?,
            macd: calculate_macd(bars, s.macd_fast, s.macd_slow, s.macd_signal)?,
            bollinger: calculate_bollinger(bars, s.bollinger_period, s.bollinger_mult_x100)?,
            sma_short: calculate_sma(bars, s.sma_short)?,
            sma_long: calculate_sma(bars, s.sma_long)?,
            ema_short: calculate_ema(bars, s.ema_short)?,
            ema_long: calculate_ema(bars, s.ema_long)?,
            volume_sma: calculate_volume_sma(bars, s.volume_period)?,
            stochastic: calculate_stochastic(bars, s.stochastic_k, s.stochastic_d)?,
            atr: calculate_atr(bars, s.atr_period)?,
            settings: settings.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn atr_at(&self, index: usize) -> Option<f64> {
        self.atr.simple_at(index)
    }

    /// Population stddev of the valid MACD histogram over the last
    /// `macd_slow` bars ending at `index`. Zero with fewer than two values.
    fn histogram_stddev(&self, index: usize) -> f64 {
        let start = (index + 1).saturating_sub(self.settings.macd_slow);
        let window: Vec<f64> = (start..=index)
            .filter_map(|j| macd_parts(self.macd.valid_at(j)?))
            .map(|(_, _, histogram)| histogram)
            .collect();
        if window.len() < 2 {
            return 0.0;
        }
        mean_stddev(&window).1
    }

    /// Readings for bar `index`. Indicators still inside their warmup window
    /// are left out rather than reported as neutral.
    pub fn readings_at(&self, index: usize) -> Vec<IndicatorReading> {
        IndicatorKind::ALL
            .iter()
            .filter_map(|&kind| self.reading(kind, index))
            .collect()
    }

    fn reading(&self, kind: IndicatorKind, i: usize) -> Option<IndicatorReading> {
        let s = &self.settings;
        let close = *self.closes.get(i)?;

        match kind {
            IndicatorKind::Rsi => {
                let rsi = self.rsi.simple_at(i)?;
                let strength = (rsi - 50.0).abs() / 50.0;
                let direction = if rsi < s.rsi_oversold {
                    Direction::Buy
                } else if rsi > s.rsi_overbought {
                    Direction::Sell
                } else {
                    Direction::Neutral
                };
                Some(IndicatorReading::new(kind, rsi, direction, strength))
            }
            IndicatorKind::Macd => {
                let (_, _, histogram) = macd_parts(self.macd.valid_at(i)?)?;
                let (_, _, prev_histogram) = macd_parts(self.macd.valid_at(i.checked_sub(1)?)?)?;
                let eps = close.abs() * CROSSOVER_TOLERANCE;
                let direction = if prev_histogram <= eps && histogram > eps {
                    Direction::Buy
                } else if prev_histogram >= -eps && histogram < -eps {
                    Direction::Sell
                } else {
                    return Some(IndicatorReading::neutral(kind, histogram));
                };
                let sigma = self.histogram_stddev(i);
                let strength = if sigma > eps {
                    histogram.abs() / sigma
                } else {
                    0.0
                };
                Some(IndicatorReading::new(kind, histogram, direction, strength))
            }
            IndicatorKind::Bollinger => {
                let IndicatorValue::Bollinger {
                    upper,
                    middle,
                    lower,
                } = self.bollinger.valid_at(i)?
                else {
                    return None;
                };
                let half_width = upper - middle;
                if half_width <= 0.0 {
                    return Some(IndicatorReading::neutral(kind, close));
                }
                let direction = if close <= lower {
                    Direction::Buy
                } else if close >= upper {
                    Direction::Sell
                } else {
                    Direction::Neutral
                };
                let strength = (close - middle).abs() / (2.0 * half_width);
                Some(IndicatorReading::new(kind, close, direction, strength))
            }
            IndicatorKind::SmaTrend => trend_reading(
                kind,
                self.sma_short.simple_at(i)?,
                self.sma_long.simple_at(i)?,
                s.trend_full_scale,
            ),
            IndicatorKind::EmaTrend => trend_reading(
                kind,
                self.ema_short.simple_at(i)?,
                self.ema_long.simple_at(i)?,
                s.trend_full_scale,
            ),
            IndicatorKind::Volume => {
                let average = self.volume_sma.simple_at(i)?;
                if average <= 0.0 || i == 0 {
                    return Some(IndicatorReading::neutral(kind, 0.0));
                }
                let ratio = self.volumes[i] / average;
                if ratio <= s.volume_spike_multiple {
                    return Some(IndicatorReading::neutral(kind, ratio));
                }
                let prev_close = self.closes[i - 1];
                let direction = if close > prev_close {
                    Direction::Buy
                } else if close < prev_close {
                    Direction::Sell
                } else {
                    Direction::Neutral
                };
                let strength = ratio / (2.0 * s.volume_spike_multiple);
                Some(IndicatorReading::new(kind, ratio, direction, strength))
            }
            IndicatorKind::Stochastic => {
                let IndicatorValue::Stochastic { k, .. } = self.stochastic.valid_at(i)? else {
                    return None;
                };
                let direction = if k < s.stochastic_oversold {
                    Direction::Buy
                } else if k > s.stochastic_overbought {
                    Direction::Sell
                } else {
                    Direction::Neutral
                };
                let strength = (k - 50.0).abs() / 50.0;
                Some(IndicatorReading::new(kind, k, direction, strength))
            }
        }
    }
}

fn macd_parts(value: IndicatorValue) -> Option<(f64, f64, f64)> {
    match value {
        IndicatorValue::Macd {
            line,
            signal,
            histogram,
        } => Some((line, signal, histogram)),
        _ => None,
    }
}

fn trend_reading(
    kind: IndicatorKind,
    short: f64,
    long: f64,
    full_scale: f64,
) -> Option<IndicatorReading> {
    if long <= 0.0 || full_scale <= 0.0 {
        return None;
    }
    let spread = (short - long) / long;
    let direction = if short > long {
        Direction::Buy
    } else {
        Direction::Sell
    };
    Some(IndicatorReading::new(
        kind,
        spread,
        direction,
        spread.abs() / full_scale,
    ))
}

/// Non-negative vote weight per indicator kind.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalWeights {
    pub rsi: f64,
    pub macd: f64,
    pub bollinger: f64,
    pub sma_trend: f64,
    pub ema_trend: f64,
    pub volume: f64,
    pub stochastic: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        SignalWeights {
            rsi: 1.0,
            macd: 1.0,
            bollinger: 1.0,
            sma_trend: 1.0,
            ema_trend: 1.0,
            volume: 1.0,
            stochastic: 0.0,
        }
    }
}

impl SignalWeights {
    pub fn weight(&self, kind: IndicatorKind) -> f64 {
        match kind {
            IndicatorKind::Rsi => self.rsi,
            IndicatorKind::Macd => self.macd,
            IndicatorKind::Bollinger => self.bollinger,
            IndicatorKind::SmaTrend => self.sma_trend,
            IndicatorKind::EmaTrend => self.ema_trend,
            IndicatorKind::Volume => self.volume,
            IndicatorKind::Stochastic => self.stochastic,
        }
    }

    pub fn set(&mut self, kind: IndicatorKind, weight: f64) {
        let slot = match kind {
            IndicatorKind::Rsi => &mut self.rsi,
            IndicatorKind::Macd => &mut self.macd,
            IndicatorKind::Bollinger => &mut self.bollinger,
            IndicatorKind::SmaTrend => &mut self.sma_trend,
            IndicatorKind::EmaTrend => &mut self.ema_trend,
            IndicatorKind::Volume => &mut self.volume,
            IndicatorKind::Stochastic => &mut self.stochastic,
        };
        *slot = weight;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedSignal {
    pub direction: SignalDirection,
    pub score: f64,
    pub confidence: f64,
    #[serde(skip)]
    pub readings: Vec<IndicatorReading>,
}

impl AggregatedSignal {
    /// Entry policy: a buy-side signal at or above `min_confidence`.
    pub fn is_actionable(&self, min_confidence: f64) -> bool {
        self.direction.is_buy() && self.confidence >= min_confidence
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalAggregator {
    pub weights: SignalWeights,
    pub buy_threshold: f64,
    pub strong_threshold: f64,
}

impl Default for SignalAggregator {
    fn default() -> Self {
        SignalAggregator {
            weights: SignalWeights::default(),
            buy_threshold: 0.2,
            strong_threshold: 0.6,
        }
    }
}

impl SignalAggregator {
    pub fn new(weights: SignalWeights) -> Self {
        SignalAggregator {
            weights,
            ..SignalAggregator::default()
        }
    }

    /// Weighted mean of the votes, mapped onto the five-step scale.
    pub fn aggregate(&self, readings: Vec<IndicatorReading>) -> AggregatedSignal {
        let (weighted, total_weight) =
            readings
                .iter()
                .fold((0.0_f64, 0.0_f64), |(weighted, total), reading| {
                    let w = self.weights.weight(reading.kind).max(0.0);
                    (weighted + w * reading.vote(), total + w)
                });

        let score = if total_weight > 0.0 {
            (weighted / total_weight).clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let score = if score.is_finite() { score } else { 0.0 };

        let direction = if score >= self.strong_threshold {
            SignalDirection::StrongBuy
        } else if score >= self.buy_threshold {
            SignalDirection::Buy
        } else if score <= -self.strong_threshold {
            SignalDirection::StrongSell
        } else if score <= -self.buy_threshold {
            SignalDirection::Sell
        } else {
            SignalDirection::Neutral
        };

        AggregatedSignal {
            direction,
            score,
            confidence: score.abs(),
            readings,
        }
    }
}
