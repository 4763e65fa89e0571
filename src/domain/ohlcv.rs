//! Daily OHLCV bar and series validation.

use chrono::NaiveDate;

use super::error::DataError;

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl OhlcvBar {
    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    /// Finite positive prices with open and close inside [low, high].
    pub fn is_well_formed(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        prices.iter().all(|p| p.is_finite() && *p > 0.0)
            && self.low <= self.open.min(self.close)
            && self.high >= self.open.max(self.close)
    }
}

/// Check that a series is non-empty, strictly increasing in date and made of
/// well-formed bars.
pub fn validate_series(symbol: &str, bars: &[OhlcvBar]) -> Result<(), DataError> {
    if bars.is_empty() {
        return Err(DataError::NoData {
            symbol: symbol.to_string(),
        });
    }

    for (i, bar) in bars.iter().enumerate() {
        if !bar.is_well_formed() {
            return Err(DataError::MalformedBar {
                symbol: symbol.to_string(),
                date: bar.date,
            });
        }
        if i > 0 && bar.date <= bars[i - 1].date {
            return Err(DataError::UnorderedBars {
                symbol: symbol.to_string(),
                date: bar.date,
            });
        }
    }

    Ok(())
}
