//! Instrument universe: symbol parsing and per-symbol data loading.
//!
//! Symbols carry an exchange suffix (`.NS` for NSE, `.BO` for BSE). A symbol
//! whose data cannot be fetched is skipped and reported, never fatal on its
//! own; only a universe where nothing loads fails.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exchange {
    Nse,
    Bse,
}

impl Exchange {
    pub fn suffix(self) -> &'static str {
        match self {
            Exchange::Nse => ".NS",
            Exchange::Bse => ".BO",
        }
    }

    /// Exchange named by a symbol's suffix.
    pub fn of_symbol(symbol: &str) -> Option<Exchange> {
        [Exchange::Nse, Exchange::Bse]
            .into_iter()
            .find(|ex| symbol.len() > 3 && symbol.ends_with(ex.suffix()))
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exchange::Nse => f.write_str("NSE"),
            Exchange::Bse => f.write_str("BSE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in symbol list")]
    EmptyToken,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),

    #[error("symbol {0} has no .NS or .BO exchange suffix")]
    UnknownExchange(String),

    #[error("no symbols configured")]
    Empty,

    #[error("no symbol in the universe has usable data")]
    AllSymbolsFailed,
}

/// Parse a comma-separated symbol list into upper-case, de-duplicated symbols.
pub fn parse_symbols(input: &str) -> Result<Vec<String>, UniverseError> {
    if input.trim().is_empty() {
        return Err(UniverseError::Empty);
    }

    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let symbol = trimmed.to_uppercase();
        if Exchange::of_symbol(&symbol).is_none() {
            return Err(UniverseError::UnknownExchange(symbol));
        }
        if !seen.insert(symbol.clone()) {
            return Err(UniverseError::DuplicateSymbol(symbol));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedInstrument {
    pub symbol: String,
    pub reason: String,
}

/// Bar series keyed by symbol, plus the symbols that could not be loaded.
#[derive(Debug, Clone, Default)]
pub struct LoadedUniverse {
    pub series: BTreeMap<String, Vec<OhlcvBar>>,
    pub skipped: Vec<SkippedInstrument>,
}

impl LoadedUniverse {
    pub fn from_series(series: BTreeMap<String, Vec<OhlcvBar>>) -> Self {
        LoadedUniverse {
            series,
            skipped: Vec::new(),
        }
    }
}

pub fn load_universe(
    data_port: &dyn DataPort,
    symbols: &[String],
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> Result<LoadedUniverse, UniverseError> {
    let mut universe = LoadedUniverse::default();

    for symbol in symbols {
        match data_port.fetch_bars(symbol, start_date, end_date) {
            Ok(bars) if bars.is_empty() => {
                warn!(%symbol, "skipping: no data in range");
                universe.skipped.push(SkippedInstrument {
                    symbol: symbol.clone(),
                    reason: "no data in range".to_string(),
                });
            }
            Ok(bars) => {
                info!(%symbol, bars = bars.len(), "loaded");
                universe.series.insert(symbol.clone(), bars);
            }
            Err(e) => {
                warn!(%symbol, error = %e, "skipping: fetch failed");
                universe.skipped.push(SkippedInstrument {
                    symbol: symbol.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    if universe.series.is_empty() {
        return Err(UniverseError::AllSymbolsFailed);
    }

    Ok(universe)
}
