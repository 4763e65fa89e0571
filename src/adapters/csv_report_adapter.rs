//! CSV report adapter implementing ReportPort.
//!
//! Writes one file per record kind into the output directory: `trades.csv`,
//! `rejected.csv`, `candidates.csv`, `skipped.csv`, `equity.csv`,
//! `monthly.csv` and a `summary.csv` of `metric,value` pairs. Every file
//! starts with its header row, even when there are no records.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::SwingError;
use crate::ports::report_port::ReportPort;

const TRADE_COLUMNS: &[&str] = &[
    "symbol",
    "quantity",
    "entry_date",
    "entry_price",
    "exit_date",
    "exit_price",
    "stop_loss_price",
    "take_profit_price",
    "exit_reason",
    "pnl",
    "return_pct",
    "holding_days",
];
const REJECTED_COLUMNS: &[&str] = &["date", "symbol", "confidence", "reason"];
const CANDIDATE_COLUMNS: &[&str] = &[
    "date",
    "symbol",
    "direction",
    "score",
    "confidence",
    "entry_price",
    "quantity",
    "stop_loss_price",
    "take_profit_price",
    "risk_amount",
];
const SKIPPED_COLUMNS: &[&str] = &["symbol", "reason"];
const EQUITY_COLUMNS: &[&str] = &["date", "equity", "cash", "open_positions"];
const MONTHLY_COLUMNS: &[&str] = &["year", "month", "end_equity", "return_pct"];
const SUMMARY_COLUMNS: &[&str] = &["metric", "value"];

#[derive(Serialize)]
struct RejectedRow<'a> {
    date: NaiveDate,
    symbol: &'a str,
    confidence: f64,
    reason: String,
}

#[derive(Serialize)]
struct CandidateRow<'a> {
    date: NaiveDate,
    symbol: &'a str,
    direction: String,
    score: f64,
    confidence: f64,
    entry_price: f64,
    quantity: Option<u64>,
    stop_loss_price: Option<f64>,
    take_profit_price: Option<f64>,
    risk_amount: Option<f64>,
}

#[derive(Serialize)]
struct SummaryRow {
    metric: &'static str,
    value: String,
}

pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CsvReportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Write `columns` as the header row, then one serialized record per row.
/// The rows must serialize their fields in `columns` order.
fn write_rows<T: Serialize>(
    path: &Path,
    columns: &[&str],
    rows: impl IntoIterator<Item = T>,
) -> Result<(), SwingError> {
    let report_err = |e: csv::Error| SwingError::Report {
        reason: format!("{}: {}", path.display(), e),
    };
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(report_err)?;
    wtr.write_record(columns).map_err(report_err)?;
    for row in rows {
        wtr.serialize(row).map_err(report_err)?;
    }
    wtr.flush()?;
    Ok(())
}

fn summary_rows(result: &BacktestResult) -> Vec<SummaryRow> {
    let s = &result.summary;
    let m = &result.metrics;
    let row = |metric: &'static str, value: String| SummaryRow { metric, value };

    vec![
        row("instruments", s.instruments.to_string()),
        row("skipped", s.skipped.to_string()),
        row("bars_processed", s.bars_processed.to_string()),
        row("initial_capital", format!("{:.2}", s.initial_capital)),
        row("final_equity", format!("{:.2}", s.final_equity)),
        row("total_trades", m.total_trades.to_string()),
        row("trades_won", m.trades_won.to_string()),
        row("trades_lost", m.trades_lost.to_string()),
        row("win_rate", format!("{:.4}", m.win_rate)),
        row("profit_factor", format!("{:.4}", m.profit_factor)),
        row("total_pnl", format!("{:.2}", m.total_pnl)),
        row("total_return", format!("{:.4}", m.total_return)),
        row("annualized_return", format!("{:.4}", m.annualized_return)),
        row("expectancy", format!("{:.2}", m.expectancy)),
        row("avg_holding_days", format!("{:.2}", m.avg_holding_days)),
        row("max_drawdown", format!("{:.4}", m.max_drawdown)),
        row("sharpe_ratio", format!("{:.4}", m.sharpe_ratio)),
        row("sortino_ratio", format!("{:.4}", m.sortino_ratio)),
        row("calmar_ratio", format!("{:.4}", m.calmar_ratio)),
        row("rejected_candidates", result.rejected.len().to_string()),
    ]
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, result: &BacktestResult, output_dir: &Path) -> Result<(), SwingError> {
        fs::create_dir_all(output_dir)?;

        write_rows(&output_dir.join("trades.csv"), TRADE_COLUMNS, &result.ledger)?;

        write_rows(
            &output_dir.join("rejected.csv"),
            REJECTED_COLUMNS,
            result.rejected.iter().map(|r| RejectedRow {
                date: r.date,
                symbol: &r.symbol,
                confidence: r.confidence,
                reason: r.reason.to_string(),
            }),
        )?;

        write_rows(
            &output_dir.join("candidates.csv"),
            CANDIDATE_COLUMNS,
            result.candidates.iter().map(|c| CandidateRow {
                date: c.date,
                symbol: &c.symbol,
                direction: c.signal.direction.to_string(),
                score: c.signal.score,
                confidence: c.signal.confidence,
                entry_price: c.entry_price,
                quantity: c.sizing.map(|s| s.quantity),
                stop_loss_price: c.sizing.map(|s| s.stop_loss_price),
                take_profit_price: c.sizing.map(|s| s.take_profit_price),
                risk_amount: c.sizing.map(|s| s.risk_amount),
            }),
        )?;

        write_rows(&output_dir.join("skipped.csv"), SKIPPED_COLUMNS, &result.skipped)?;
        write_rows(&output_dir.join("equity.csv"), EQUITY_COLUMNS, &result.equity_curve)?;
        write_rows(
            &output_dir.join("monthly.csv"),
            MONTHLY_COLUMNS,
            &result.monthly_returns,
        )?;
        write_rows(
            &output_dir.join("summary.csv"),
            SUMMARY_COLUMNS,
            summary_rows(result),
        )?;

        Ok(())
    }
}
