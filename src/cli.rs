//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{BacktestEngine, BacktestResult};
use crate::domain::config::EngineConfig;
use crate::domain::error::SwingError;
use crate::domain::universe::{UniverseError, load_universe, parse_symbols};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

const DEFAULT_OUTPUT_DIR: &str = "swingtrader-report";

#[derive(Parser, Debug)]
#[command(
    name = "swingtrader",
    about = "Signal-driven swing trading backtester for NSE/BSE equities"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest over CSV price files
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data_dir: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Comma-separated symbols, overriding [backtest] symbols
        #[arg(long)]
        symbols: Option<String>,
    },
    /// Validate a configuration file without running
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List symbols with price files in a data directory
    ListSymbols {
        #[arg(short, long)]
        data_dir: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            data_dir,
            output,
            symbols,
        } => run_backtest(&config, &data_dir, output.as_deref(), symbols.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::ListSymbols { data_dir } => run_list_symbols(&data_dir),
    }
}

fn fail(err: SwingError) -> ExitCode {
    eprintln!("error: {err}");
    (&err).into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(fail)
}

/// Build and validate the engine config, applying a symbol override.
pub fn build_engine_config(
    port: &dyn ConfigPort,
    symbols_override: Option<&str>,
) -> Result<EngineConfig, SwingError> {
    let mut config = EngineConfig::from_port(port)?;
    if let Some(list) = symbols_override {
        config.symbols = parse_symbols(list)?;
    }
    if config.symbols.is_empty() {
        return Err(UniverseError::Empty.into());
    }
    config.validate()?;
    Ok(config)
}

/// Load the universe, run the engine and write the report files.
pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    config: EngineConfig,
    output_dir: &Path,
) -> Result<BacktestResult, SwingError> {
    let universe = load_universe(
        data_port,
        &config.symbols,
        config.start_date,
        config.end_date,
    )?;

    let engine = BacktestEngine::new(config);
    let result = engine.run(universe)?;

    CsvReportAdapter::new().write(&result, output_dir)?;
    Ok(result)
}

fn run_backtest(
    config_path: &Path,
    data_dir: &Path,
    output_path: Option<&Path>,
    symbols_override: Option<&str>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let config = match build_engine_config(&adapter, symbols_override) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    eprintln!(
        "Running backtest: {} symbols from {}",
        config.symbols.len(),
        data_dir.display()
    );

    let output_dir = output_path.map_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR), Path::to_path_buf);
    let data_port = CsvAdapter::new(data_dir.to_path_buf());

    let result = match run_backtest_pipeline(&data_port, config, &output_dir) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    print_summary(&result);
    eprintln!("\nReports written to: {}", output_dir.display());
    ExitCode::SUCCESS
}

fn print_summary(result: &BacktestResult) {
    let metrics = &result.metrics;
    let summary = &result.summary;

    eprintln!("\n=== Results ===");
    eprintln!("Instruments:      {} ({} skipped)", summary.instruments, summary.skipped);
    eprintln!("Final Equity:     {:.2}", summary.final_equity);
    eprintln!("Total Return:     {:.2}%", metrics.total_return * 100.0);
    eprintln!("Annualized:       {:.2}%", metrics.annualized_return * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", metrics.max_drawdown * 100.0);
    eprintln!("Total Trades:     {}", metrics.total_trades);
    eprintln!("Win Rate:         {:.1}%", metrics.win_rate * 100.0);
    eprintln!("Profit Factor:    {:.2}", metrics.profit_factor);
    eprintln!("Rejected:         {}", result.rejected.len());

    if !result.skipped.is_empty() {
        eprintln!("\n=== Skipped ===");
        for s in &result.skipped {
            eprintln!("  {}: {}", s.symbol, s.reason);
        }
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let config = match build_engine_config(&adapter, None) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    eprintln!("Config validated successfully");
    eprintln!("  symbols:        {}", config.symbols.join(", "));
    eprintln!("  capital:        {:.2}", config.initial_capital);
    eprintln!("  risk/trade:     {:.2}%", config.risk.risk_per_trade * 100.0);
    eprintln!("  max positions:  {}", config.risk.max_positions);
    eprintln!("  min bars:       {}", config.indicators.min_bars());
    ExitCode::SUCCESS
}

fn run_list_symbols(data_dir: &Path) -> ExitCode {
    let adapter = CsvAdapter::new(data_dir.to_path_buf());
    match adapter.list_symbols() {
        Ok(symbols) => {
            for symbol in symbols {
                println!("{symbol}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => fail(e.into()),
    }
}
