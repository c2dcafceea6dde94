//! Backtest command implementation

use anyhow::{Context, Result};
use grid_backtest::backtest::Backtester;
use grid_backtest::calendar::CsvCalendar;
use grid_backtest::data::{self, CsvPriceProvider};
use grid_backtest::stats::{format_summary, ProfitCalcMethod};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::{debug, info};

/// Command-line overrides for the `backtest` command
#[derive(Debug, Default)]
pub struct BacktestOverrides {
    pub symbol: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub month: Option<u32>,
    pub min_buy_times: Option<u32>,
    pub segments: Option<bool>,
    pub method: Option<String>,
    pub connect_segments: bool,
    pub parallel: bool,
    pub trades_out: Option<String>,
    pub show_log: bool,
}

pub fn run(config_path: Option<String>, overrides: BacktestOverrides) -> Result<()> {
    info!("Starting backtest");

    let mut config = super::load_config(config_path.as_deref())?;

    // Apply overrides
    if let Some(symbol) = overrides.symbol {
        info!("Overriding symbol to: {}", symbol);
        config.backtest.symbol = symbol;
    }
    if overrides.start.is_some() {
        config.backtest.start_date = overrides.start;
    }
    if overrides.end.is_some() {
        config.backtest.end_date = overrides.end;
    }
    if overrides.month.is_some() {
        config.backtest.month_filter = overrides.month;
    }
    if let Some(times) = overrides.min_buy_times {
        config.backtest.min_buy_times = times;
    }
    if let Some(enabled) = overrides.segments {
        config.backtest.enable_segments = enabled;
    }
    if let Some(method) = overrides.method {
        config.backtest.profit_calc_method = method
            .parse::<ProfitCalcMethod>()
            .map_err(anyhow::Error::msg)?;
    }
    config.backtest.connect_segments |= overrides.connect_segments;
    config.backtest.parallel_segments |= overrides.parallel;

    let bt = &config.backtest;
    let start = data::parse_date(
        bt.start_date
            .as_deref()
            .context("A start date is required (--start or backtest.start_date)")?,
    )?;
    let end = data::parse_date(
        bt.end_date
            .as_deref()
            .context("An end date is required (--end or backtest.end_date)")?,
    )?;

    info!("Loading data from: {}", bt.data_dir);
    let provider = CsvPriceProvider::new(&bt.data_dir);
    let calendar = bt.calendar_file.as_ref().map(CsvCalendar::new);

    let mut backtester = Backtester::new(&provider, bt.symbol.clone())
        .with_connected_segments(bt.connect_segments)
        .with_parallel_segments(bt.parallel_segments);
    if let Some(calendar) = &calendar {
        debug!("Using trading calendar: {}", calendar.path().display());
        backtester = backtester.with_calendar(calendar);
    }

    let segments = if bt.enable_segments {
        let plan = backtester.plan_segments(start, end, bt.min_buy_times);
        info!("Planned {} segments", plan.len());
        Some(plan)
    } else {
        None
    };

    let segment_count = segments.as_ref().map_or(1, Vec::len);
    let pb = ProgressBar::new(segment_count as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{percent:>3}%|{bar:40}| {pos}/{len} segments [{elapsed}<{eta}]")?
            .progress_chars("█░ "),
    );
    backtester = backtester.with_progress(pb.clone());

    info!("Running backtest...");
    let details = backtester.run_strategy_details(
        &config.strategy,
        start,
        end,
        segments.as_deref(),
        bt.month_filter,
    )?;
    pb.finish_and_clear();

    if overrides.show_log {
        println!("{}", details.output_log);
    }

    let summary = details.summary(bt.profit_calc_method);

    // Print results
    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS");
    println!("{}", "=".repeat(60));
    println!("Symbol:             {}", bt.symbol);
    println!("Period:             {} to {}", start, end);
    if let Some(month) = bt.month_filter {
        println!("Month filter:       {}", month);
    }
    println!(
        "Initial ledger:     cash {:.2}, positions {}",
        config.strategy.initial_cash, config.strategy.initial_positions
    );
    println!("{}", "-".repeat(60));
    for line in format_summary(&summary, &details.segment_results) {
        println!("{}", line);
    }
    println!("{}", "=".repeat(60));

    if let Some(path) = overrides.trades_out {
        let trades: Vec<_> = details
            .segment_results
            .iter()
            .flat_map(|r| r.trades.iter().cloned())
            .collect();
        let path = PathBuf::from(&bt.results_dir).join(path);
        data::write_trades_csv(&path, &trades)
            .with_context(|| format!("Failed to write trades to {}", path.display()))?;
        println!("Trades written to:  {}", path.display());
    }

    info!("Backtest completed successfully");

    Ok(())
}
