//! Print the segmentation plan for a date range

use anyhow::{Context, Result};
use grid_backtest::calendar::{CsvCalendar, TradingCalendar};
use grid_backtest::data;
use grid_backtest::segments::{build_segments, normalize_batch, segment_days};

pub fn run(
    config_path: Option<String>,
    start: Option<String>,
    end: Option<String>,
    min_buy_times: Option<u32>,
) -> Result<()> {
    let config = super::load_config(config_path.as_deref())?;
    let bt = &config.backtest;

    let start = data::parse_date(
        start
            .as_deref()
            .or(bt.start_date.as_deref())
            .context("A start date is required (--start or backtest.start_date)")?,
    )?;
    let end = data::parse_date(
        end.as_deref()
            .or(bt.end_date.as_deref())
            .context("An end date is required (--end or backtest.end_date)")?,
    )?;
    let batch = normalize_batch(min_buy_times.unwrap_or(bt.min_buy_times));

    let calendar = bt.calendar_file.as_ref().map(CsvCalendar::new);
    let segments = build_segments(
        start,
        end,
        batch,
        calendar.as_ref().map(|c| c as &dyn TradingCalendar),
    );

    println!("\n{}", "=".repeat(60));
    println!("SEGMENT PLAN");
    println!("{}", "=".repeat(60));
    println!("Range:              {} to {}", start, end);
    println!(
        "Batch:              {} ({} trading days per segment)",
        batch,
        segment_days(batch)
    );
    println!("Segments:           {}", segments.len());
    println!("{}", "-".repeat(60));
    for (i, segment) in segments.iter().enumerate() {
        println!("  #{:<3} {}", i + 1, segment);
    }
    println!("{}", "=".repeat(60));

    Ok(())
}
