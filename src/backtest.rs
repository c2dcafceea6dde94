//! Backtesting engine
//!
//! Runs the grid strategy over one or more date segments. Each segment gets a
//! fresh state machine reset to its initial ledger, and every trading day is
//! fed as four price points in a fixed order: open, high, low, close. The
//! order approximates the intraday path without tick data and must not change
//! between runs.

use chrono::{Days, Local, NaiveDate};
use indicatif::ProgressBar;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::calendar::TradingCalendar;
use crate::config::StrategyConfig;
use crate::data::{filter_bars_by_month, PriceSeriesProvider};
use crate::error::{BacktestError, Result};
use crate::indicators::MovingAverageSeries;
use crate::segments::build_segments;
use crate::stats::{aggregate, ProfitCalcMethod, RunSummary, SegmentResult};
use crate::strategies::GridStrategy;
use crate::{FailureCounters, PriceBar, Segment};

/// Per-run detail report
#[derive(Debug, Clone)]
pub struct StrategyDetails {
    /// Sum of the per-segment profit rates, in percent
    pub total_profit: f64,
    pub total_trades: usize,
    pub failed_trades_summary: FailureCounters,
    pub segment_results: Vec<SegmentResult>,
    /// Human-readable day-by-day report for every segment
    pub output_log: String,
}

impl StrategyDetails {
    pub fn summary(&self, method: ProfitCalcMethod) -> RunSummary {
        aggregate(&self.segment_results, method)
    }
}

/// One segment's result plus its day-by-day report
#[derive(Debug, Clone)]
pub struct SegmentRun {
    pub result: SegmentResult,
    pub log: Vec<String>,
}

/// Backtest driver bound to a data provider and instrument
pub struct Backtester<'a> {
    provider: &'a dyn PriceSeriesProvider,
    calendar: Option<&'a dyn TradingCalendar>,
    symbol: String,
    as_of: NaiveDate,
    moving_average: Option<MovingAverageSeries>,
    connect_segments: bool,
    parallel_segments: bool,
    progress: Option<ProgressBar>,
}

impl<'a> Backtester<'a> {
    pub fn new(provider: &'a dyn PriceSeriesProvider, symbol: impl Into<String>) -> Self {
        Backtester {
            provider,
            calendar: None,
            symbol: symbol.into(),
            as_of: Local::now().date_naive(),
            moving_average: None,
            connect_segments: false,
            parallel_segments: false,
            progress: None,
        }
    }

    pub fn with_calendar(mut self, calendar: &'a dyn TradingCalendar) -> Self {
        self.calendar = Some(calendar);
        self
    }

    /// Price points dated after `as_of` are skipped as future data
    pub fn with_reference_date(mut self, as_of: NaiveDate) -> Self {
        self.as_of = as_of;
        self
    }

    /// Use this series for moving-average protection instead of computing one
    pub fn with_moving_average(mut self, series: MovingAverageSeries) -> Self {
        self.moving_average = Some(series);
        self
    }

    /// Carry each segment's ending cash and positions into the next segment
    pub fn with_connected_segments(mut self, connect: bool) -> Self {
        self.connect_segments = connect;
        self
    }

    /// Evaluate independent segments on the rayon pool
    pub fn with_parallel_segments(mut self, parallel: bool) -> Self {
        self.parallel_segments = parallel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Segment plan for a range, aligned to this backtester's calendar
    pub fn plan_segments(&self, start: NaiveDate, end: NaiveDate, min_buy_times: u32) -> Vec<Segment> {
        build_segments(start, end, min_buy_times, self.calendar)
    }

    /// Single-segment backtest returning the profit rate in percent
    pub fn run_backtest(
        &self,
        config: &StrategyConfig,
        start: NaiveDate,
        end: NaiveDate,
        month_filter: Option<u32>,
    ) -> Result<f64> {
        let run = self.run_segment(config, Segment::new(start, end), month_filter, None)?;
        Ok(run.result.profit_rate)
    }

    /// Backtest every segment (or the whole range when none are given) and
    /// collect per-segment results with their reports.
    ///
    /// An empty price series in any segment fails the whole call.
    pub fn run_strategy_details(
        &self,
        config: &StrategyConfig,
        start: NaiveDate,
        end: NaiveDate,
        segments: Option<&[Segment]>,
        month_filter: Option<u32>,
    ) -> Result<StrategyDetails> {
        config.validate()?;

        let segments: Vec<Segment> = match segments {
            Some(s) if !s.is_empty() => s.to_vec(),
            _ => vec![Segment::new(start, end)],
        };

        info!(
            symbol = %self.symbol,
            segments = segments.len(),
            connected = self.connect_segments,
            "Running strategy details from {} to {}",
            start,
            end
        );

        let runs = if self.connect_segments {
            if self.parallel_segments {
                debug!("Connected segments run sequentially");
            }
            self.run_connected(config, &segments, month_filter)?
        } else if self.parallel_segments {
            segments
                .par_iter()
                .map(|segment| self.run_tracked(config, *segment, month_filter, None))
                .collect::<Result<Vec<_>>>()?
        } else {
            segments
                .iter()
                .map(|segment| self.run_tracked(config, *segment, month_filter, None))
                .collect::<Result<Vec<_>>>()?
        };

        let mut output = Vec::new();
        let mut segment_results = Vec::with_capacity(runs.len());
        for (i, run) in runs.into_iter().enumerate() {
            if segments.len() > 1 {
                output.push(format!("{} Segment {} {}", "=".repeat(20), i + 1, "=".repeat(20)));
            }
            output.extend(run.log);
            output.push(String::new());
            segment_results.push(run.result);
        }

        let summary = aggregate(&segment_results, ProfitCalcMethod::Mean);
        let total_profit = segment_results.iter().map(|r| r.profit_rate).sum();

        info!(
            symbol = %self.symbol,
            total_trades = summary.total_trades,
            failures = summary.failed_trades.total(),
            "Strategy details complete, total profit {:.2}%",
            total_profit
        );

        Ok(StrategyDetails {
            total_profit,
            total_trades: summary.total_trades,
            failed_trades_summary: summary.failed_trades,
            segment_results,
            output_log: output.join("\n"),
        })
    }

    fn run_connected(
        &self,
        config: &StrategyConfig,
        segments: &[Segment],
        month_filter: Option<u32>,
    ) -> Result<Vec<SegmentRun>> {
        let mut carried: Option<(f64, u64)> = None;
        let mut runs = Vec::with_capacity(segments.len());

        for segment in segments {
            let run = self.run_tracked(config, *segment, month_filter, carried)?;
            carried = Some((run.result.final_cash, run.result.final_positions));
            runs.push(run);
        }

        Ok(runs)
    }

    fn run_tracked(
        &self,
        config: &StrategyConfig,
        segment: Segment,
        month_filter: Option<u32>,
        initial_ledger: Option<(f64, u64)>,
    ) -> Result<SegmentRun> {
        let run = self.run_segment(config, segment, month_filter, initial_ledger);
        if let Some(pb) = &self.progress {
            pb.inc(1);
        }
        run
    }

    /// Backtest one segment from a fresh state machine.
    ///
    /// `initial_ledger` replaces the configured cash and positions, used when
    /// segments are connected.
    pub fn run_segment(
        &self,
        config: &StrategyConfig,
        segment: Segment,
        month_filter: Option<u32>,
        initial_ledger: Option<(f64, u64)>,
    ) -> Result<SegmentRun> {
        config.validate()?;

        let (initial_cash, initial_positions) =
            initial_ledger.unwrap_or((config.initial_cash, config.initial_positions));

        let bars = self
            .provider
            .get_history(&self.symbol, segment.start, segment.end)?;
        if bars.is_empty() {
            return Err(BacktestError::EmptySegmentData {
                symbol: self.symbol.clone(),
                start: segment.start,
                end: segment.end,
            });
        }

        let mut log = vec![
            format!("=== {} backtest report ===", self.symbol),
            format!("Period: {}", segment),
        ];

        let bars = filter_bars_by_month(bars, month_filter);
        let Some(first) = bars.first() else {
            warn!(
                symbol = %self.symbol,
                "No bars for month {:?} in {}",
                month_filter,
                segment
            );
            log.push(format!("No data for month {:?} in this period", month_filter));
            log.push("Profit rate: 0.00%".to_string());
            return Ok(SegmentRun {
                result: SegmentResult::empty(segment, month_filter, initial_cash, initial_positions),
                log,
            });
        };

        let base_price = config.base_price.unwrap_or_else(|| first.mid_price());
        let mut config = config.clone();

        let moving_average = if config.ma_protection {
            self.moving_average_for(&config, segment)?
        } else {
            None
        };
        if let Some((_, ma)) = moving_average
            .as_ref()
            .and_then(|s| s.latest_on_or_before(first.date))
        {
            config.adjust_price_range_with_ma(first.close, ma);
        }

        let mut strategy = GridStrategy::new(config, base_price)?
            .with_reference_date(self.as_of)
            .with_initial_ledger(initial_cash, initial_positions)?;
        if let Some(series) = moving_average {
            strategy = strategy.with_moving_average(series);
        }

        info!(
            symbol = %self.symbol,
            segment = %segment,
            bars = bars.len(),
            base_price = format!("{:.3}", base_price),
            "Backtesting segment"
        );

        log.extend(parameter_lines(&strategy));
        for bar in &bars {
            log.extend(run_day(&mut strategy, bar));
        }

        let last_close = bars.last().map_or(first.close, |b| b.close);
        let profit_rate = strategy.profit_rate(last_close)?;
        let ledger = strategy.ledger();

        log.push("=== Result ===".to_string());
        log.push(format!("Final cash:         {:.2}", ledger.cash));
        log.push(format!("Final positions:    {}", ledger.positions));
        log.push(format!("Last close:         {:.3}", last_close));
        log.push(format!(
            "Total assets:       {:.2} (initial {:.2})",
            ledger.total_assets(last_close),
            strategy.initial_total_assets()
        ));
        log.push(format!("Profit rate:        {:.2}%", profit_rate));
        log.push(format!("Trades:             {}", strategy.trades().len()));
        for (reason, count) in strategy.failures().non_zero() {
            log.push(format!("  {}: {}", reason, count));
        }

        info!(
            symbol = %self.symbol,
            segment = %segment,
            trades = strategy.trades().len(),
            "Segment finished, profit {:.2}%",
            profit_rate
        );

        Ok(SegmentRun {
            result: SegmentResult {
                segment,
                month_filter,
                profit_rate,
                trades: strategy.trades().to_vec(),
                failed_trades: strategy.failures().clone(),
                base_price,
                initial_cash,
                initial_positions,
                final_cash: ledger.cash,
                final_positions: ledger.positions,
            },
            log,
        })
    }

    /// Injected series if any, else a simple moving average of closes with
    /// `2 * ma_period` calendar days of look-back before the segment.
    fn moving_average_for(
        &self,
        config: &StrategyConfig,
        segment: Segment,
    ) -> Result<Option<MovingAverageSeries>> {
        if let Some(series) = &self.moving_average {
            return Ok(Some(series.clone()));
        }

        let Some(period) = config.ma_period else {
            return Ok(None);
        };

        let lookback_start = segment
            .start
            .checked_sub_days(Days::new(2 * period as u64))
            .unwrap_or(segment.start);
        let history = self
            .provider
            .get_history(&self.symbol, lookback_start, segment.end)?;
        let series = MovingAverageSeries::from_bars(&history, period);

        debug!(
            symbol = %self.symbol,
            period,
            points = series.len(),
            "Computed moving average series"
        );
        Ok(Some(series))
    }
}

fn parameter_lines(strategy: &GridStrategy) -> Vec<String> {
    let config = strategy.config();
    vec![
        format!("Base price:         {:.3}", strategy.base_price()),
        format!(
            "Price range:        {:.3} - {:.3}",
            config.price_range.0, config.price_range.1
        ),
        format!("Up sell rate:       {:.2}%", config.up_sell_rate * 100.0),
        format!("Up callback rate:   {:.2}%", config.up_callback_rate * 100.0),
        format!("Down buy rate:      {:.2}%", config.down_buy_rate * 100.0),
        format!("Down rebound rate:  {:.2}%", config.down_rebound_rate * 100.0),
        format!("Shares per trade:   {}", config.shares_per_trade),
        format!(
            "Initial ledger:     cash {:.2}, positions {}",
            strategy.initial_cash(),
            strategy.initial_positions()
        ),
    ]
}

/// Feed one day's open, high, low and close, returning its report lines
fn run_day(strategy: &mut GridStrategy, bar: &PriceBar) -> Vec<String> {
    let mut lines = vec![
        format!("=== {} ===", bar.date),
        format!(
            "Open {:.3}  High {:.3}  Low {:.3}  Close {:.3}",
            bar.open, bar.high, bar.low, bar.close
        ),
    ];

    for (price, point) in bar.price_points() {
        let before = strategy.trades().len();
        let evaluation = strategy.evaluate_price_point(price, bar.date);
        if evaluation.traded() {
            debug!(
                date = %bar.date,
                point = %point,
                price = format!("{:.3}", price),
                sells = evaluation.sells,
                buys = evaluation.buys,
                "Price point traded"
            );
            for trade in &strategy.trades()[before..] {
                lines.push(format!(
                    "  [{}] {} {} @ {:.3} = {:.2}",
                    point, trade.action, trade.shares, trade.price, trade.amount
                ));
            }
        }
    }

    let ledger = strategy.ledger();
    lines.push(format!(
        "End of day: cash {:.2}, positions {}, assets {:.2}",
        ledger.cash,
        ledger.positions,
        ledger.total_assets(bar.close)
    ));
    lines
}
