//! Integration tests for the grid backtester
//!
//! These tests drive the public API end to end with in-memory providers.

use approx::assert_relative_eq;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use proptest::prelude::*;

use grid_backtest::backtest::Backtester;
use grid_backtest::calendar::{BusinessDayCalendar, StaticCalendar, TradingCalendar};
use grid_backtest::config::StrategyConfig;
use grid_backtest::data::{self, InMemoryPriceProvider};
use grid_backtest::segments::build_segments;
use grid_backtest::stats::{aggregate, format_summary, ProfitCalcMethod};
use grid_backtest::{
    BacktestError, FailureReason, GridStrategy, PriceBar, Segment, TradeAction, TradeOutcome,
};

// =============================================================================
// Test Utilities
// =============================================================================

const SYMBOL: &str = "560610";

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn far_future() -> NaiveDate {
    date("2099-12-31")
}

fn scenario_config() -> StrategyConfig {
    StrategyConfig {
        base_price: Some(4.0),
        price_range: (3.9, 4.3),
        up_sell_rate: 0.01,
        up_callback_rate: 0.003,
        down_buy_rate: 0.01,
        down_rebound_rate: 0.003,
        shares_per_trade: 1000,
        initial_cash: 100_000.0,
        initial_positions: 5000,
        multiple_trade: true,
        ma_protection: false,
        ma_period: None,
    }
}

/// Generate weekday bars oscillating around `base_price`
fn generate_mock_bars(start: NaiveDate, count: usize, base_price: f64, amplitude: f64) -> Vec<PriceBar> {
    let mut bars = Vec::with_capacity(count);
    let mut day = start;

    while bars.len() < count {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            let i = bars.len();
            // Period-6 zig-zag
            let phase = [0.0, 0.6, 1.0, 0.4, -0.5, -1.0][i % 6];
            let mid = base_price + amplitude * phase;
            let open = mid - amplitude * 0.2;
            let close = mid + amplitude * 0.1;
            let high = open.max(close) + amplitude * 0.5;
            let low = open.min(close) - amplitude * 0.5;
            bars.push(PriceBar::new(day, open, high, low, close, 10_000.0 + i as f64).unwrap());
        }
        day += Duration::days(1);
    }

    bars
}

fn mock_provider(bars: Vec<PriceBar>) -> InMemoryPriceProvider {
    InMemoryPriceProvider::new().with_series(SYMBOL, bars)
}

// =============================================================================
// State Machine Scenarios
// =============================================================================

#[test]
fn test_sell_after_rally_confirms_pullback() {
    let mut strategy = GridStrategy::new(scenario_config(), 4.0)
        .unwrap()
        .with_reference_date(far_future());

    let eval = strategy.evaluate_price_point(4.05, date("2024-06-03"));
    assert_eq!(eval.sells, 1);
    assert_eq!(eval.buys, 0);

    let trade = &strategy.trades()[0];
    assert_eq!(trade.action, TradeAction::Sell);
    assert_eq!(trade.shares, 1000);
    assert_relative_eq!(trade.price, 4.04 * 0.997, epsilon = 1e-12);
    assert_eq!(strategy.ledger().positions, 4000);
    assert_relative_eq!(strategy.ledger().last_trigger_price_up, 4.04 * 0.997, epsilon = 1e-12);
    assert_relative_eq!(strategy.ledger().last_trigger_price_down, 4.04 * 0.997, epsilon = 1e-12);
}

#[test]
fn test_buy_without_cash_is_counted() {
    let mut config = scenario_config();
    config.initial_cash = 0.0;
    let mut strategy = GridStrategy::new(config, 4.0).unwrap();

    let outcome = strategy.buy(4.0, "2024-06-03").unwrap();
    assert_eq!(outcome, TradeOutcome::Rejected(FailureReason::InsufficientCash));
    assert_eq!(strategy.failures()[FailureReason::InsufficientCash], 1);
    assert_eq!(strategy.ledger().positions, 5000);
}

#[test]
fn test_sell_without_position_is_counted() {
    let mut config = scenario_config();
    config.initial_positions = 0;
    let mut strategy = GridStrategy::new(config, 4.0).unwrap();

    let outcome = strategy.sell(4.0, "2024-06-03").unwrap();
    assert_eq!(outcome, TradeOutcome::Rejected(FailureReason::NoPosition));
    assert_eq!(strategy.failures()[FailureReason::NoPosition], 1);
}

#[test]
fn test_future_date_is_ignored() {
    let mut strategy = GridStrategy::new(scenario_config(), 4.0).unwrap();
    let tomorrow = chrono::Local::now().date_naive() + Duration::days(1);
    let before = strategy.ledger().clone();

    let outcome = strategy.buy(4.0, &tomorrow.format("%Y-%m-%d").to_string()).unwrap();
    assert_eq!(outcome, TradeOutcome::FutureDate);
    assert_eq!(strategy.failures().total(), 0);
    assert_eq!(strategy.ledger(), &before);
}

#[test]
fn test_malformed_date_is_an_error() {
    let mut strategy = GridStrategy::new(scenario_config(), 4.0).unwrap();
    assert!(matches!(
        strategy.sell(4.0, "06/03/2024"),
        Err(BacktestError::InvalidDate(_))
    ));
    assert!(strategy.trades().is_empty());
}

// =============================================================================
// Backtest Driver
// =============================================================================

#[test]
fn test_segmented_run_end_to_end() {
    let bars = generate_mock_bars(date("2024-01-01"), 60, 4.0, 0.08);
    let start = bars[0].date;
    let end = bars[bars.len() - 1].date;
    let provider = mock_provider(bars.clone());
    let calendar = StaticCalendar::new(bars.iter().map(|b| b.date).collect());

    let backtester = Backtester::new(&provider, SYMBOL)
        .with_calendar(&calendar)
        .with_reference_date(far_future());

    // Batch 4 -> 10 trading days per segment
    let segments = backtester.plan_segments(start, end, 4);
    assert_eq!(segments.len(), 6);

    let details = backtester
        .run_strategy_details(&scenario_config(), start, end, Some(&segments), None)
        .unwrap();

    assert_eq!(details.segment_results.len(), 6);
    let summed_trades: usize = details.segment_results.iter().map(|r| r.trades.len()).sum();
    assert_eq!(details.total_trades, summed_trades);
    assert!(details.total_trades > 0);

    let summed_profit: f64 = details.segment_results.iter().map(|r| r.profit_rate).sum();
    assert_relative_eq!(details.total_profit, summed_profit, epsilon = 1e-9);

    // Each segment starts from the configured ledger
    for r in &details.segment_results {
        assert_eq!(r.initial_positions, 5000);
        assert_relative_eq!(r.initial_cash, 100_000.0);
        assert!(r.final_cash >= 0.0);
        assert_eq!(r.final_positions % 1000, 0);
    }

    let summary = details.summary(ProfitCalcMethod::Median);
    let lines = format_summary(&summary, &details.segment_results);
    assert!(lines.iter().any(|l| l.starts_with("Median profit rate:")));
    assert!(details.output_log.contains("Segment 6"));
}

#[test]
fn test_profit_rate_against_segment_initial_assets() {
    let bars = vec![
        PriceBar::new(date("2024-06-03"), 4.00, 4.05, 3.98, 4.02, 1.0).unwrap(),
        PriceBar::new(date("2024-06-04"), 4.02, 4.03, 3.95, 3.96, 1.0).unwrap(),
    ];
    let provider = mock_provider(bars);
    let backtester = Backtester::new(&provider, SYMBOL).with_reference_date(far_future());
    let config = scenario_config();

    let details = backtester
        .run_strategy_details(&config, date("2024-06-03"), date("2024-06-04"), None, None)
        .unwrap();
    let result = &details.segment_results[0];

    let initial_total = config.initial_cash + config.initial_positions as f64 * 4.0;
    let final_assets = result.final_cash + result.final_positions as f64 * 3.96;
    assert_relative_eq!(
        result.profit_rate,
        (final_assets - initial_total) / initial_total * 100.0,
        epsilon = 1e-9
    );

    let rate = backtester
        .run_backtest(&config, date("2024-06-03"), date("2024-06-04"), None)
        .unwrap();
    assert_relative_eq!(rate, result.profit_rate, epsilon = 1e-12);
}

#[test]
fn test_missing_window_propagates() {
    let provider = mock_provider(generate_mock_bars(date("2024-01-01"), 10, 4.0, 0.05));
    let backtester = Backtester::new(&provider, SYMBOL);
    let segments = [
        Segment::new(date("2024-01-01"), date("2024-01-05")),
        Segment::new(date("2025-01-01"), date("2025-01-31")),
    ];

    let err = backtester
        .run_strategy_details(
            &scenario_config(),
            date("2024-01-01"),
            date("2025-01-31"),
            Some(&segments),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, BacktestError::EmptySegmentData { .. }));
}

#[test]
fn test_month_filter_restricts_trading_days() {
    let bars = generate_mock_bars(date("2024-05-20"), 20, 4.0, 0.08);
    let provider = mock_provider(bars);
    let backtester = Backtester::new(&provider, SYMBOL).with_reference_date(far_future());

    let details = backtester
        .run_strategy_details(&scenario_config(), date("2024-05-20"), date("2024-06-30"), None, Some(6))
        .unwrap();
    for trade in &details.segment_results[0].trades {
        assert_eq!(trade.date.month(), 6);
    }

    let empty = backtester
        .run_backtest(&scenario_config(), date("2024-05-20"), date("2024-06-30"), Some(9))
        .unwrap();
    assert_eq!(empty, 0.0);
}

#[test]
fn test_moving_average_protection_blocks_counter_trend_sells() {
    let bars = vec![PriceBar::new(date("2024-06-03"), 4.0, 4.05, 4.0, 4.02, 1.0).unwrap()];
    let provider = mock_provider(bars);
    let mut config = scenario_config();
    config.ma_protection = true;

    // Average below every price: sells are filtered, not failed
    let backtester = Backtester::new(&provider, SYMBOL)
        .with_reference_date(far_future())
        .with_moving_average(grid_backtest::indicators::MovingAverageSeries::from_pairs([(
            date("2024-06-03"),
            3.95,
        )]));
    let run = backtester
        .run_segment(&config, Segment::new(date("2024-06-03"), date("2024-06-03")), None, None)
        .unwrap();

    assert!(run.result.trades.is_empty());
    assert_eq!(run.result.failed_trades.total(), 0);
}

#[test]
fn test_trade_ledger_export() {
    let bars = generate_mock_bars(date("2024-01-01"), 30, 4.0, 0.08);
    let provider = mock_provider(bars);
    let backtester = Backtester::new(&provider, SYMBOL).with_reference_date(far_future());
    let details = backtester
        .run_strategy_details(&scenario_config(), date("2024-01-01"), date("2024-02-15"), None, None)
        .unwrap();
    let trades = &details.segment_results[0].trades;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trades.csv");
    data::write_trades_csv(&path, trades).unwrap();
    assert_eq!(data::read_trades_csv(&path).unwrap().len(), trades.len());
}

// =============================================================================
// Statistics
// =============================================================================

#[test]
fn test_aggregate_mean_vs_median() {
    let bars = generate_mock_bars(date("2024-01-01"), 40, 4.0, 0.1);
    let provider = mock_provider(bars.clone());
    let calendar = StaticCalendar::new(bars.iter().map(|b| b.date).collect());
    let backtester = Backtester::new(&provider, SYMBOL)
        .with_calendar(&calendar)
        .with_reference_date(far_future());

    let start = bars[0].date;
    let end = bars[bars.len() - 1].date;
    let segments = backtester.plan_segments(start, end, 5);
    let details = backtester
        .run_strategy_details(&scenario_config(), start, end, Some(&segments), None)
        .unwrap();

    let mean = aggregate(&details.segment_results, ProfitCalcMethod::Mean);
    let expected = details.total_profit / details.segment_results.len() as f64;
    assert_relative_eq!(mean.profit_rate, expected, epsilon = 1e-9);

    let median = aggregate(&details.segment_results, ProfitCalcMethod::Median);
    assert_eq!(median.total_trades, mean.total_trades);
    assert_eq!(median.failed_trades, mean.failed_trades);
}

// =============================================================================
// Property Tests
// =============================================================================

fn weekday_count(start: NaiveDate, end: NaiveDate) -> usize {
    BusinessDayCalendar.trading_days(start, end).unwrap().len()
}

proptest! {
    #[test]
    fn prop_ledger_never_negative_and_conserved(
        prices in prop::collection::vec(3.6f64..4.4, 1..120),
        multiple_trade in any::<bool>(),
    ) {
        let mut config = scenario_config();
        config.multiple_trade = multiple_trade;
        config.price_range = (3.5, 4.5);
        let mut strategy = GridStrategy::new(config.clone(), 4.0)
            .unwrap()
            .with_reference_date(far_future());
        let day = date("2024-06-03");

        for price in prices {
            let ratchets = (
                strategy.ledger().last_trigger_price_up,
                strategy.ledger().last_trigger_price_down,
            );
            let eval = strategy.evaluate_price_point(price, day);

            prop_assert!(strategy.ledger().cash >= 0.0);
            prop_assert_eq!(strategy.ledger().positions % config.shares_per_trade, 0);

            if !eval.traded() {
                prop_assert_eq!(strategy.ledger().last_trigger_price_up, ratchets.0);
                prop_assert_eq!(strategy.ledger().last_trigger_price_down, ratchets.1);
            }
        }

        let mut cash = config.initial_cash;
        let mut positions = config.initial_positions as i64;
        for trade in strategy.trades() {
            prop_assert_eq!(trade.shares, config.shares_per_trade);
            prop_assert!((trade.amount - trade.price * trade.shares as f64).abs() < 1e-9);
            match trade.action {
                TradeAction::Buy => {
                    cash -= trade.amount;
                    positions += trade.shares as i64;
                }
                TradeAction::Sell => {
                    cash += trade.amount;
                    positions -= trade.shares as i64;
                }
            }
        }
        prop_assert!((cash - strategy.ledger().cash).abs() < 1e-6);
        prop_assert_eq!(positions, strategy.ledger().positions as i64);
    }

    #[test]
    fn prop_price_between_triggers_changes_nothing(offset in 0.0f64..1.0) {
        let mut strategy = GridStrategy::new(scenario_config(), 4.0)
            .unwrap()
            .with_reference_date(far_future());
        let low = strategy.buy_trigger();
        let high = strategy.sell_trigger();
        // Strictly inside (buy trigger, sell trigger)
        let price = low + (high - low) * (0.001 + offset * 0.998);
        let before = strategy.ledger().clone();

        let eval = strategy.evaluate_price_point(price, date("2024-06-03"));
        prop_assert!(!eval.traded());
        prop_assert_eq!(strategy.ledger(), &before);
        prop_assert_eq!(strategy.failures().total(), 0);
    }

    #[test]
    fn prop_segments_partition_trading_days(
        start_offset in 0i64..400,
        length in 0i64..400,
        batch in 0u32..9,
    ) {
        let start = date("2023-01-01") + Duration::days(start_offset);
        let end = start + Duration::days(length);
        let segments = build_segments(start, end, batch, None);

        let total = weekday_count(start, end);
        let covered: usize = segments.iter().map(|s| weekday_count(s.start, s.end)).sum();
        prop_assert_eq!(covered, total);

        for pair in segments.windows(2) {
            prop_assert!(pair[0].end < pair[1].start);
        }

        // Out-of-range batches clamp
        let clamped = build_segments(start, end, batch.clamp(1, 5), None);
        prop_assert_eq!(segments, clamped);
    }
}
