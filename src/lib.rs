//! Grid Trading Backtester
//!
//! Simulates a grid trading strategy for a single ETF or stock against
//! historical daily bars and reports profit rates, trade counts and failure
//! statistics.
//!
//! - [`strategies::grid_trading`]: the grid state machine (trigger and
//!   execution prices, ledger, ratchets, failure taxonomy)
//! - [`segments`]: splits a date range into trading-calendar aligned segments
//! - [`backtest`]: feeds each day's open, high, low and close through the
//!   state machine, segment by segment
//! - [`stats`]: combines per-segment results with a mean or median policy
//!
//! Price data and trading calendars are injected through the
//! [`data::PriceSeriesProvider`] and [`calendar::TradingCalendar`] traits.
//!
//! ## Example
//! ```no_run
//! use grid_backtest::backtest::Backtester;
//! use grid_backtest::data::CsvPriceProvider;
//! use grid_backtest::config::StrategyConfig;
//! use chrono::NaiveDate;
//!
//! fn main() -> anyhow::Result<()> {
//!     let provider = CsvPriceProvider::new("data");
//!     let backtester = Backtester::new(&provider, "560610");
//!     let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
//!     let end = NaiveDate::from_ymd_opt(2024, 6, 28).unwrap();
//!     let segments = backtester.plan_segments(start, end, 2);
//!     let details = backtester.run_strategy_details(
//!         &StrategyConfig::default(),
//!         start,
//!         end,
//!         Some(&segments),
//!         None,
//!     )?;
//!     println!("Total trades: {}", details.total_trades);
//!     Ok(())
//! }
//! ```

pub mod backtest;
pub mod calendar;
pub mod config;
pub mod data;
pub mod error;
pub mod indicators;
pub mod segments;
pub mod stats;
pub mod strategies;
pub mod types;

pub use config::Config;
pub use error::{BacktestError, Result};
pub use strategies::{GridStrategy, TradeOutcome};
pub use types::*;
