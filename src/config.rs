//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files, with environment
//! variable overrides for data locations.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::BacktestError;
use crate::stats::ProfitCalcMethod;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        config.apply_env_overrides();

        Ok(config)
    }

    /// Override data locations from the environment (`.env` is loaded by the binary)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(data_dir) = std::env::var("GRID_DATA_DIR") {
            self.backtest.data_dir = data_dir;
        }
        if let Ok(calendar_file) = std::env::var("GRID_CALENDAR_FILE") {
            self.backtest.calendar_file = Some(calendar_file);
        }
    }
}

/// Grid strategy parameters, immutable for the duration of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Reference price for both trigger ratchets. When absent, each segment
    /// uses the open/close midpoint of its first bar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_price: Option<f64>,

    /// Hard trading bounds (min, max)
    #[serde(default = "default_price_range")]
    pub price_range: (f64, f64),

    #[serde(default = "default_up_sell_rate")]
    pub up_sell_rate: f64,

    #[serde(default = "default_up_callback_rate")]
    pub up_callback_rate: f64,

    #[serde(default = "default_down_buy_rate")]
    pub down_buy_rate: f64,

    #[serde(default = "default_down_rebound_rate")]
    pub down_rebound_rate: f64,

    /// Lot size
    #[serde(default = "default_shares_per_trade")]
    pub shares_per_trade: u64,

    #[serde(default = "default_initial_cash")]
    pub initial_cash: f64,

    #[serde(default = "default_initial_positions")]
    pub initial_positions: u64,

    /// Allow one price move to trade several lots at once
    #[serde(default = "default_true")]
    pub multiple_trade: bool,

    #[serde(default)]
    pub ma_protection: bool,

    /// Moving average window used to build the protection series
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ma_period: Option<usize>,
}

fn default_price_range() -> (f64, f64) {
    (0.910, 1.010)
}

fn default_up_sell_rate() -> f64 {
    0.0045
}

fn default_up_callback_rate() -> f64 {
    0.01
}

fn default_down_buy_rate() -> f64 {
    0.01
}

fn default_down_rebound_rate() -> f64 {
    0.004
}

fn default_shares_per_trade() -> u64 {
    50_000
}

fn default_initial_cash() -> f64 {
    50_000.0
}

fn default_initial_positions() -> u64 {
    50_000
}

fn default_true() -> bool {
    true
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            base_price: None,
            price_range: default_price_range(),
            up_sell_rate: default_up_sell_rate(),
            up_callback_rate: default_up_callback_rate(),
            down_buy_rate: default_down_buy_rate(),
            down_rebound_rate: default_down_rebound_rate(),
            shares_per_trade: default_shares_per_trade(),
            initial_cash: default_initial_cash(),
            initial_positions: default_initial_positions(),
            multiple_trade: true,
            ma_protection: false,
            ma_period: None,
        }
    }
}

impl StrategyConfig {
    /// Reject parameter sets that would make the simulation meaningless.
    /// Nothing is silently corrected.
    pub fn validate(&self) -> crate::Result<()> {
        if !(self.initial_cash >= 0.0) {
            return Err(BacktestError::InvalidConfig(format!(
                "initial cash must be non-negative, got {}",
                self.initial_cash
            )));
        }

        let (min, max) = self.price_range;
        if min > max {
            return Err(BacktestError::InvalidConfig(format!(
                "price range minimum {} is greater than maximum {}",
                min, max
            )));
        }
        if min <= 0.0 {
            return Err(BacktestError::InvalidConfig(format!(
                "price range must be positive, got ({}, {})",
                min, max
            )));
        }

        if self.shares_per_trade == 0 {
            return Err(BacktestError::InvalidConfig(
                "shares_per_trade must be greater than zero".to_string(),
            ));
        }

        if self.initial_positions % self.shares_per_trade != 0 {
            return Err(BacktestError::InvalidConfig(format!(
                "initial positions {} must be a whole number of {}-share lots",
                self.initial_positions, self.shares_per_trade
            )));
        }

        // Step rates divide the gap size when counting lots
        for (name, rate) in [
            ("up_sell_rate", self.up_sell_rate),
            ("down_buy_rate", self.down_buy_rate),
        ] {
            if !(rate > 0.0) {
                return Err(BacktestError::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, rate
                )));
            }
        }

        for (name, rate) in [
            ("up_callback_rate", self.up_callback_rate),
            ("down_rebound_rate", self.down_rebound_rate),
        ] {
            if !(0.0..1.0).contains(&rate) {
                return Err(BacktestError::InvalidConfig(format!(
                    "{} must be in [0, 1), got {}",
                    name, rate
                )));
            }
        }

        if let Some(base) = self.base_price {
            if !(base > 0.0) {
                return Err(BacktestError::InvalidConfig(format!(
                    "base price must be positive, got {}",
                    base
                )));
            }
        }

        if self.ma_period == Some(0) {
            return Err(BacktestError::InvalidConfig(
                "ma_period must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Narrow the price range around a moving average: above the average the
    /// average becomes the floor, otherwise it becomes the ceiling. The new
    /// range is kept only if it is still a valid positive range.
    /// Returns whether the range changed.
    pub fn adjust_price_range_with_ma(&mut self, close: f64, ma: f64) -> bool {
        let (min, max) = self.price_range;
        let candidate = if close > ma { (ma, max) } else { (min, ma) };

        if candidate.0 > 0.0 && candidate.1 > 0.0 && candidate.0 < candidate.1 {
            tracing::info!(
                close = format!("{:.3}", close),
                ma = format!("{:.3}", ma),
                "Price range adjusted to ({:.3}, {:.3})",
                candidate.0,
                candidate.1
            );
            self.price_range = candidate;
            true
        } else {
            tracing::warn!(
                "Keeping price range ({:.3}, {:.3}); MA-adjusted range ({:.3}, {:.3}) is invalid",
                min,
                max,
                candidate.0,
                candidate.1
            );
            false
        }
    }
}

/// Backtest run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// One trading date per line (YYYY-MM-DD); business days are used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_file: Option<String>,
    #[serde(default = "default_results_dir")]
    pub results_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    /// Only evaluate bars from this calendar month (1-12)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month_filter: Option<u32>,
    #[serde(default)]
    pub enable_segments: bool,
    #[serde(default = "default_min_buy_times")]
    pub min_buy_times: u32,
    #[serde(default)]
    pub profit_calc_method: ProfitCalcMethod,
    /// Carry cash and positions from one segment into the next
    #[serde(default)]
    pub connect_segments: bool,
    #[serde(default)]
    pub parallel_segments: bool,
}

fn default_symbol() -> String {
    "560610".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_results_dir() -> String {
    "results".to_string()
}

fn default_min_buy_times() -> u32 {
    2
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            symbol: default_symbol(),
            data_dir: default_data_dir(),
            calendar_file: None,
            results_dir: default_results_dir(),
            start_date: None,
            end_date: None,
            month_filter: None,
            enable_segments: false,
            min_buy_times: default_min_buy_times(),
            profit_calc_method: ProfitCalcMethod::default(),
            connect_segments: false,
            parallel_segments: false,
        }
    }
}
