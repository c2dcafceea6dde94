//! Core data types used across the backtester

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Validation errors for daily price bars
#[derive(Debug, Error)]
pub enum BarValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: f64, low: f64, high: f64 },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// One trading day of OHLC data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl PriceBar {
    /// Create a new bar with validation
    pub fn new(
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, BarValidationError> {
        let bar = Self::new_unchecked(date, open, high, low, close, volume);
        bar.validate()?;
        Ok(bar)
    }

    /// Create a bar without validation (for trusted sources or test fixtures)
    pub fn new_unchecked(
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    pub fn validate(&self) -> Result<(), BarValidationError> {
        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(BarValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(BarValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.volume < 0.0 {
            return Err(BarValidationError::NegativeVolume(self.volume));
        }

        if self.open < self.low || self.open > self.high {
            return Err(BarValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }

        if self.close < self.low || self.close > self.high {
            return Err(BarValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }

    /// The four intraday samples in the fixed evaluation order: open, high, low, close
    pub fn price_points(&self) -> [(f64, PricePoint); 4] {
        [
            (self.open, PricePoint::Open),
            (self.high, PricePoint::High),
            (self.low, PricePoint::Low),
            (self.close, PricePoint::Close),
        ]
    }

    /// Midpoint of open and close, used as the default base price
    pub fn mid_price(&self) -> f64 {
        (self.open + self.close) / 2.0
    }
}

/// Which intraday sample of a bar is being evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricePoint {
    Open,
    High,
    Low,
    Close,
}

impl std::fmt::Display for PricePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PricePoint::Open => "open",
            PricePoint::High => "high",
            PricePoint::Low => "low",
            PricePoint::Close => "close",
        };
        write!(f, "{}", s)
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "buy"),
            TradeAction::Sell => write!(f, "sell"),
        }
    }
}

/// Executed lot, appended once per successful buy/sell and never mutated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub date: NaiveDate,
    pub action: TradeAction,
    pub price: f64,
    pub shares: u64,
    pub amount: f64,
}

/// Reasons a buy or sell attempt was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NoPosition,
    SellPriceOutOfRange,
    InsufficientCash,
    BuyPriceOutOfRange,
}

impl FailureReason {
    pub const ALL: [FailureReason; 4] = [
        FailureReason::NoPosition,
        FailureReason::SellPriceOutOfRange,
        FailureReason::InsufficientCash,
        FailureReason::BuyPriceOutOfRange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::NoPosition => "no_position",
            FailureReason::SellPriceOutOfRange => "sell_price_out_of_range",
            FailureReason::InsufficientCash => "insufficient_cash",
            FailureReason::BuyPriceOutOfRange => "buy_price_out_of_range",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-run count of rejected attempts, keyed by reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCounters(BTreeMap<FailureReason, u64>);

impl Default for FailureCounters {
    fn default() -> Self {
        Self(FailureReason::ALL.iter().map(|r| (*r, 0)).collect())
    }
}

impl FailureCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, reason: FailureReason) {
        *self.0.entry(reason).or_insert(0) += 1;
    }

    pub fn get(&self, reason: FailureReason) -> u64 {
        self.0.get(&reason).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    /// Add another set of counters into this one
    pub fn merge(&mut self, other: &FailureCounters) {
        for (reason, count) in other.iter() {
            *self.0.entry(reason).or_insert(0) += count;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (FailureReason, u64)> + '_ {
        self.0.iter().map(|(r, c)| (*r, *c))
    }

    /// Reasons with a non-zero count, in reason order
    pub fn non_zero(&self) -> impl Iterator<Item = (FailureReason, u64)> + '_ {
        self.iter().filter(|(_, c)| *c > 0)
    }
}

impl std::ops::Index<FailureReason> for FailureCounters {
    type Output = u64;

    fn index(&self, reason: FailureReason) -> &u64 {
        self.0.get(&reason).unwrap_or(&0)
    }
}

/// Inclusive date window evaluated with a fresh ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Segment {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to {}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}
