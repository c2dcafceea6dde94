//! Error types for the backtesting core

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BacktestError {
    /// Bad strategy parameters, raised before any simulation starts
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A date that is not `YYYY-MM-DD`
    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    /// The price provider returned nothing for the requested window
    #[error("no price data for {symbol} between {start} and {end}")]
    EmptySegmentData {
        symbol: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("data source error: {0}")]
    DataSource(String),

    #[error("trading calendar unavailable: {0}")]
    Calendar(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BacktestError>;
