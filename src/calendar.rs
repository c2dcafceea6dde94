//! Trading calendar providers
//!
//! The segmentation planner asks a calendar for the valid trading dates in a
//! window. Real exchange calendars come from a file of dates; the business-day
//! calendar (Mon-Fri) is the fallback when no calendar can be used.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::data::parse_date;
use crate::error::{BacktestError, Result};

/// Source of valid trading dates
pub trait TradingCalendar: Send + Sync {
    /// Trading dates in `[start, end]`, ascending
    fn trading_days(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>>;
}

/// Monday to Friday, ignoring holidays
#[derive(Debug, Clone, Copy, Default)]
pub struct BusinessDayCalendar;

impl TradingCalendar for BusinessDayCalendar {
    fn trading_days(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>> {
        let mut days = Vec::new();
        let mut current = start;
        while current <= end {
            if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
                days.push(current);
            }
            current += Duration::days(1);
        }
        Ok(days)
    }
}

/// Calendar backed by a fixed list of dates
#[derive(Debug, Clone, Default)]
pub struct StaticCalendar {
    dates: Vec<NaiveDate>,
}

impl StaticCalendar {
    pub fn new(mut dates: Vec<NaiveDate>) -> Self {
        dates.sort();
        dates.dedup();
        Self { dates }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

impl TradingCalendar for StaticCalendar {
    fn trading_days(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>> {
        Ok(self
            .dates
            .iter()
            .copied()
            .filter(|d| *d >= start && *d <= end)
            .collect())
    }
}

/// Calendar read from a text/CSV file with one date per line (first column).
///
/// The file is read on every query so a missing file surfaces as an
/// unavailable calendar rather than a construction error.
#[derive(Debug, Clone)]
pub struct CsvCalendar {
    path: PathBuf,
}

impl CsvCalendar {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<StaticCalendar> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| {
                BacktestError::Calendar(format!("{}: {}", self.path.display(), e))
            })?;

        let mut dates = Vec::new();
        for record in reader.records() {
            let record = record?;
            let Some(field) = record.get(0).map(str::trim) else {
                continue;
            };
            if field.is_empty() {
                continue;
            }
            match parse_date(field) {
                Ok(d) => dates.push(d),
                // Header rows and comments
                Err(_) => warn!("Skipping calendar entry '{}' in {}", field, self.path.display()),
            }
        }

        Ok(StaticCalendar::new(dates))
    }
}

impl TradingCalendar for CsvCalendar {
    fn trading_days(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>> {
        self.load()?.trading_days(start, end)
    }
}
