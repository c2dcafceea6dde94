//! Data loading and management
//!
//! Historical daily bars come from an injectable [`PriceSeriesProvider`]. The
//! CSV provider reads `{data_dir}/{symbol}.csv` files; the in-memory provider
//! serves fixtures and pre-fetched data. Also home to date parsing, the month
//! filter and trade-ledger export.

use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{info, warn};

use crate::error::{BacktestError, Result};
use crate::{PriceBar, TradeRecord};

/// Source of historical daily bars
pub trait PriceSeriesProvider: Send + Sync {
    /// Bars for `symbol` in `[start, end]`, ascending by date, one per trading day.
    /// An empty result is not an error here; the driver decides what it means.
    fn get_history(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PriceBar>>;
}

// =============================================================================
// Date Parsing
// =============================================================================

/// Parse a trade date (YYYY-MM-DD, or YYYY-MM-DD HH:MM:SS keeping the date)
pub fn parse_date(date_str: &str) -> Result<NaiveDate> {
    let s = date_str.trim();

    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d);
    }

    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(ndt.date());
    }

    Err(BacktestError::InvalidDate(date_str.to_string()))
}

// =============================================================================
// Filters
// =============================================================================

/// Keep bars with dates in `[start, end]`
pub fn filter_bars_by_date(bars: Vec<PriceBar>, start: NaiveDate, end: NaiveDate) -> Vec<PriceBar> {
    bars.into_iter()
        .filter(|b| b.date >= start && b.date <= end)
        .collect()
}

/// Keep bars from one calendar month (1-12). Other values leave the bars untouched.
pub fn filter_bars_by_month(bars: Vec<PriceBar>, month: Option<u32>) -> Vec<PriceBar> {
    match month {
        Some(m) if (1..=12).contains(&m) => bars.into_iter().filter(|b| b.date.month() == m).collect(),
        Some(m) => {
            warn!("Ignoring month filter {}, expected 1-12", m);
            bars
        }
        None => bars,
    }
}

// =============================================================================
// CSV Data Loading
// =============================================================================

/// Load daily bars from a CSV file (`date,open,high,low,close[,volume]`).
///
/// Rows failing bar validation are skipped with a warning.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<PriceBar>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;

    let mut bars = Vec::new();
    let mut invalid_count = 0;

    for (row_idx, result) in reader.records().enumerate() {
        let record = result?;

        let date = parse_date(field(&record, 0, "date", row_idx)?)?;
        let open = parse_price(&record, 1, "open", row_idx)?;
        let high = parse_price(&record, 2, "high", row_idx)?;
        let low = parse_price(&record, 3, "low", row_idx)?;
        let close = parse_price(&record, 4, "close", row_idx)?;
        let volume = match record.get(5).map(str::trim) {
            Some(v) if !v.is_empty() => parse_price(&record, 5, "volume", row_idx)?,
            _ => 0.0,
        };

        match PriceBar::new(date, open, high, low, close, volume) {
            Ok(bar) => bars.push(bar),
            Err(e) => {
                invalid_count += 1;
                warn!(
                    "Skipping invalid bar at row {} in {:?}: {}",
                    row_idx + 2, // +2 for 1-indexed and header row
                    path.file_name().unwrap_or_default(),
                    e
                );
            }
        }
    }

    if invalid_count > 0 {
        warn!(
            "Skipped {} invalid bars out of {} in {:?}",
            invalid_count,
            invalid_count + bars.len(),
            path.file_name().unwrap_or_default()
        );
    }

    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);

    Ok(bars)
}

fn field<'a>(record: &'a csv::StringRecord, idx: usize, name: &str, row_idx: usize) -> Result<&'a str> {
    record.get(idx).map(str::trim).ok_or_else(|| {
        BacktestError::DataSource(format!("missing {} column at row {}", name, row_idx + 2))
    })
}

fn parse_price(record: &csv::StringRecord, idx: usize, name: &str, row_idx: usize) -> Result<f64> {
    let raw = field(record, idx, name, row_idx)?;
    raw.parse::<f64>().map_err(|_| {
        BacktestError::DataSource(format!(
            "failed to parse {} '{}' at row {}",
            name,
            raw,
            row_idx + 2
        ))
    })
}

/// Reads `{data_dir}/{symbol}.csv`, caching each file after the first load
#[derive(Debug)]
pub struct CsvPriceProvider {
    data_dir: PathBuf,
    cache: RwLock<HashMap<String, Vec<PriceBar>>>,
}

impl CsvPriceProvider {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.data_dir.join(format!("{}.csv", symbol))
    }

    fn load_symbol(&self, symbol: &str) -> Result<Vec<PriceBar>> {
        {
            let cache = self
                .cache
                .read()
                .map_err(|_| BacktestError::DataSource("price cache lock poisoned".to_string()))?;
            if let Some(bars) = cache.get(symbol) {
                return Ok(bars.clone());
            }
        }

        let path = self.path_for(symbol);
        if !path.exists() {
            return Err(BacktestError::DataSource(format!(
                "data file not found: {}",
                path.display()
            )));
        }

        let bars = load_csv(&path)?;
        info!("Loaded {} bars for {} from {}", bars.len(), symbol, path.display());

        let mut cache = self
            .cache
            .write()
            .map_err(|_| BacktestError::DataSource("price cache lock poisoned".to_string()))?;
        cache.insert(symbol.to_string(), bars.clone());
        Ok(bars)
    }
}

impl PriceSeriesProvider for CsvPriceProvider {
    fn get_history(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PriceBar>> {
        let bars = self.load_symbol(symbol)?;
        Ok(filter_bars_by_date(bars, start, end))
    }
}

/// Provider over bars already held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryPriceProvider {
    series: HashMap<String, Vec<PriceBar>>,
}

impl InMemoryPriceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, symbol: impl Into<String>, mut bars: Vec<PriceBar>) -> Self {
        bars.sort_by_key(|b| b.date);
        self.series.insert(symbol.into(), bars);
        self
    }
}

impl PriceSeriesProvider for InMemoryPriceProvider {
    fn get_history(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PriceBar>> {
        Ok(self
            .series
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start && b.date <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

// =============================================================================
// Trade Ledger Export
// =============================================================================

/// Write executed trades as `date,action,price,shares,amount`
pub fn write_trades_csv(path: impl AsRef<Path>, trades: &[TradeRecord]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    for trade in trades {
        writer.serialize(trade)?;
    }
    writer.flush()?;

    info!("Wrote {} trades to {}", trades.len(), path.display());
    Ok(())
}

/// Read a trade ledger written by [`write_trades_csv`]
pub fn read_trades_csv(path: impl AsRef<Path>) -> Result<Vec<TradeRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut trades = Vec::new();
    for record in reader.deserialize() {
        trades.push(record?);
    }
    Ok(trades)
}
