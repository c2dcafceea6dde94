//! Statistics aggregation across backtest segments
//!
//! Each segment's profit rate is computed against its own segment-local
//! initial assets; the run-level figure combines those rates with the chosen
//! policy rather than pooling trades. Failure counters and trade counts are
//! summed.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median, Statistics};
use std::str::FromStr;

use crate::{FailureCounters, Segment, TradeRecord};

/// How per-segment profit rates are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfitCalcMethod {
    #[default]
    Mean,
    Median,
}

impl std::fmt::Display for ProfitCalcMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfitCalcMethod::Mean => write!(f, "mean"),
            ProfitCalcMethod::Median => write!(f, "median"),
        }
    }
}

impl FromStr for ProfitCalcMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(ProfitCalcMethod::Mean),
            "median" => Ok(ProfitCalcMethod::Median),
            other => Err(format!("unknown profit calc method '{}', expected mean or median", other)),
        }
    }
}

/// Outcome of one backtested segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentResult {
    pub segment: Segment,
    pub month_filter: Option<u32>,
    /// Percent, relative to the segment's own initial assets
    pub profit_rate: f64,
    pub trades: Vec<TradeRecord>,
    pub failed_trades: FailureCounters,
    pub base_price: f64,
    pub initial_cash: f64,
    pub initial_positions: u64,
    pub final_cash: f64,
    pub final_positions: u64,
}

impl SegmentResult {
    /// Result for a segment whose month filter left no bars
    pub fn empty(segment: Segment, month_filter: Option<u32>, cash: f64, positions: u64) -> Self {
        Self {
            segment,
            month_filter,
            profit_rate: 0.0,
            trades: Vec::new(),
            failed_trades: FailureCounters::new(),
            base_price: 0.0,
            initial_cash: cash,
            initial_positions: positions,
            final_cash: cash,
            final_positions: positions,
        }
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }
}

/// Run-level statistics over all segments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub segment_count: usize,
    pub method: ProfitCalcMethod,
    pub profit_rate: f64,
    pub total_trades: usize,
    pub failed_trades: FailureCounters,
}

/// Combine per-segment profit rates. An empty slice yields 0.
pub fn combine_profit_rates(rates: &[f64], method: ProfitCalcMethod) -> f64 {
    if rates.is_empty() {
        return 0.0;
    }

    match method {
        ProfitCalcMethod::Mean => rates.iter().mean(),
        ProfitCalcMethod::Median => Data::new(rates.to_vec()).median(),
    }
}

/// Sum failure counters across segments
pub fn sum_failures<'a>(counters: impl IntoIterator<Item = &'a FailureCounters>) -> FailureCounters {
    counters
        .into_iter()
        .fold(FailureCounters::new(), |mut acc, c| {
            acc.merge(c);
            acc
        })
}

pub fn aggregate(results: &[SegmentResult], method: ProfitCalcMethod) -> RunSummary {
    let rates: Vec<f64> = results.iter().map(|r| r.profit_rate).collect();

    RunSummary {
        segment_count: results.len(),
        method,
        profit_rate: combine_profit_rates(&rates, method),
        total_trades: results.iter().map(SegmentResult::trade_count).sum(),
        failed_trades: sum_failures(results.iter().map(|r| &r.failed_trades)),
    }
}

/// Report lines for a run summary.
///
/// The per-segment table is only emitted when there is more than one segment.
pub fn format_summary(summary: &RunSummary, results: &[SegmentResult]) -> Vec<String> {
    let mut lines = Vec::new();

    if results.len() > 1 {
        lines.push("=== Multi-segment summary ===".to_string());
        lines.push(format!("Segments:           {}", summary.segment_count));
        for (i, r) in results.iter().enumerate() {
            lines.push(format!(
                "  #{:<3} {}  profit {:>8.2}%  trades {}",
                i + 1,
                r.segment,
                r.profit_rate,
                r.trade_count()
            ));
        }
    }

    let label = match summary.method {
        ProfitCalcMethod::Mean => "Mean profit rate:",
        ProfitCalcMethod::Median => "Median profit rate:",
    };
    lines.push(format!("{:<20}{:.2}%", label, summary.profit_rate));
    lines.push(format!("{:<20}{}", "Total trades:", summary.total_trades));

    let failures = summary
        .failed_trades
        .non_zero()
        .map(|(reason, count)| format!("{}={}", reason, count))
        .join(", ");
    if failures.is_empty() {
        lines.push(format!("{:<20}none", "Failed trades:"));
    } else {
        lines.push(format!("{:<20}{}", "Failed trades:", failures));
    }

    lines
}
