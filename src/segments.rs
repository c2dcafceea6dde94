//! Segmentation planner
//!
//! Splits a date range into consecutive windows of trading days. Strategies
//! expected to buy more often get shorter windows so each window yields a
//! comparable number of trades.

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::calendar::{BusinessDayCalendar, TradingCalendar};
use crate::Segment;

/// Trading days per segment, indexed by `min_buy_times` (1..=5)
pub const BATCH_TO_DAYS: [(u32, usize); 5] = [(1, 60), (2, 30), (3, 20), (4, 10), (5, 5)];

/// Clamp a batch parameter into 1..=5
pub fn normalize_batch(min_buy_times: u32) -> u32 {
    min_buy_times.clamp(1, 5)
}

/// Segment length in trading days for a batch parameter
pub fn segment_days(min_buy_times: u32) -> usize {
    let batch = normalize_batch(min_buy_times);
    BATCH_TO_DAYS
        .iter()
        .find(|(b, _)| *b == batch)
        .map(|(_, days)| *days)
        .unwrap_or(30)
}

/// Split `[start, end]` into segments aligned to trading days.
///
/// An inverted or single-day range comes back as one segment unchanged. When
/// the calendar is missing, fails or has no dates in range, business days are
/// used; if that is empty too, the whole range is one segment.
pub fn build_segments(
    start: NaiveDate,
    end: NaiveDate,
    min_buy_times: u32,
    calendar: Option<&dyn TradingCalendar>,
) -> Vec<Segment> {
    let days_per_segment = segment_days(min_buy_times);

    if start >= end {
        return vec![Segment::new(start, end)];
    }

    let trading_days = match resolve_trading_days(start, end, calendar) {
        Some(days) => days,
        None => return vec![Segment::new(start, end)],
    };

    let segments: Vec<Segment> = trading_days
        .chunks(days_per_segment)
        .filter_map(|chunk| Some(Segment::new(*chunk.first()?, *chunk.last()?)))
        .collect();

    debug!(
        start = %start,
        end = %end,
        trading_days = trading_days.len(),
        days_per_segment,
        segments = segments.len(),
        "Built segments"
    );

    segments
}

fn resolve_trading_days(
    start: NaiveDate,
    end: NaiveDate,
    calendar: Option<&dyn TradingCalendar>,
) -> Option<Vec<NaiveDate>> {
    if let Some(calendar) = calendar {
        match calendar.trading_days(start, end) {
            Ok(days) => {
                let days = clean_days(days, start, end);
                if !days.is_empty() {
                    return Some(days);
                }
                warn!("Trading calendar has no dates in {} to {}, using business days", start, end);
            }
            Err(e) => warn!("Failed to get trading calendar: {}, using business days", e),
        }
    }

    match BusinessDayCalendar.trading_days(start, end) {
        Ok(days) if !days.is_empty() => Some(days),
        _ => None,
    }
}

fn clean_days(mut days: Vec<NaiveDate>, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    days.retain(|d| *d >= start && *d <= end);
    days.sort();
    days.dedup();
    days
}
