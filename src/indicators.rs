//! Moving averages powered by the `ta` crate
//!
//! Only what the moving-average protection filter needs: a simple moving
//! average over closes and a date-indexed view of it.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use ta::indicators::SimpleMovingAverage;
use ta::Next;

use crate::PriceBar;

/// Calculate Simple Moving Average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut indicator = match SimpleMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    let mut result = Vec::with_capacity(values.len());

    for (i, &value) in values.iter().enumerate() {
        let sma_val = indicator.next(value);
        if i + 1 >= period {
            result.push(Some(sma_val));
        } else {
            result.push(None);
        }
    }

    result
}

/// Moving-average value per trading date
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovingAverageSeries(BTreeMap<NaiveDate, f64>);

impl MovingAverageSeries {
    /// SMA of closing prices; dates inside the warm-up window have no value
    pub fn from_bars(bars: &[PriceBar], period: usize) -> Self {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let values = sma(&closes, period);

        Self(
            bars.iter()
                .zip(values)
                .filter_map(|(bar, ma)| ma.map(|v| (bar.date, v)))
                .collect(),
        )
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        Self(pairs.into_iter().collect())
    }

    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.0.get(&date).copied()
    }

    /// Latest value on or before `date`
    pub fn latest_on_or_before(&self, date: NaiveDate) -> Option<(NaiveDate, f64)> {
        self.0.range(..=date).next_back().map(|(d, v)| (*d, *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Duration;

    #[test]
    fn test_sma_warmup() {
        let values = vec![1.0, 2.0, 3.0, 4.0];
        let result = sma(&values, 3);
        assert_eq!(result.len(), 4);
        assert!(result[0].is_none());
        assert!(result[1].is_none());
        assert_relative_eq!(result[2].unwrap(), 2.0);
        assert_relative_eq!(result[3].unwrap(), 3.0);
    }

    #[test]
    fn test_sma_zero_period() {
        assert!(sma(&[1.0, 2.0], 0).is_empty());
    }

    #[test]
    fn test_series_from_bars() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let bars: Vec<PriceBar> = (0..5)
            .map(|i| {
                let p = 1.0 + i as f64 * 0.1;
                PriceBar::new_unchecked(start + Duration::days(i), p, p, p, p, 0.0)
            })
            .collect();

        let series = MovingAverageSeries::from_bars(&bars, 2);
        assert_eq!(series.len(), 4);
        assert!(series.get(start).is_none());
        assert_relative_eq!(series.get(start + Duration::days(1)).unwrap(), 1.05, epsilon = 1e-12);

        let (d, v) = series
            .latest_on_or_before(start + Duration::days(10))
            .unwrap();
        assert_eq!(d, start + Duration::days(4));
        assert_relative_eq!(v, 1.35, epsilon = 1e-12);
    }
}
