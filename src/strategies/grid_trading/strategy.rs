//! Grid Strategy State Machine
//!
//! ## How it works:
//! 1. Sell trigger = last up-reference * (1 + up_sell_rate). Once reached, the
//!    sell executes at the confirmed pullback price trigger * (1 - up_callback_rate).
//! 2. Buy trigger = last down-reference * (1 - down_buy_rate). Once reached, the
//!    buy executes at the confirmed rebound price trigger * (1 + down_rebound_rate).
//! 3. With `multiple_trade`, a gap of several rate steps past the trigger
//!    trades one lot per step.
//! 4. Executed trades re-anchor the references (see [`RATCHET_RULES`]).
//!
//! The machine has no explicit state enum: its state is the ratchet pair plus
//! the ledger.
//!
//! [`RATCHET_RULES`]: super::RATCHET_RULES

use chrono::{Local, NaiveDate};

use super::ledger::LedgerState;
use crate::config::StrategyConfig;
use crate::data::parse_date;
use crate::error::{BacktestError, Result};
use crate::indicators::MovingAverageSeries;
use crate::{FailureCounters, FailureReason, TradeAction, TradeRecord};

/// Result of a single buy or sell attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeOutcome {
    /// Ledger updated and a trade record appended
    Executed,
    /// Hard rejection, counted in the failure counters
    Rejected(FailureReason),
    /// Moving-average protection declined the trade; not a failure
    Filtered,
    /// Date lies after the reference date; ignored
    FutureDate,
}

impl TradeOutcome {
    pub fn is_executed(&self) -> bool {
        matches!(self, TradeOutcome::Executed)
    }
}

/// Trades executed by one `evaluate_price_point` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Evaluation {
    pub sells: u64,
    pub buys: u64,
}

impl Evaluation {
    pub fn traded(&self) -> bool {
        self.sells > 0 || self.buys > 0
    }
}

pub struct GridStrategy {
    config: StrategyConfig,
    base_price: f64,
    initial_cash: f64,
    initial_positions: u64,
    ledger: LedgerState,
    trades: Vec<TradeRecord>,
    failures: FailureCounters,
    moving_average: Option<MovingAverageSeries>,
    /// Dates after this one are treated as future data
    as_of: NaiveDate,
}

impl GridStrategy {
    /// Create a strategy with the configured initial ledger.
    ///
    /// Fails with `InvalidConfig` before any simulation if the parameters are
    /// unusable.
    pub fn new(config: StrategyConfig, base_price: f64) -> Result<Self> {
        config.validate()?;
        if !(base_price > 0.0) {
            return Err(BacktestError::InvalidConfig(format!(
                "base price must be positive, got {}",
                base_price
            )));
        }

        let initial_cash = config.initial_cash;
        let initial_positions = config.initial_positions;

        Ok(Self {
            ledger: LedgerState::new(initial_cash, initial_positions, base_price),
            config,
            base_price,
            initial_cash,
            initial_positions,
            trades: Vec::new(),
            failures: FailureCounters::new(),
            moving_average: None,
            as_of: Local::now().date_naive(),
        })
    }

    /// Start from a carried-over ledger instead of the configured one
    pub fn with_initial_ledger(mut self, cash: f64, positions: u64) -> Result<Self> {
        if !(cash >= 0.0) {
            return Err(BacktestError::InvalidConfig(format!(
                "initial cash must be non-negative, got {}",
                cash
            )));
        }
        if positions % self.config.shares_per_trade != 0 {
            return Err(BacktestError::InvalidConfig(format!(
                "initial positions {} must be a whole number of {}-share lots",
                positions, self.config.shares_per_trade
            )));
        }
        self.initial_cash = cash;
        self.initial_positions = positions;
        self.reset();
        Ok(self)
    }

    /// Attach the date-indexed series used by moving-average protection
    pub fn with_moving_average(mut self, series: MovingAverageSeries) -> Self {
        self.moving_average = Some(series);
        self
    }

    /// Override the date after which price points count as future data
    pub fn with_reference_date(mut self, as_of: NaiveDate) -> Self {
        self.as_of = as_of;
        self
    }

    /// Restore the initial ledger and ratchets, clearing trades and failures
    pub fn reset(&mut self) {
        self.ledger = LedgerState::new(self.initial_cash, self.initial_positions, self.base_price);
        self.trades.clear();
        self.failures = FailureCounters::new();
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn base_price(&self) -> f64 {
        self.base_price
    }

    pub fn ledger(&self) -> &LedgerState {
        &self.ledger
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn failures(&self) -> &FailureCounters {
        &self.failures
    }

    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    pub fn initial_positions(&self) -> u64 {
        self.initial_positions
    }

    pub fn sell_trigger(&self) -> f64 {
        self.ledger.last_trigger_price_up * (1.0 + self.config.up_sell_rate)
    }

    pub fn buy_trigger(&self) -> f64 {
        self.ledger.last_trigger_price_down * (1.0 - self.config.down_buy_rate)
    }

    /// Initial cash plus initial positions valued at the base price
    pub fn initial_total_assets(&self) -> f64 {
        self.initial_cash + self.initial_positions as f64 * self.base_price
    }

    /// Profit in percent of the initial assets, marking positions at `last_price`
    pub fn profit_rate(&self, last_price: f64) -> Result<f64> {
        let initial_total = self.initial_total_assets();
        if !(initial_total > 0.0) {
            return Err(BacktestError::InvalidConfig(
                "initial total assets must be positive to compute a profit rate".to_string(),
            ));
        }
        let final_assets = self.ledger.total_assets(last_price);
        Ok((final_assets - initial_total) / initial_total * 100.0)
    }

    /// Buy one lot at `price` on `date` (YYYY-MM-DD)
    pub fn buy(&mut self, price: f64, date: &str) -> Result<TradeOutcome> {
        let date = parse_date(date)?;
        Ok(self.buy_on(price, date))
    }

    /// Sell one lot at `price` on `date` (YYYY-MM-DD)
    pub fn sell(&mut self, price: f64, date: &str) -> Result<TradeOutcome> {
        let date = parse_date(date)?;
        Ok(self.sell_on(price, date))
    }

    pub fn buy_on(&mut self, price: f64, date: NaiveDate) -> TradeOutcome {
        if date > self.as_of {
            tracing::debug!(date = %date, "Cannot trade on a future date");
            return TradeOutcome::FutureDate;
        }

        if let Some(ma) = self.ma_for(date) {
            if price < ma {
                tracing::debug!(
                    price = format!("{:.3}", price),
                    ma = format!("{:.3}", ma),
                    "MA protection: buy price below moving average"
                );
                return TradeOutcome::Filtered;
            }
        }

        if !self.in_price_range(price) {
            return self.reject(FailureReason::BuyPriceOutOfRange, TradeAction::Buy, price);
        }

        let shares = self.config.shares_per_trade;
        let amount = price * shares as f64;
        if self.ledger.cash < amount {
            return self.reject(FailureReason::InsufficientCash, TradeAction::Buy, price);
        }

        self.ledger.positions += shares;
        self.ledger.cash -= amount;
        self.record(date, TradeAction::Buy, price, shares, amount);
        TradeOutcome::Executed
    }

    pub fn sell_on(&mut self, price: f64, date: NaiveDate) -> TradeOutcome {
        if date > self.as_of {
            tracing::debug!(date = %date, "Cannot trade on a future date");
            return TradeOutcome::FutureDate;
        }

        if let Some(ma) = self.ma_for(date) {
            if price > ma {
                tracing::debug!(
                    price = format!("{:.3}", price),
                    ma = format!("{:.3}", ma),
                    "MA protection: sell price above moving average"
                );
                return TradeOutcome::Filtered;
            }
        }

        if !self.in_price_range(price) {
            return self.reject(FailureReason::SellPriceOutOfRange, TradeAction::Sell, price);
        }

        let shares = self.config.shares_per_trade;
        if self.ledger.positions < shares {
            return self.reject(FailureReason::NoPosition, TradeAction::Sell, price);
        }

        let amount = price * shares as f64;
        self.ledger.positions -= shares;
        self.ledger.cash += amount;
        self.record(date, TradeAction::Sell, price, shares, amount);
        TradeOutcome::Executed
    }

    /// Feed one observed price through the sell sequence, then the buy sequence.
    ///
    /// Selling first keeps shares bought on this tick out of this tick's sells.
    pub fn evaluate_price_point(&mut self, price: f64, date: NaiveDate) -> Evaluation {
        let sells = self.run_sell_sequence(price, date);
        let buys = self.run_buy_sequence(price, date);
        Evaluation { sells, buys }
    }

    fn run_sell_sequence(&mut self, price: f64, date: NaiveDate) -> u64 {
        let trigger = self.sell_trigger();
        if price < trigger {
            return 0;
        }

        let lots = self.ledger.lots(self.config.shares_per_trade);
        if lots == 0 {
            // Once per evaluation, however many lots the move would have traded
            self.failures.record(FailureReason::NoPosition);
            tracing::debug!(
                price = format!("{:.3}", price),
                trigger = format!("{:.3}", trigger),
                "Sell triggered with no position"
            );
            return 0;
        }

        let rate = self.config.up_sell_rate;
        let multiple = self.lot_multiple((price - trigger) / trigger / rate).min(lots);

        let execute_price = trigger * (1.0 - self.config.up_callback_rate);
        if execute_price > price {
            self.failures.record(FailureReason::SellPriceOutOfRange);
            return 0;
        }

        let mut executed = 0;
        for _ in 0..multiple {
            if self.sell_on(execute_price, date).is_executed() {
                self.ledger.ratchet(TradeAction::Sell, execute_price);
                executed += 1;
            }
        }

        if executed > 0 {
            tracing::debug!(
                date = %date,
                trigger = format!("{:.3}", trigger),
                execute_price = format!("{:.3}", execute_price),
                lots = executed,
                positions = self.ledger.positions,
                "Grid SELL triggered"
            );
        }
        executed
    }

    fn run_buy_sequence(&mut self, price: f64, date: NaiveDate) -> u64 {
        let trigger = self.buy_trigger();
        if price > trigger {
            return 0;
        }

        let rate = self.config.down_buy_rate;
        let multiple = self.lot_multiple((trigger - price) / trigger / rate);

        let execute_price = trigger * (1.0 + self.config.down_rebound_rate);
        let required_cash = execute_price * self.config.shares_per_trade as f64 * multiple as f64;

        if self.ledger.cash < required_cash || price > execute_price {
            self.failures.record(FailureReason::InsufficientCash);
            tracing::debug!(
                required = format!("{:.2}", required_cash),
                cash = format!("{:.2}", self.ledger.cash),
                "Buy triggered without enough cash"
            );
            return 0;
        }

        let mut executed = 0;
        for _ in 0..multiple {
            if self.buy_on(execute_price, date).is_executed() {
                self.ledger.ratchet(TradeAction::Buy, execute_price);
                executed += 1;
            }
        }

        if executed > 0 {
            tracing::debug!(
                date = %date,
                trigger = format!("{:.3}", trigger),
                execute_price = format!("{:.3}", execute_price),
                lots = executed,
                positions = self.ledger.positions,
                "Grid BUY triggered"
            );
        }
        executed
    }

    /// Number of lots for a gap measured in rate steps
    fn lot_multiple(&self, steps: f64) -> u64 {
        if !self.config.multiple_trade || !steps.is_finite() || steps < 0.0 {
            return 1;
        }
        (steps.floor() as u64).saturating_add(1)
    }

    fn in_price_range(&self, price: f64) -> bool {
        let (min, max) = self.config.price_range;
        min <= price && price <= max
    }

    fn ma_for(&self, date: NaiveDate) -> Option<f64> {
        if !self.config.ma_protection {
            return None;
        }
        self.moving_average.as_ref()?.get(date)
    }

    fn reject(&mut self, reason: FailureReason, action: TradeAction, price: f64) -> TradeOutcome {
        self.failures.record(reason);
        tracing::debug!(
            action = %action,
            price = format!("{:.3}", price),
            cash = format!("{:.2}", self.ledger.cash),
            positions = self.ledger.positions,
            reason = %reason,
            "Trade rejected"
        );
        TradeOutcome::Rejected(reason)
    }

    fn record(&mut self, date: NaiveDate, action: TradeAction, price: f64, shares: u64, amount: f64) {
        self.trades.push(TradeRecord {
            date,
            action,
            price,
            shares,
            amount,
        });
    }
}
