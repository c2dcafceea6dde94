//! Trading strategies

pub mod grid_trading;

pub use grid_trading::{Evaluation, GridStrategy, LedgerState, TradeOutcome};
