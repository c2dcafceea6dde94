//! Grid Trading Strategy
//!
//! Sells into rallies and buys into dips around a ratcheting reference price,
//! trading whole lots within a hard price range.

mod ledger;
mod strategy;

pub use ledger::{LedgerState, RatchetRule, RATCHET_RULES};
pub use strategy::{Evaluation, GridStrategy, TradeOutcome};
