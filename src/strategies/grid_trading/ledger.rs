//! Cash/position ledger and the trigger-price ratchets

use serde::{Deserialize, Serialize};

use crate::TradeAction;

/// Mutable state of one running grid strategy.
///
/// Cash and positions only change together inside a successful buy or sell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerState {
    pub cash: f64,
    pub positions: u64,
    /// Reference for the next sell trigger
    pub last_trigger_price_up: f64,
    /// Reference for the next buy trigger
    pub last_trigger_price_down: f64,
}

impl LedgerState {
    pub fn new(cash: f64, positions: u64, base_price: f64) -> Self {
        Self {
            cash,
            positions,
            last_trigger_price_up: base_price,
            last_trigger_price_down: base_price,
        }
    }

    /// Mark-to-market value at `price`
    pub fn total_assets(&self, price: f64) -> f64 {
        self.cash + self.positions as f64 * price
    }

    /// Whole lots available to sell
    pub fn lots(&self, shares_per_trade: u64) -> u64 {
        if shares_per_trade == 0 {
            0
        } else {
            self.positions / shares_per_trade
        }
    }

    /// Move the ratchets after an executed trade, following [`RATCHET_RULES`]
    pub(crate) fn ratchet(&mut self, action: TradeAction, execute_price: f64) {
        for rule in RATCHET_RULES.iter().filter(|r| r.action == action) {
            if rule.resets_up {
                self.last_trigger_price_up = execute_price;
            }
            if rule.resets_down {
                self.last_trigger_price_down = execute_price;
            }
        }
    }
}

/// Which ratchets an executed trade re-anchors
#[derive(Debug, Clone, Copy)]
pub struct RatchetRule {
    pub action: TradeAction,
    pub resets_up: bool,
    pub resets_down: bool,
}

/// A sell re-anchors both directions; a buy only moves the buy reference.
pub const RATCHET_RULES: [RatchetRule; 2] = [
    RatchetRule {
        action: TradeAction::Sell,
        resets_up: true,
        resets_down: true,
    },
    RatchetRule {
        action: TradeAction::Buy,
        resets_up: false,
        resets_down: true,
    },
];
