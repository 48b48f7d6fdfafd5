//! Order lifecycle state machine.
//!
//! `NEW → WORKING → PARTIALLY_FILLED ⇄ … → FILLED`, or any non-terminal state
//! to `CANCELED` / `REJECTED`. Terminal orders never change again.
//!
//! State and filled quantity are private: the only way to mutate them is
//! through the transition methods, each of which bumps `version`.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{OrderId, SymbolId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    #[serde(rename = "MKT")]
    Market,
    #[serde(rename = "LMT")]
    Limit,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::Market => "MKT",
            OrderType::Limit => "LMT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    /// Works until the listing exchange closes.
    Day,
    /// Immediate-or-cancel: unfilled remainder is cancelled at cycle end.
    Ioc,
    /// Fill-or-kill: all or nothing within one cycle.
    Fok,
}

impl TimeInForce {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeInForce::Day => "DAY",
            TimeInForce::Ioc => "IOC",
            TimeInForce::Fok => "FOK",
        }
    }
}

/// Order lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    New,
    Working,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

impl OrderState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderState::Filled | OrderState::Canceled | OrderState::Rejected
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderState::New => "NEW",
            OrderState::Working => "WORKING",
            OrderState::PartiallyFilled => "PARTIALLY_FILLED",
            OrderState::Filled => "FILLED",
            OrderState::Canceled => "CANCELED",
            OrderState::Rejected => "REJECTED",
        }
    }
}

/// An order with full lifecycle tracking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol_id: SymbolId,
    pub side: OrderSide,
    pub quantity: u64,
    pub order_type: OrderType,
    pub tif: TimeInForce,
    pub limit_price: Option<f64>,
    /// Free-form strategy label; `cancel` accepts it in place of the id.
    pub tag: Option<String>,
    state: OrderState,
    filled_quantity: u64,
    version: u64,
}

impl Order {
    /// Create a new order in `New` state.
    pub fn new(
        id: OrderId,
        symbol_id: SymbolId,
        side: OrderSide,
        quantity: u64,
        order_type: OrderType,
        tif: TimeInForce,
        limit_price: Option<f64>,
    ) -> Self {
        Self {
            id,
            symbol_id,
            side,
            quantity,
            order_type,
            tif,
            limit_price,
            tag: None,
            state: OrderState::New,
            filled_quantity: 0,
            version: 0,
        }
    }

    pub fn market(id: OrderId, symbol_id: SymbolId, side: OrderSide, quantity: u64) -> Self {
        Self::new(id, symbol_id, side, quantity, OrderType::Market, TimeInForce::Day, None)
    }

    pub fn limit(
        id: OrderId,
        symbol_id: SymbolId,
        side: OrderSide,
        quantity: u64,
        limit_price: f64,
    ) -> Self {
        Self::new(
            id,
            symbol_id,
            side,
            quantity,
            OrderType::Limit,
            TimeInForce::Day,
            Some(limit_price),
        )
    }

    pub fn with_tif(mut self, tif: TimeInForce) -> Self {
        self.tif = tif;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn state(&self) -> OrderState {
        self.state
    }

    pub fn filled_quantity(&self) -> u64 {
        self.filled_quantity
    }

    /// Number of state mutations applied so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn remaining(&self) -> u64 {
        self.quantity.saturating_sub(self.filled_quantity)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// NEW → WORKING. No-op from any other state.
    pub fn acknowledge(&mut self) {
        if self.state == OrderState::New {
            self.transition(OrderState::Working);
        }
    }

    /// Record an execution. Ignored once terminal; clamps at `quantity`.
    pub fn add_fill(&mut self, qty: u64) {
        if self.is_terminal() {
            return;
        }
        self.filled_quantity = self.filled_quantity.saturating_add(qty).min(self.quantity);
        if self.filled_quantity >= self.quantity {
            self.transition(OrderState::Filled);
        } else {
            self.transition(OrderState::PartiallyFilled);
        }
    }

    pub fn cancel(&mut self) {
        if !self.is_terminal() {
            self.transition(OrderState::Canceled);
        }
    }

    pub fn reject(&mut self) {
        if !self.is_terminal() {
            self.transition(OrderState::Rejected);
        }
    }

    /// Enforce time-in-force once a matching cycle is over.
    ///
    /// IOC keeps whatever filled and cancels the rest. FOK that is not
    /// complete rolls its fills back to zero before cancelling, so no partial
    /// FOK execution survives the cycle. DAY orders keep working.
    pub fn handle_end_of_cycle(&mut self) {
        if self.is_terminal() || self.filled_quantity >= self.quantity {
            return;
        }
        match self.tif {
            TimeInForce::Ioc => self.cancel(),
            TimeInForce::Fok => {
                self.filled_quantity = 0;
                self.cancel();
            }
            TimeInForce::Day => {}
        }
    }

    /// Copy of this order sized to the unfilled remainder, with no fills.
    ///
    /// The execution simulator works on this clone so the authoritative order
    /// is mutated exactly once per cycle.
    pub fn remaining_clone(&self) -> Order {
        Order {
            quantity: self.remaining(),
            filled_quantity: 0,
            ..self.clone()
        }
    }

    fn transition(&mut self, next: OrderState) {
        self.state = next;
        self.version += 1;
    }
}
