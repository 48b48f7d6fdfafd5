use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::OrderSide;
use crate::precision::{ceil_to_tick, floor_to_tick};

/// Minimum price increment per venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickTable {
    pub default_tick: f64,
    pub venues: BTreeMap<String, f64>,
}

impl Default for TickTable {
    fn default() -> Self {
        Self {
            default_tick: 0.01,
            venues: BTreeMap::new(),
        }
    }
}

impl TickTable {
    pub fn tick_for(&self, venue: &str) -> f64 {
        self.venues.get(venue).copied().unwrap_or(self.default_tick)
    }

    /// Snap a limit price onto the venue's tick grid without loosening it:
    /// BUY limits round down, SELL limits round up.
    pub fn enforce(&self, price: f64, venue: &str, side: OrderSide) -> f64 {
        let tick = self.tick_for(venue);
        match side {
            OrderSide::Buy => floor_to_tick(price, tick),
            OrderSide::Sell => ceil_to_tick(price, tick),
        }
    }
}
