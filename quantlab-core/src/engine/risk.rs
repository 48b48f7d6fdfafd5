//! Pre-trade risk caps.
//!
//! Only the per-symbol notional cap is enforced on each order; the other caps
//! are carried so strategies can read and tighten them.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::domain::SymbolId;
use crate::portfolio::Portfolio;

#[derive(Debug, Error, Clone, PartialEq)]
#[error("risk violation on {cap} for symbol {symbol_id}: exposure {exposure} > limit {limit}")]
pub struct RiskViolation {
    pub cap: &'static str,
    pub symbol_id: SymbolId,
    pub exposure: f64,
    pub limit: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskCaps {
    pub max_gross: f64,
    pub max_net: f64,
    pub max_symbol: f64,
    pub max_leverage: f64,
}

impl Default for RiskCaps {
    fn default() -> Self {
        Self {
            max_gross: 1e9,
            max_net: 1e9,
            max_symbol: 1e9,
            max_leverage: 10.0,
        }
    }
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskUpdate {
    pub max_gross: Option<f64>,
    pub max_net: Option<f64>,
    pub max_symbol: Option<f64>,
    pub max_leverage: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RiskManager {
    caps: RiskCaps,
}

impl RiskManager {
    pub fn new(caps: RiskCaps) -> Self {
        Self { caps }
    }

    pub fn caps(&self) -> &RiskCaps {
        &self.caps
    }

    pub fn set(&mut self, update: RiskUpdate) {
        let c = &mut self.caps;
        c.max_gross = update.max_gross.unwrap_or(c.max_gross);
        c.max_net = update.max_net.unwrap_or(c.max_net);
        c.max_symbol = update.max_symbol.unwrap_or(c.max_symbol);
        c.max_leverage = update.max_leverage.unwrap_or(c.max_leverage);
    }

    /// Reject if the post-trade notional of `symbol_id`, in base currency,
    /// would exceed `max_symbol`. `signed_qty` is positive for buys.
    pub fn check(
        &self,
        portfolio: &Portfolio,
        symbol_id: SymbolId,
        price: f64,
        signed_qty: f64,
        fx_to_base: f64,
    ) -> Result<(), RiskViolation> {
        let current = portfolio.quantity(symbol_id);
        let exposure = (current * price * fx_to_base + signed_qty * price * fx_to_base).abs();
        if exposure > self.caps.max_symbol {
            warn!(symbol = %symbol_id, exposure, limit = self.caps.max_symbol, "max_symbol breached");
            return Err(RiskViolation {
                cap: "max_symbol",
                symbol_id,
                exposure,
                limit: self.caps.max_symbol,
            });
        }
        Ok(())
    }
}
