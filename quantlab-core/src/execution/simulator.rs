//! Square-root impact simulator with ADV capacity and time-of-day spreads.
//!
//! The simulator is pure: it never mutates the order it is handed. The
//! driver passes a remaining-quantity clone and applies the resulting fills
//! to the authoritative order itself.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::cost::{CostCalculator, CostError, CostOrder};
use super::tick::TickTable;
use super::tod::{TodBucket, TodMultipliers};
use crate::calendar::TradingCalendar;
use crate::domain::{Fill, Order, OrderId, OrderSide, OrderType, SymbolId, TimeInForce};
use crate::precision::round10;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("limit order {0} has no limit price")]
    MissingLimitPrice(OrderId),
    #[error("cost calculation failed: {0}")]
    Cost(#[from] CostError),
}

/// Per-symbol liquidity and volatility inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolParams {
    pub symbol_id: SymbolId,
    /// Average daily volume in shares.
    #[serde(default)]
    pub adv: Option<f64>,
    /// Daily return volatility.
    #[serde(default)]
    pub sigma: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub symbols: Vec<SymbolParams>,
    /// Maximum fraction of ADV fillable in one cycle.
    pub adv_cap_fraction: f64,
    pub impact_alpha: f64,
    pub tod: TodMultipliers,
    pub ticks: TickTable,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            adv_cap_fraction: 0.1,
            impact_alpha: 0.1,
            tod: TodMultipliers::default(),
            ticks: TickTable::default(),
        }
    }
}

/// Top of book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    pub fn new(bid: f64, ask: f64) -> Self {
        Self { bid, ask }
    }

    /// Symmetric quote of `spread_bps` around `close`; the bid stays positive
    /// and never above the ask.
    pub fn from_close(close: f64, spread_bps: f64) -> Self {
        let spread = close * spread_bps / 10_000.0;
        let bid = (close - spread / 2.0).max(1e-9);
        Self {
            bid,
            ask: (close + spread / 2.0).max(bid),
        }
    }

    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }

    fn clamp(&self, price: f64) -> f64 {
        price.max(self.bid).min(self.ask)
    }
}

/// Outcome of one simulation: at most one fill, plus its transaction cost.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Execution {
    pub fills: Vec<Fill>,
    pub cost: f64,
}

impl Execution {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn filled_quantity(&self) -> u64 {
        self.fills.iter().map(|f| f.quantity).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.fills.is_empty()
    }
}

pub struct ExecutionSimulator {
    adv: BTreeMap<SymbolId, f64>,
    sigma: BTreeMap<SymbolId, f64>,
    adv_cap_fraction: f64,
    impact_alpha: f64,
    tod: TodMultipliers,
    ticks: TickTable,
    costs: Option<Arc<dyn CostCalculator>>,
    calendar: Option<Arc<dyn TradingCalendar>>,
}

impl std::fmt::Debug for ExecutionSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionSimulator")
            .field("adv", &self.adv)
            .field("sigma", &self.sigma)
            .field("adv_cap_fraction", &self.adv_cap_fraction)
            .field("impact_alpha", &self.impact_alpha)
            .field("has_costs", &self.costs.is_some())
            .field("has_calendar", &self.calendar.is_some())
            .finish()
    }
}

impl ExecutionSimulator {
    pub fn new(config: &ExecutionConfig) -> Self {
        let mut adv = BTreeMap::new();
        let mut sigma = BTreeMap::new();
        for p in &config.symbols {
            if let Some(a) = p.adv {
                adv.insert(p.symbol_id, a);
            }
            if let Some(s) = p.sigma {
                sigma.insert(p.symbol_id, s);
            }
        }
        Self {
            adv,
            sigma,
            adv_cap_fraction: config.adv_cap_fraction,
            impact_alpha: config.impact_alpha,
            tod: config.tod.clone(),
            ticks: config.ticks.clone(),
            costs: None,
            calendar: None,
        }
    }

    pub fn with_costs(mut self, costs: Arc<dyn CostCalculator>) -> Self {
        self.costs = Some(costs);
        self
    }

    pub fn with_calendar(mut self, calendar: Arc<dyn TradingCalendar>) -> Self {
        self.calendar = Some(calendar);
        self
    }

    /// Simulate `order` against `quote` at `venue`.
    ///
    /// `available` is the liquidity visible this cycle. `ts` selects the
    /// time-of-day bucket; without it the spread is unscaled (MID).
    pub fn simulate(
        &self,
        order: &Order,
        quote: &Quote,
        venue: &str,
        available: u64,
        ts: Option<DateTime<Utc>>,
    ) -> Result<Execution, ExecutionError> {
        let limit = match order.order_type {
            OrderType::Limit => {
                let raw = order
                    .limit_price
                    .ok_or(ExecutionError::MissingLimitPrice(order.id))?;
                Some(self.ticks.enforce(raw, venue, order.side))
            }
            OrderType::Market => None,
        };

        let available_f = available as f64;
        let adv = self.adv.get(&order.symbol_id).copied().unwrap_or(available_f);
        let cap = (self.adv_cap_fraction * adv).min(available_f).max(0.0).floor() as u64;

        if order.tif == TimeInForce::Fok && cap < order.quantity {
            debug!(order = %order.id, cap, qty = order.quantity, "FOK cannot fill completely");
            return Ok(Execution::none());
        }
        let qty = order.quantity.min(cap);
        if qty == 0 {
            return Ok(Execution::none());
        }

        let bucket = self.bucket(venue, ts);
        let effective_spread = quote.spread() * self.tod.multiplier(bucket);
        let sign = order.side.sign();
        let sigma = self.sigma.get(&order.symbol_id).copied().unwrap_or(0.0);
        let impact = sign * sigma * ((qty.max(1) as f64) / adv.max(1.0)).sqrt() * self.impact_alpha;
        let urgency = match order.order_type {
            OrderType::Market => 0.75,
            OrderType::Limit => 0.5,
        };
        let mut target = quote.clamp(quote.mid() + impact + sign * urgency * effective_spread);

        if let Some(limit) = limit {
            let marketable = match order.side {
                OrderSide::Buy => limit >= quote.bid,
                OrderSide::Sell => limit <= quote.ask,
            };
            if !marketable {
                debug!(order = %order.id, limit, bid = quote.bid, ask = quote.ask, "limit not marketable");
                return Ok(Execution::none());
            }
            target = match order.side {
                OrderSide::Buy => target.min(limit),
                OrderSide::Sell => target.max(limit),
            };
            target = quote.clamp(target);
        }

        let price = round10(target);
        let cost = match &self.costs {
            Some(calc) => calc.cost(
                venue,
                &CostOrder {
                    side: order.side,
                    qty,
                    price,
                },
            )?,
            None => 0.0,
        };
        debug!(order = %order.id, qty, price, cost, ?bucket, "simulated fill");
        Ok(Execution {
            fills: vec![Fill { price, quantity: qty }],
            cost,
        })
    }

    fn bucket(&self, venue: &str, ts: Option<DateTime<Utc>>) -> TodBucket {
        let (Some(calendar), Some(ts)) = (&self.calendar, ts) else {
            return TodBucket::Mid;
        };
        let Ok(date) = calendar.local_date(venue, ts) else {
            return TodBucket::Mid;
        };
        match calendar.session(venue, date) {
            Ok(Some(session)) => self.tod.bucket(&session, ts),
            _ => TodBucket::Mid,
        }
    }
}
