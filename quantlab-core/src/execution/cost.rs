//! Transaction cost profiles, keyed by venue.
//!
//! Three profile shapes:
//! - `PER_SHARE_PLUS_FEES`: per-share commission; sells also pay an SEC fee
//!   (bps of notional) and a per-share TAF
//! - `BPS`: commission in basis points of notional
//! - `BPS_WITH_STAMP`: bps commission plus stamp duty on buys
//!
//! Results are rounded to 1e-10.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::OrderSide;
use crate::precision::round10;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CostError {
    #[error("unknown venue: {0}")]
    UnknownVenue(String),
    #[error("invalid cost profiles: {0}")]
    Parse(String),
}

/// The slice of an order a cost calculator needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostOrder {
    pub side: OrderSide,
    pub qty: u64,
    pub price: f64,
}

impl CostOrder {
    pub fn notional(&self) -> f64 {
        self.qty as f64 * self.price
    }
}

pub trait CostCalculator: Send + Sync {
    fn cost(&self, venue: &str, order: &CostOrder) -> Result<f64, CostError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CostProfile {
    PerSharePlusFees {
        #[serde(default)]
        commission_per_share: f64,
        #[serde(default)]
        sec_fee_bps: f64,
        #[serde(default)]
        taf_per_share: f64,
    },
    Bps {
        #[serde(default)]
        commission_bps: f64,
    },
    BpsWithStamp {
        #[serde(default)]
        commission_bps: f64,
        #[serde(default)]
        stamp_duty_bps: f64,
        #[serde(default = "default_true")]
        stamp_enabled: bool,
    },
}

fn default_true() -> bool {
    true
}

impl CostProfile {
    pub fn cost(&self, order: &CostOrder) -> f64 {
        let notional = order.notional();
        let qty = order.qty as f64;
        let raw = match *self {
            CostProfile::PerSharePlusFees {
                commission_per_share,
                sec_fee_bps,
                taf_per_share,
            } => {
                let commission = commission_per_share * qty;
                match order.side {
                    OrderSide::Sell => {
                        commission + notional * sec_fee_bps / 10_000.0 + taf_per_share * qty
                    }
                    OrderSide::Buy => commission,
                }
            }
            CostProfile::Bps { commission_bps } => notional * commission_bps / 10_000.0,
            CostProfile::BpsWithStamp {
                commission_bps,
                stamp_duty_bps,
                stamp_enabled,
            } => {
                let commission = notional * commission_bps / 10_000.0;
                let stamp = if stamp_enabled && order.side == OrderSide::Buy {
                    notional * stamp_duty_bps / 10_000.0
                } else {
                    0.0
                };
                commission + stamp
            }
        };
        round10(raw)
    }
}

/// Venue → profile table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CostProfiles {
    profiles: BTreeMap<String, CostProfile>,
}

impl CostProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, venue: impl Into<String>, profile: CostProfile) -> Self {
        self.profiles.insert(venue.into(), profile);
        self
    }

    /// Parse a TOML table of `[VENUE]` sections, each with a `type` key.
    pub fn from_toml(content: &str) -> Result<Self, CostError> {
        toml::from_str(content).map_err(|e| CostError::Parse(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, CostError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CostError::Parse(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn profile(&self, venue: &str) -> Option<&CostProfile> {
        self.profiles.get(venue)
    }
}

impl CostCalculator for CostProfiles {
    fn cost(&self, venue: &str, order: &CostOrder) -> Result<f64, CostError> {
        self.profile(venue)
            .map(|p| p.cost(order))
            .ok_or_else(|| CostError::UnknownVenue(venue.to_string()))
    }
}
