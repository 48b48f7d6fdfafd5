//! Execution simulation: turns a working order into fills against a quote.
//!
//! Key concepts:
//! - **Capacity**: fills are capped at a fraction of ADV and available liquidity
//! - **Impact**: square-root impact scaled by volatility
//! - **Spread**: quoted spread widened by time-of-day bucket
//! - **Costs**: per-venue commission and fee profiles
//! - **Ticks**: limit prices snapped to the venue grid

pub mod cost;
pub mod simulator;
pub mod tick;
pub mod tod;

pub use cost::{CostCalculator, CostError, CostOrder, CostProfile, CostProfiles};
pub use simulator::{Execution, ExecutionConfig, ExecutionError, ExecutionSimulator, Quote, SymbolParams};
pub use tick::TickTable;
pub use tod::{TodBucket, TodMultipliers};
