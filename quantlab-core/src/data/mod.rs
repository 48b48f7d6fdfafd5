//! Point-in-time data layer.
//!
//! Immutable stores built once per dataset and shared read-only (via `Arc`)
//! across runs:
//! - `BarsStore`: bars grouped by symbol, sorted by timestamp
//! - `FxTable`: FX observations with as-of lookup
//! - `SymbolMaster`: symbol records with activity intervals
//! - `CorporateActionStore`: splits and dividends per symbol
//!
//! `PitDataReader` is the only read path exposed to strategies and enforces
//! the no-look-ahead guard.

pub mod actions;
pub mod bars;
pub mod error;
pub mod fx;
pub mod pit;
pub mod symbols;

pub use actions::CorporateActionStore;
pub use bars::BarsStore;
pub use error::DataError;
pub use fx::{FxSource, FxTable};
pub use pit::PitDataReader;
pub use symbols::SymbolMaster;
