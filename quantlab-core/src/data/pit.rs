//! Point-in-time reader: the no-look-ahead gate.
//!
//! Every accessor takes an `asof` timestamp and never returns data dated
//! after it. Requests that ask for the future are rejected as
//! `InvalidRequest`; if the store nevertheless yields a future bar the reader
//! reports a `DatasetViolation`, which callers treat as fatal.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::bars::BarsStore;
use super::error::DataError;
use super::fx::{FxSource, FxTable};
use super::symbols::SymbolMaster;
use crate::domain::{Bar, FxRate, SymbolId, SymbolRecord};

/// Cheap to clone; the stores are shared read-only.
#[derive(Debug, Clone)]
pub struct PitDataReader {
    bars: Arc<BarsStore>,
    fx: Arc<FxTable>,
    symbols: Arc<SymbolMaster>,
}

impl PitDataReader {
    pub fn new(bars: Arc<BarsStore>, fx: Arc<FxTable>, symbols: Arc<SymbolMaster>) -> Self {
        Self { bars, fx, symbols }
    }

    /// Bars of `symbol_id` in `[start, end]` as seen at `asof`.
    ///
    /// `end` defaults to `asof`; an `end` after `asof` is rejected.
    pub fn get_bars(
        &self,
        symbol_id: SymbolId,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        asof: DateTime<Utc>,
    ) -> Result<&[Bar], DataError> {
        if let Some(end) = end {
            if end > asof {
                return Err(DataError::InvalidRequest(format!(
                    "requested end {end} exceeds asof {asof}"
                )));
            }
        }
        let end = end.unwrap_or(asof);
        let bars = self.bars.get_between(symbol_id, start, Some(end));
        if let Some(bar) = bars.iter().find(|b| b.ts > asof) {
            return Err(DataError::DatasetViolation {
                bar_ts: bar.ts,
                asof,
            });
        }
        Ok(bars)
    }

    /// Symbols active at `asof`, ordered by id. Empty universe is not found.
    pub fn get_symbols(&self, asof: DateTime<Utc>) -> Result<Vec<&SymbolRecord>, DataError> {
        let active = self.symbols.active_at(asof);
        if active.is_empty() {
            return Err(DataError::NotFound(format!("no active symbols at {asof}")));
        }
        Ok(active)
    }

    pub fn get_symbol(&self, symbol_id: SymbolId, asof: DateTime<Utc>) -> Result<&SymbolRecord, DataError> {
        self.symbols.get(symbol_id, asof)
    }

    pub fn resolve_ticker(&self, ticker: &str, asof: DateTime<Utc>) -> Result<SymbolId, DataError> {
        self.symbols.resolve_ticker(ticker, asof)
    }

    pub fn get_fx(&self, base: &str, quote: &str, asof: DateTime<Utc>) -> Result<FxRate, DataError> {
        self.fx.rate_asof(base, quote, asof)
    }

    /// Raw store access for the driver's event seeding. Strategies never get this.
    pub(crate) fn bars_store(&self) -> &BarsStore {
        &self.bars
    }

    pub(crate) fn fx_table(&self) -> &FxTable {
        &self.fx
    }

    pub(crate) fn symbol_master(&self) -> &SymbolMaster {
        &self.symbols
    }
}

impl FxSource for PitDataReader {
    fn rate_asof(&self, base: &str, quote: &str, asof: DateTime<Utc>) -> Result<FxRate, DataError> {
        self.get_fx(base, quote, asof)
    }
}
