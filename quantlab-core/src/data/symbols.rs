//! Symbol master with activity intervals.

use chrono::{DateTime, Utc};

use super::error::DataError;
use crate::domain::{SymbolId, SymbolRecord};

#[derive(Debug, Clone, Default)]
pub struct SymbolMaster {
    /// Sorted by `(symbol_id, active_from)`.
    records: Vec<SymbolRecord>,
}

impl SymbolMaster {
    pub fn from_records(records: impl IntoIterator<Item = SymbolRecord>) -> Self {
        let mut records: Vec<SymbolRecord> = records.into_iter().collect();
        records.sort_by_key(|r| (r.symbol_id, r.active_from));
        Self { records }
    }

    /// Symbols active at `asof`, ordered by id.
    pub fn active_at(&self, asof: DateTime<Utc>) -> Vec<&SymbolRecord> {
        self.records.iter().filter(|r| r.is_active_at(asof)).collect()
    }

    /// The record for `symbol_id` active at `asof`.
    pub fn get(&self, symbol_id: SymbolId, asof: DateTime<Utc>) -> Result<&SymbolRecord, DataError> {
        self.records
            .iter()
            .find(|r| r.symbol_id == symbol_id && r.is_active_at(asof))
            .ok_or_else(|| DataError::NotFound(format!("symbol {symbol_id} not active at {asof}")))
    }

    /// Ticker → id for the listing active at `asof`.
    pub fn resolve_ticker(&self, ticker: &str, asof: DateTime<Utc>) -> Result<SymbolId, DataError> {
        self.records
            .iter()
            .find(|r| r.ticker == ticker && r.is_active_at(asof))
            .map(|r| r.symbol_id)
            .ok_or_else(|| DataError::NotFound(format!("unknown ticker {ticker} at {asof}")))
    }

    pub fn records(&self) -> &[SymbolRecord] {
        &self.records
    }
}
