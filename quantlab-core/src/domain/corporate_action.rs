use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ids::SymbolId;

/// Split and/or cash dividend effective on a date.
///
/// `split_ratio = 1.0` and `dividend = 0.0` are no-ops, so a row can carry
/// either component alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorporateAction {
    pub symbol_id: SymbolId,
    pub effective_date: NaiveDate,
    pub split_ratio: f64,
    pub dividend: f64,
    pub currency: String,
}

impl CorporateAction {
    pub fn has_split(&self) -> bool {
        self.split_ratio > 0.0 && self.split_ratio != 1.0
    }

    pub fn has_dividend(&self) -> bool {
        self.dividend != 0.0
    }
}
