//! Symbol master records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::SymbolId;

/// One listing interval of a symbol.
///
/// Tickers are reused over time: several `symbol_id`s may carry the same
/// ticker across non-overlapping activity windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub symbol_id: SymbolId,
    pub ticker: String,
    pub exchange: String,
    pub currency: String,
    pub active_from: DateTime<Utc>,
    pub active_to: Option<DateTime<Utc>>,
}

impl SymbolRecord {
    /// Active iff `active_from <= asof` and `asof < active_to` (open upper bound).
    pub fn is_active_at(&self, asof: DateTime<Utc>) -> bool {
        self.active_from <= asof && self.active_to.map_or(true, |to| to > asof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(active_to: Option<DateTime<Utc>>) -> SymbolRecord {
        SymbolRecord {
            symbol_id: SymbolId(7),
            ticker: "ACME".into(),
            exchange: "XNYS".into(),
            currency: "USD".into(),
            active_from: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            active_to,
        }
    }

    #[test]
    fn lower_bound_inclusive() {
        let r = record(None);
        assert!(r.is_active_at(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()));
        assert!(!r.is_active_at(Utc.with_ymd_and_hms(2019, 12, 31, 23, 59, 59).unwrap()));
    }

    #[test]
    fn upper_bound_exclusive() {
        let end = Utc.with_ymd_and_hms(2022, 6, 1, 0, 0, 0).unwrap();
        let r = record(Some(end));
        assert!(!r.is_active_at(end));
        assert!(r.is_active_at(end - chrono::Duration::seconds(1)));
    }
}
