//! Bar storage indexed by symbol and time.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::domain::{Bar, SymbolId};

#[derive(Debug, Clone, Default)]
pub struct BarsStore {
    by_symbol: BTreeMap<SymbolId, Vec<Bar>>,
}

impl BarsStore {
    /// Group bars by symbol and sort each series by timestamp.
    ///
    /// The sort is stable and duplicates are kept.
    pub fn from_bars(bars: impl IntoIterator<Item = Bar>) -> Self {
        let mut store = Self::from_presorted(bars);
        for series in store.by_symbol.values_mut() {
            series.sort_by_key(|b| b.ts);
        }
        store
    }

    /// Group bars by symbol, trusting the input to be time-ordered per symbol.
    ///
    /// Skips the sort for loaders that already emit ordered series. Ordering is
    /// not checked here; `PitDataReader` still refuses to return future bars.
    pub fn from_presorted(bars: impl IntoIterator<Item = Bar>) -> Self {
        let mut by_symbol: BTreeMap<SymbolId, Vec<Bar>> = BTreeMap::new();
        for bar in bars {
            by_symbol.entry(bar.symbol_id).or_default().push(bar);
        }
        Self { by_symbol }
    }

    /// Bars of one symbol with `start <= ts <= end`; open bounds when `None`.
    pub fn get_between(
        &self,
        symbol_id: SymbolId,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> &[Bar] {
        let Some(series) = self.by_symbol.get(&symbol_id) else {
            return &[];
        };
        let lo = start.map_or(0, |s| series.partition_point(|b| b.ts < s));
        let hi = end.map_or(series.len(), |e| series.partition_point(|b| b.ts <= e));
        if lo >= hi {
            return &[];
        }
        &series[lo..hi]
    }

    /// Sorted distinct bar timestamps across all symbols within `[start, end]`.
    pub fn timestamps_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let set: BTreeSet<DateTime<Utc>> = self
            .by_symbol
            .keys()
            .flat_map(|&id| self.get_between(id, Some(start), Some(end)))
            .map(|b| b.ts)
            .collect();
        set.into_iter().collect()
    }

    /// All bars within `[start, end]`, ordered by `(ts, symbol_id)`.
    pub fn bars_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<&Bar> {
        let mut out: Vec<&Bar> = self
            .by_symbol
            .keys()
            .flat_map(|&id| self.get_between(id, Some(start), Some(end)))
            .collect();
        out.sort_by_key(|b| (b.ts, b.symbol_id));
        out
    }

    pub fn symbols(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.by_symbol.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.by_symbol.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_symbol.values().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn bar(sym: u64, day: u32) -> Bar {
        Bar {
            ts: Utc.with_ymd_and_hms(2024, 1, day, 21, 0, 0).unwrap(),
            symbol_id: SymbolId(sym),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: day as f64,
            volume: 100,
            session_date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
        }
    }

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 21, 0, 0).unwrap()
    }

    #[test]
    fn sorts_per_symbol() {
        let store = BarsStore::from_bars(vec![bar(1, 5), bar(1, 3), bar(2, 4), bar(1, 4)]);
        let closes: Vec<f64> = store.get_between(SymbolId(1), None, None).iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![3.0, 4.0, 5.0]);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn range_is_inclusive() {
        let store = BarsStore::from_bars((2..=6).map(|d| bar(1, d)));
        let got = store.get_between(SymbolId(1), Some(ts(3)), Some(ts(5)));
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].ts, ts(3));
        assert_eq!(got[2].ts, ts(5));
    }

    #[test]
    fn unknown_symbol_and_empty_range() {
        let store = BarsStore::from_bars(vec![bar(1, 3)]);
        assert!(store.get_between(SymbolId(9), None, None).is_empty());
        assert!(store.get_between(SymbolId(1), Some(ts(5)), Some(ts(4))).is_empty());
    }

    #[test]
    fn duplicates_are_kept() {
        let store = BarsStore::from_bars(vec![bar(1, 3), bar(1, 3)]);
        assert_eq!(store.get_between(SymbolId(1), None, None).len(), 2);
    }

    #[test]
    fn distinct_timestamps_across_symbols() {
        let store = BarsStore::from_bars(vec![bar(1, 3), bar(2, 3), bar(2, 4), bar(1, 8)]);
        assert_eq!(store.timestamps_between(ts(1), ts(5)), vec![ts(3), ts(4)]);
    }

    #[test]
    fn bars_between_ordered_by_time_then_symbol() {
        let store = BarsStore::from_bars(vec![bar(2, 3), bar(1, 4), bar(1, 3)]);
        let keys: Vec<_> = store
            .bars_between(ts(1), ts(9))
            .iter()
            .map(|b| (b.session_date, b.symbol_id.0))
            .collect();
        assert_eq!(keys[0].1, 1);
        assert_eq!(keys[1].1, 2);
        assert_eq!(keys[2].1, 1);
    }
}
