use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::domain::{CorporateAction, SymbolId};

/// Corporate actions grouped by symbol, sorted by effective date.
#[derive(Debug, Clone, Default)]
pub struct CorporateActionStore {
    by_symbol: BTreeMap<SymbolId, Vec<CorporateAction>>,
}

impl CorporateActionStore {
    pub fn from_actions(actions: impl IntoIterator<Item = CorporateAction>) -> Self {
        let mut by_symbol: BTreeMap<SymbolId, Vec<CorporateAction>> = BTreeMap::new();
        for action in actions {
            by_symbol.entry(action.symbol_id).or_default().push(action);
        }
        for actions in by_symbol.values_mut() {
            actions.sort_by_key(|a| a.effective_date);
        }
        Self { by_symbol }
    }

    pub fn actions_for(&self, symbol_id: SymbolId) -> &[CorporateAction] {
        self.by_symbol.get(&symbol_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Actions effective within `[start, end]`, ordered by `(date, symbol)`.
    pub fn actions_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<&CorporateAction> {
        let mut out: Vec<&CorporateAction> = self
            .by_symbol
            .values()
            .flatten()
            .filter(|a| a.effective_date >= start && a.effective_date <= end)
            .collect();
        out.sort_by_key(|a| (a.effective_date, a.symbol_id));
        out
    }

    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }
}
