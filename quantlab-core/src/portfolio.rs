//! Position and cash ledger.
//!
//! - Fills update weighted-average cost; reductions realize P&L; flips reset
//!   the basis to the fill price.
//! - Cash moves by trade notional only, in the instrument's currency. Realized
//!   P&L is returned for reporting and is already reflected in cash.
//! - Corporate actions are applied once per (symbol, effective date).
//! - Valuation converts every currency into the base currency via PIT FX.
//!
//! All maps are ordered so iteration (and float summation) order is fixed.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::data::{DataError, FxSource};
use crate::domain::{CorporateAction, OrderSide, SymbolId};
use crate::precision::round10;

/// Position tracking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol_id: SymbolId,
    pub currency: String,
    pub quantity: f64,
    pub average_price: f64,
}

impl Position {
    pub fn new(symbol_id: SymbolId, currency: impl Into<String>) -> Self {
        Self {
            symbol_id,
            currency: currency.into(),
            quantity: 0.0,
            average_price: 0.0,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0.0
    }

    pub fn is_long(&self) -> bool {
        self.quantity > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0.0
    }

    pub fn market_value(&self, mark: f64) -> f64 {
        round10(self.quantity * mark)
    }

    /// Apply a signed quantity change at `price`; returns realized P&L.
    pub fn apply_fill(&mut self, delta: f64, price: f64) -> f64 {
        if delta == 0.0 {
            return 0.0;
        }
        let extends = self.quantity == 0.0 || (self.quantity > 0.0) == (delta > 0.0);
        if extends {
            let new_qty = self.quantity + delta;
            self.average_price = if new_qty != 0.0 {
                round10((self.average_price * self.quantity + price * delta) / new_qty)
            } else {
                0.0
            };
            self.quantity = new_qty;
            return 0.0;
        }

        let close_qty = delta.abs().min(self.quantity.abs());
        let sign = if self.quantity > 0.0 { 1.0 } else { -1.0 };
        let realized = round10((price - self.average_price) * close_qty * sign);
        self.quantity += delta;
        if self.quantity == 0.0 {
            self.average_price = 0.0;
        } else if (self.quantity > 0.0) != (sign > 0.0) {
            // Flipped through zero: the residual is a fresh position at the fill price.
            self.average_price = price;
        }
        realized
    }

    /// Apply split ratios in order: price divides, quantity multiplies.
    fn apply_splits<'a>(&mut self, actions: impl IntoIterator<Item = &'a CorporateAction>) {
        for action in actions {
            if action.has_split() {
                self.average_price = round10(self.average_price / action.split_ratio);
                self.quantity = round10(self.quantity * action.split_ratio);
            } else if !(action.split_ratio > 0.0) || !action.split_ratio.is_finite() {
                warn!(
                    symbol = %action.symbol_id,
                    date = %action.effective_date,
                    ratio = action.split_ratio,
                    "invalid split ratio skipped"
                );
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    base_currency: String,
    cash: BTreeMap<String, f64>,
    positions: BTreeMap<SymbolId, Position>,
    processed_actions: BTreeMap<SymbolId, BTreeSet<NaiveDate>>,
}

impl Portfolio {
    pub fn new(base_currency: impl Into<String>) -> Self {
        Self {
            base_currency: base_currency.into(),
            cash: BTreeMap::new(),
            positions: BTreeMap::new(),
            processed_actions: BTreeMap::new(),
        }
    }

    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    pub fn cash(&self, currency: &str) -> f64 {
        self.cash.get(currency).copied().unwrap_or(0.0)
    }

    pub fn cash_balances(&self) -> impl Iterator<Item = (&str, f64)> {
        self.cash.iter().map(|(c, a)| (c.as_str(), *a))
    }

    pub fn deposit(&mut self, amount: f64, currency: &str) {
        let balance = self.cash.entry(currency.to_string()).or_insert(0.0);
        *balance = round10(*balance + amount);
    }

    pub fn withdraw(&mut self, amount: f64, currency: &str) {
        self.deposit(-amount, currency);
    }

    pub fn position(&self, symbol_id: SymbolId) -> Option<&Position> {
        self.positions.get(&symbol_id)
    }

    /// Signed quantity held, 0 when no position exists.
    pub fn quantity(&self, symbol_id: SymbolId) -> f64 {
        self.position(symbol_id).map_or(0.0, |p| p.quantity)
    }

    /// Positions in symbol order, including flat ones that once traded.
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// Apply an execution; returns realized P&L in the instrument currency.
    pub fn apply_fill(
        &mut self,
        symbol_id: SymbolId,
        currency: &str,
        side: OrderSide,
        qty: f64,
        price: f64,
    ) -> f64 {
        let position = self
            .positions
            .entry(symbol_id)
            .or_insert_with(|| Position::new(symbol_id, currency));
        let realized = position.apply_fill(side.sign() * qty, price);
        let notional = round10(qty * price);
        match side {
            OrderSide::Buy => self.withdraw(notional, currency),
            OrderSide::Sell => self.deposit(notional, currency),
        }
        realized
    }

    pub fn apply_transaction_cost(&mut self, currency: &str, cost: f64) {
        if cost != 0.0 {
            self.withdraw(cost, currency);
        }
    }

    /// Apply due corporate actions for one symbol; returns dividend cash credited.
    ///
    /// An action is due when `effective_date <= asof` (UTC date) and its date
    /// has not been processed for this symbol. Splits apply before dividends,
    /// so dividends are paid on post-split shares. Dates that pass while the
    /// position is flat are still marked processed: an action never applies
    /// retroactively to a position opened after its effective date.
    pub fn process_actions_for_symbol(
        &mut self,
        symbol_id: SymbolId,
        actions: &[CorporateAction],
        asof: DateTime<Utc>,
    ) -> f64 {
        let asof_date = asof.date_naive();
        let processed = self.processed_actions.entry(symbol_id).or_default();
        let fresh: BTreeSet<NaiveDate> = actions
            .iter()
            .filter(|a| a.symbol_id == symbol_id && a.effective_date <= asof_date)
            .map(|a| a.effective_date)
            .filter(|d| !processed.contains(d))
            .collect();
        if fresh.is_empty() {
            return 0.0;
        }
        processed.extend(fresh.iter().copied());
        // Rows sharing a date (split row + dividend row) are due together.
        let due: Vec<&CorporateAction> = actions
            .iter()
            .filter(|a| a.symbol_id == symbol_id && fresh.contains(&a.effective_date))
            .collect();

        let Some(position) = self.positions.get_mut(&symbol_id) else {
            return 0.0;
        };
        if position.is_flat() {
            return 0.0;
        }
        position.apply_splits(due.iter().copied());
        let shares = position.quantity;
        let currency = position.currency.clone();
        let dividend = round10(
            due.iter()
                .filter(|a| a.has_dividend())
                .map(|a| shares * a.dividend)
                .sum::<f64>(),
        );
        if dividend != 0.0 {
            self.deposit(dividend, &currency);
        }
        dividend
    }

    /// Total value in the base currency at `asof`.
    ///
    /// Positions without a mark are skipped rather than valued at zero.
    /// A missing FX rate for any held currency is an error.
    pub fn total_value(
        &self,
        asof: DateTime<Utc>,
        marks: &BTreeMap<SymbolId, f64>,
        fx: &dyn FxSource,
    ) -> Result<f64, DataError> {
        let mut total = 0.0;
        for (currency, amount) in &self.cash {
            total += amount * self.rate_to_base(currency, asof, fx)?;
        }
        for (symbol_id, position) in &self.positions {
            if position.is_flat() {
                continue;
            }
            let Some(mark) = marks.get(symbol_id) else {
                continue;
            };
            total += position.quantity * mark * self.rate_to_base(&position.currency, asof, fx)?;
        }
        Ok(round10(total))
    }

    /// Conversion factor from `currency` into the base currency.
    pub fn rate_to_base(
        &self,
        currency: &str,
        asof: DateTime<Utc>,
        fx: &dyn FxSource,
    ) -> Result<f64, DataError> {
        if currency == self.base_currency {
            return Ok(1.0);
        }
        Ok(fx.rate_asof(currency, &self.base_currency, asof)?.rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FxTable;
    use crate::domain::FxRate;
    use chrono::TimeZone;

    const SYM: SymbolId = SymbolId(1);

    fn asof(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 21, 0, 0).unwrap()
    }

    fn action(day: u32, split: f64, dividend: f64) -> CorporateAction {
        CorporateAction {
            symbol_id: SYM,
            effective_date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            split_ratio: split,
            dividend,
            currency: "USD".into(),
        }
    }

    #[test]
    fn weighted_average_on_extension() {
        let mut p = Position::new(SYM, "USD");
        assert_eq!(p.apply_fill(10.0, 100.0), 0.0);
        assert_eq!(p.apply_fill(10.0, 110.0), 0.0);
        assert_eq!(p.quantity, 20.0);
        assert_eq!(p.average_price, 105.0);
    }

    #[test]
    fn reduction_realizes_pnl() {
        let mut p = Position::new(SYM, "USD");
        p.apply_fill(10.0, 100.0);
        let pnl = p.apply_fill(-4.0, 110.0);
        assert_eq!(pnl, 40.0);
        assert_eq!(p.quantity, 6.0);
        assert_eq!(p.average_price, 100.0);
    }

    #[test]
    fn close_resets_average() {
        let mut p = Position::new(SYM, "USD");
        p.apply_fill(-5.0, 50.0);
        let pnl = p.apply_fill(5.0, 40.0);
        assert_eq!(pnl, 50.0); // short profits when price falls
        assert!(p.is_flat());
        assert_eq!(p.average_price, 0.0);
    }

    #[test]
    fn flip_sets_basis_to_fill_price() {
        let mut p = Position::new(SYM, "USD");
        p.apply_fill(10.0, 100.0);
        let pnl = p.apply_fill(-15.0, 90.0);
        assert_eq!(pnl, -100.0);
        assert_eq!(p.quantity, -5.0);
        assert_eq!(p.average_price, 90.0);
    }

    #[test]
    fn cash_moves_by_notional() {
        let mut pf = Portfolio::new("USD");
        pf.deposit(10_000.0, "USD");
        pf.apply_fill(SYM, "USD", OrderSide::Buy, 10.0, 100.0);
        assert_eq!(pf.cash("USD"), 9_000.0);
        let pnl = pf.apply_fill(SYM, "USD", OrderSide::Sell, 10.0, 120.0);
        assert_eq!(pnl, 200.0);
        assert_eq!(pf.cash("USD"), 10_200.0);
        pf.apply_transaction_cost("USD", 1.5);
        assert_eq!(pf.cash("USD"), 10_198.5);
    }

    #[test]
    fn split_round_trip() {
        let mut pf = Portfolio::new("USD");
        pf.apply_fill(SYM, "USD", OrderSide::Buy, 10.0, 100.0);
        pf.process_actions_for_symbol(SYM, &[action(5, 2.0, 0.0)], asof(5));
        let p = pf.position(SYM).unwrap();
        assert_eq!((p.average_price, p.quantity), (50.0, 20.0));
        pf.process_actions_for_symbol(SYM, &[action(5, 2.0, 0.0), action(6, 0.5, 0.0)], asof(6));
        let p = pf.position(SYM).unwrap();
        assert!((p.average_price - 100.0).abs() < 1e-10);
        assert!((p.quantity - 10.0).abs() < 1e-10);
    }

    #[test]
    fn dividend_credit_is_idempotent() {
        let mut pf = Portfolio::new("USD");
        pf.apply_fill(SYM, "USD", OrderSide::Buy, 200.0, 10.0);
        let before = pf.cash("USD");
        let actions = [action(5, 1.0, 0.5)];
        assert_eq!(pf.process_actions_for_symbol(SYM, &actions, asof(5)), 100.0);
        assert_eq!(pf.process_actions_for_symbol(SYM, &actions, asof(6)), 0.0);
        assert_eq!(pf.cash("USD") - before, 100.0);
    }

    #[test]
    fn dividend_paid_on_post_split_shares() {
        let mut pf = Portfolio::new("USD");
        pf.apply_fill(SYM, "USD", OrderSide::Buy, 100.0, 10.0);
        let actions = [action(5, 2.0, 0.0), action(5, 1.0, 0.25)];
        assert_eq!(pf.process_actions_for_symbol(SYM, &actions, asof(5)), 50.0);
        assert_eq!(pf.quantity(SYM), 200.0);
    }

    #[test]
    fn future_actions_wait() {
        let mut pf = Portfolio::new("USD");
        pf.apply_fill(SYM, "USD", OrderSide::Buy, 100.0, 10.0);
        assert_eq!(pf.process_actions_for_symbol(SYM, &[action(9, 1.0, 1.0)], asof(5)), 0.0);
        assert_eq!(pf.process_actions_for_symbol(SYM, &[action(9, 1.0, 1.0)], asof(9)), 100.0);
    }

    #[test]
    fn flat_dates_are_not_applied_later() {
        let mut pf = Portfolio::new("USD");
        let actions = [action(5, 2.0, 1.0)];
        assert_eq!(pf.process_actions_for_symbol(SYM, &actions, asof(5)), 0.0);
        pf.apply_fill(SYM, "USD", OrderSide::Buy, 10.0, 10.0);
        assert_eq!(pf.process_actions_for_symbol(SYM, &actions, asof(7)), 0.0);
        assert_eq!(pf.quantity(SYM), 10.0);
    }

    #[test]
    fn total_value_converts_and_skips_unmarked() {
        let fx = FxTable::from_rates(vec![FxRate {
            ts: asof(1),
            base: "USD".into(),
            quote: "EUR".into(),
            rate: 0.9,
        }]);
        let mut pf = Portfolio::new("EUR");
        pf.deposit(1_000.0, "EUR");
        pf.deposit(2_000.0, "USD");
        pf.apply_fill(SYM, "USD", OrderSide::Buy, 10.0, 100.0);
        pf.apply_fill(SymbolId(2), "EUR", OrderSide::Buy, 1.0, 50.0);

        let mut marks = BTreeMap::new();
        marks.insert(SYM, 110.0);
        // Symbol 2 unmarked: skipped, not zeroed out of existence.
        let v = pf.total_value(asof(2), &marks, &fx).unwrap();
        // cash: 950 EUR + 1000 USD * 0.9 ; position: 10 * 110 * 0.9
        assert!((v - (950.0 + 900.0 + 990.0)).abs() < 1e-9);
    }

    #[test]
    fn total_value_requires_fx() {
        let fx = FxTable::default();
        let mut pf = Portfolio::new("EUR");
        pf.deposit(10.0, "USD");
        assert!(pf.total_value(asof(2), &BTreeMap::new(), &fx).is_err());
    }
}
