//! Strategy SDK: the trait user strategies implement and the context they
//! act through.
//!
//! A strategy never touches stores or the order book directly. Everything it
//! reads goes through [`DataApi`], which is pinned to the current simulation
//! time, and everything it does is a request the driver executes at the end
//! of the current timestamp.

pub mod features;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use thiserror::Error;

use crate::calendar::TradingCalendar;
use crate::data::{DataError, PitDataReader};
use crate::domain::{Bar, OrderId, OrderSide, OrderType, SymbolId, TimeInForce};
use crate::engine::book::{CancelTarget, OrderBook};
use crate::engine::events::Event;
use crate::engine::risk::{RiskCaps, RiskManager, RiskUpdate};
use crate::engine::MarketEvent;
use crate::portfolio::Portfolio;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StrategyError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("unsupported field: {0}")]
    UnknownField(String),
    #[error("invalid strategy request: {0}")]
    Invalid(String),
}

/// User strategy. Callbacks run on the driver thread, in event order.
pub trait Strategy: Send {
    /// Stable name; part of the run identity.
    fn name(&self) -> &str;

    fn on_start(&mut self, _ctx: &mut Context<'_>) -> Result<(), StrategyError> {
        Ok(())
    }

    fn on_event(&mut self, event: &Event<MarketEvent>, ctx: &mut Context<'_>) -> Result<(), StrategyError>;

    fn on_end(&mut self, _ctx: &mut Context<'_>) -> Result<(), StrategyError> {
        Ok(())
    }
}

// ─── Data access ─────────────────────────────────────────────────────

/// A symbol given either by id or by ticker (resolved as of the query time).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolRef {
    Id(SymbolId),
    Ticker(String),
}

impl From<SymbolId> for SymbolRef {
    fn from(id: SymbolId) -> Self {
        SymbolRef::Id(id)
    }
}

impl From<u64> for SymbolRef {
    fn from(id: u64) -> Self {
        SymbolRef::Id(SymbolId(id))
    }
}

impl From<&str> for SymbolRef {
    fn from(ticker: &str) -> Self {
        SymbolRef::Ticker(ticker.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Field {
    Ts,
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl Field {
    pub fn parse(name: &str) -> Result<Self, StrategyError> {
        match name {
            "ts" => Ok(Field::Ts),
            "open" => Ok(Field::Open),
            "high" => Ok(Field::High),
            "low" => Ok(Field::Low),
            "close" => Ok(Field::Close),
            "volume" => Ok(Field::Volume),
            other => Err(StrategyError::UnknownField(other.to_string())),
        }
    }

    fn value(self, bar: &Bar) -> Option<f64> {
        match self {
            Field::Ts => None,
            Field::Open => Some(bar.open),
            Field::High => Some(bar.high),
            Field::Low => Some(bar.low),
            Field::Close => Some(bar.close),
            Field::Volume => Some(bar.volume as f64),
        }
    }
}

/// Column-oriented result of [`DataApi::get`], oldest row first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldFrame {
    ts: Vec<DateTime<Utc>>,
    columns: BTreeMap<Field, Vec<f64>>,
}

impl FieldFrame {
    pub fn ts(&self) -> &[DateTime<Utc>] {
        &self.ts
    }

    pub fn column(&self, field: Field) -> Option<&[f64]> {
        self.columns.get(&field).map(Vec::as_slice)
    }

    pub fn close(&self) -> Option<&[f64]> {
        self.column(Field::Close)
    }

    pub fn len(&self) -> usize {
        self.ts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ts.is_empty()
    }
}

/// Read-only PIT view pinned to the current simulation time.
#[derive(Clone, Copy)]
pub struct DataApi<'a> {
    reader: &'a PitDataReader,
    now: DateTime<Utc>,
}

impl<'a> DataApi<'a> {
    pub fn new(reader: &'a PitDataReader, now: DateTime<Utc>) -> Self {
        Self { reader, now }
    }

    pub fn resolve(&self, symbol: &SymbolRef, at: DateTime<Utc>) -> Result<SymbolId, StrategyError> {
        match symbol {
            SymbolRef::Id(id) => Ok(*id),
            SymbolRef::Ticker(t) => Ok(self.reader.resolve_ticker(t, at)?),
        }
    }

    /// Bars up to `at`, keeping the last `lookback` (0 keeps all).
    pub fn bars(
        &self,
        symbol: impl Into<SymbolRef>,
        lookback: usize,
        at: DateTime<Utc>,
    ) -> Result<&'a [Bar], StrategyError> {
        if at > self.now {
            return Err(DataError::InvalidRequest(format!("query at {at} is after now {}", self.now)).into());
        }
        let id = self.resolve(&symbol.into(), at)?;
        let bars = self.reader.get_bars(id, None, Some(at), at)?;
        let skip = if lookback > 0 { bars.len().saturating_sub(lookback) } else { 0 };
        Ok(&bars[skip..])
    }

    /// Named fields (`ts`, `open`, `high`, `low`, `close`, `volume`) of the
    /// last `lookback` bars up to `at`.
    pub fn get(
        &self,
        symbol: impl Into<SymbolRef>,
        fields: &[&str],
        lookback: usize,
        at: DateTime<Utc>,
    ) -> Result<FieldFrame, StrategyError> {
        let fields = fields.iter().map(|f| Field::parse(f)).collect::<Result<Vec<_>, _>>()?;
        let bars = self.bars(symbol, lookback, at)?;
        let mut frame = FieldFrame {
            ts: bars.iter().map(|b| b.ts).collect(),
            columns: BTreeMap::new(),
        };
        for field in fields.into_iter().filter(|f| *f != Field::Ts) {
            let col = bars.iter().filter_map(|b| field.value(b)).collect();
            frame.columns.insert(field, col);
        }
        Ok(frame)
    }

    pub fn reader(&self) -> &'a PitDataReader {
        self.reader
    }
}

// ─── Orders ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: SymbolRef,
    pub side: OrderSide,
    pub quantity: u64,
    pub order_type: OrderType,
    pub limit_price: Option<f64>,
    pub tif: TimeInForce,
    pub tag: Option<String>,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<SymbolRef>, side: OrderSide, quantity: u64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            order_type: OrderType::Market,
            limit_price: None,
            tif: TimeInForce::Day,
            tag: None,
        }
    }

    pub fn limit(symbol: impl Into<SymbolRef>, side: OrderSide, quantity: u64, price: f64) -> Self {
        Self {
            order_type: OrderType::Limit,
            limit_price: Some(price),
            ..Self::market(symbol, side, quantity)
        }
    }

    pub fn tif(mut self, tif: TimeInForce) -> Self {
        self.tif = tif;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

// ─── Context ─────────────────────────────────────────────────────────

/// Everything a strategy may see or do during one callback.
pub struct Context<'a> {
    now: DateTime<Utc>,
    reader: &'a PitDataReader,
    portfolio: &'a Portfolio,
    book: &'a mut OrderBook,
    risk: &'a mut RiskManager,
    calendar: &'a dyn TradingCalendar,
    rng: &'a mut StdRng,
}

impl<'a> Context<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        now: DateTime<Utc>,
        reader: &'a PitDataReader,
        portfolio: &'a Portfolio,
        book: &'a mut OrderBook,
        risk: &'a mut RiskManager,
        calendar: &'a dyn TradingCalendar,
        rng: &'a mut StdRng,
    ) -> Self {
        Self {
            now,
            reader,
            portfolio,
            book,
            risk,
            calendar,
            rng,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn data(&self) -> DataApi<'a> {
        DataApi::new(self.reader, self.now)
    }

    /// Queue an order for the matching cycle at the current timestamp.
    pub fn order(&mut self, request: OrderRequest) -> Result<OrderId, StrategyError> {
        if request.quantity == 0 {
            return Err(StrategyError::Invalid("order quantity must be positive".into()));
        }
        let symbol_id = self.data().resolve(&request.symbol, self.now)?;
        let id = self.book.submit(
            symbol_id,
            request.side,
            request.quantity,
            request.order_type,
            request.tif,
            request.limit_price,
            request.tag,
        );
        tracing::debug!(order = %id, symbol = %symbol_id, side = %request.side, qty = request.quantity, "order submitted");
        Ok(id)
    }

    /// Cancel by id or tag; returns the number of live orders canceled.
    pub fn cancel(&mut self, target: impl Into<CancelTarget>) -> usize {
        self.book.cancel(&target.into())
    }

    pub fn open_orders(&self) -> impl Iterator<Item = &crate::domain::Order> {
        self.book.live()
    }

    pub fn portfolio(&self) -> &Portfolio {
        self.portfolio
    }

    pub fn risk(&self) -> &RiskCaps {
        self.risk.caps()
    }

    pub fn risk_mut(&mut self) -> &mut RiskManager {
        &mut *self.risk
    }

    pub fn set_risk(&mut self, update: RiskUpdate) {
        self.risk.set(update);
    }

    pub fn calendar(&self) -> &dyn TradingCalendar {
        self.calendar
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut *self.rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{NaiveDate, TimeZone};
    use rand::SeedableRng;

    use crate::calendar::ExchangeCalendar;
    use crate::data::{BarsStore, FxTable, SymbolMaster};
    use crate::domain::SymbolRecord;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 21, 0, 0).unwrap()
    }

    fn reader() -> PitDataReader {
        let bars = (2..=5).map(|d| Bar {
            ts: ts(d),
            symbol_id: SymbolId(1),
            open: d as f64,
            high: d as f64 + 1.0,
            low: d as f64 - 1.0,
            close: d as f64 + 0.5,
            volume: 100 * d as u64,
            session_date: NaiveDate::from_ymd_opt(2024, 1, d).unwrap(),
        });
        let symbols = SymbolMaster::from_records(vec![SymbolRecord {
            symbol_id: SymbolId(1),
            ticker: "ACME".into(),
            exchange: "XNYS".into(),
            currency: "USD".into(),
            active_from: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            active_to: None,
        }]);
        PitDataReader::new(
            Arc::new(BarsStore::from_bars(bars)),
            Arc::new(FxTable::default()),
            Arc::new(symbols),
        )
    }

    #[test]
    fn get_returns_requested_fields_with_lookback() {
        let r = reader();
        let api = DataApi::new(&r, ts(4));
        let frame = api.get("ACME", &["close", "volume", "ts"], 2, ts(4)).unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.ts(), &[ts(3), ts(4)]);
        assert_eq!(frame.close().unwrap(), &[3.5, 4.5]);
        assert_eq!(frame.column(Field::Volume).unwrap(), &[300.0, 400.0]);
        assert!(frame.column(Field::Open).is_none());

        let all = api.get(SymbolId(1), &["close"], 0, ts(4)).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn get_rejects_future_and_unknown_fields() {
        let r = reader();
        let api = DataApi::new(&r, ts(3));
        assert!(matches!(
            api.get(1u64, &["close"], 0, ts(4)),
            Err(StrategyError::Data(DataError::InvalidRequest(_)))
        ));
        assert_eq!(
            api.get(1u64, &["vwap"], 0, ts(3)),
            Err(StrategyError::UnknownField("vwap".into()))
        );
        assert!(matches!(api.get("NOPE", &["close"], 0, ts(3)), Err(StrategyError::Data(_))));
    }

    #[test]
    fn context_orders_and_cancels() {
        let r = reader();
        let portfolio = Portfolio::new("USD");
        let mut book = OrderBook::new();
        let mut risk = RiskManager::default();
        let calendar = ExchangeCalendar::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mut ctx = Context::new(ts(3), &r, &portfolio, &mut book, &mut risk, &calendar, &mut rng);

        let id = ctx
            .order(OrderRequest::limit("ACME", OrderSide::Buy, 10, 3.0).tag("entry"))
            .unwrap();
        assert_eq!(id, OrderId(1));
        assert!(ctx.order(OrderRequest::market(1u64, OrderSide::Sell, 0)).is_err());
        assert_eq!(ctx.cancel("entry"), 1);
        assert_eq!(ctx.open_orders().count(), 0);

        ctx.set_risk(RiskUpdate {
            max_symbol: Some(5.0),
            ..RiskUpdate::default()
        });
        assert_eq!(ctx.risk().max_symbol, 5.0);
    }
}
