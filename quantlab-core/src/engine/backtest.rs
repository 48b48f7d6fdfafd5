//! Backtest driver: event loop, matching cycle and artifact emission.
//!
//! Per timestamp:
//! 1. Drain every queued event at the timestamp, in `(kind, seq)` order.
//!    Clock boundaries schedule the exchange's next boundary; corporate
//!    actions hit the ledger; bars update marks. Each event is then handed
//!    to the strategy.
//! 2. Matching cycle: live orders in submission order are checked against
//!    risk, simulated against a synthetic quote around the bar close, and
//!    end-of-cycled. The ledger only sees the finalized fill delta.
//! 3. DAY orders on exchanges that closed at this timestamp are canceled.
//! 4. If the timestamp carried bars: equity and position snapshots.
//!
//! The driver is single-threaded and deterministic: same inputs, same seed,
//! same artifacts.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::book::OrderBook;
use super::clock::{Boundary, Clock, ClockError, ClockEvent};
use super::events::{Event, EventKind, EventQueue};
use super::risk::{RiskCaps, RiskManager};
use super::sink::{
    ArtifactSink, EquityRecord, FillRecord, OrderRecord, PositionRecord, RunManifest, RunMetrics, SinkError,
};
use crate::calendar::{CalendarError, TradingCalendar};
use crate::data::{CorporateActionStore, DataError, PitDataReader};
use crate::domain::{Bar, CorporateAction, FxRate, Order, RunId, SymbolId, TimeInForce};
use crate::execution::{CostCalculator, ExecutionConfig, ExecutionSimulator, Quote};
use crate::portfolio::Portfolio;
use crate::rng::SeedHierarchy;
use crate::strategy::{Context, Strategy, StrategyError};

/// Venue reported for symbols missing from the symbol master.
pub const UNKNOWN_VENUE: &str = "UNKNOWN";

// ─── Events ──────────────────────────────────────────────────────────

/// Payload of every event the driver schedules.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Clock(ClockEvent),
    Bar(Bar),
    Fx(FxRate),
    CorporateAction(CorporateAction),
}

impl MarketEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            MarketEvent::Clock(_) => EventKind::Clock,
            MarketEvent::Bar(_) => EventKind::Bar,
            MarketEvent::Fx(_) => EventKind::Fx,
            MarketEvent::CorporateAction(_) => EventKind::CorporateAction,
        }
    }
}

impl From<ClockEvent> for MarketEvent {
    fn from(event: ClockEvent) -> Self {
        MarketEvent::Clock(event)
    }
}

// ─── Config ──────────────────────────────────────────────────────────

fn default_base_currency() -> String {
    "USD".to_string()
}

fn default_initial_cash() -> f64 {
    1_000_000.0
}

fn default_spread_bps() -> f64 {
    5.0
}

fn default_seed() -> u64 {
    42
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default = "default_base_currency")]
    pub base_currency: String,
    #[serde(default = "default_initial_cash")]
    pub initial_cash: f64,
    /// Synthetic quote width around the bar close.
    #[serde(default = "default_spread_bps")]
    pub spread_bps: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Exchanges the clock tracks; defaults to every exchange in the symbol master.
    #[serde(default)]
    pub exchanges: Option<Vec<String>>,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub risk: Option<RiskCaps>,
}

impl BacktestConfig {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            base_currency: default_base_currency(),
            initial_cash: default_initial_cash(),
            spread_bps: default_spread_bps(),
            seed: default_seed(),
            exchanges: None,
            execution: ExecutionConfig::default(),
            risk: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid backtest config: {0}")]
    Config(String),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("strategy failed: {0}")]
    Strategy(#[from] StrategyError),
    #[error(transparent)]
    Clock(#[from] ClockError),
    #[error(transparent)]
    Calendar(#[from] CalendarError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub metrics: RunMetrics,
}

// ─── Driver ──────────────────────────────────────────────────────────

/// Static attributes the driver needs per symbol.
#[derive(Debug, Clone)]
struct Listing {
    venue: String,
    currency: String,
}

pub struct Backtest {
    config: BacktestConfig,
    reader: PitDataReader,
    actions: Arc<CorporateActionStore>,
    calendar: Arc<dyn TradingCalendar>,
    costs: Option<Arc<dyn CostCalculator>>,
}

impl Backtest {
    pub fn new(
        config: BacktestConfig,
        reader: PitDataReader,
        actions: Arc<CorporateActionStore>,
        calendar: Arc<dyn TradingCalendar>,
    ) -> Self {
        Self {
            config,
            reader,
            actions,
            calendar,
            costs: None,
        }
    }

    pub fn with_costs(mut self, costs: Arc<dyn CostCalculator>) -> Self {
        self.costs = Some(costs);
        self
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Canonical parameters identifying a run of `strategy_name`.
    pub fn params(&self, strategy_name: &str) -> serde_json::Value {
        json!({
            "strategy": strategy_name,
            "start": self.config.start,
            "end": self.config.end,
            "base_currency": self.config.base_currency,
            "seed": self.config.seed,
            "config": self.config,
            "has_costs": self.costs.is_some(),
        })
    }

    pub fn run_id(&self, strategy_name: &str) -> RunId {
        RunId::from_canonical(&self.params(strategy_name))
    }

    pub fn run(&self, strategy: &mut dyn Strategy, sink: &mut dyn ArtifactSink) -> Result<RunSummary, EngineError> {
        let cfg = &self.config;
        if cfg.start > cfg.end {
            return Err(EngineError::Config(format!("start {} is after end {}", cfg.start, cfg.end)));
        }
        let params = self.params(strategy.name());
        let run_id = RunId::from_canonical(&params);
        info!(run_id = %run_id.short(12), strategy = strategy.name(), start = %cfg.start, end = %cfg.end, "backtest started");

        let listings = self.listings();
        let exchanges = match &cfg.exchanges {
            Some(list) => list.clone(),
            None => listings.values().map(|l| l.venue.clone()).filter(|v| v != UNKNOWN_VENUE).collect(),
        };
        let clock = Clock::new(exchanges, Arc::clone(&self.calendar))?.with_horizon(cfg.end);
        let mut queue = EventQueue::new();
        clock.seed(&mut queue, cfg.start);
        self.seed_market_events(&mut queue);

        let mut simulator = ExecutionSimulator::new(&cfg.execution).with_calendar(Arc::clone(&self.calendar));
        if let Some(costs) = &self.costs {
            simulator = simulator.with_costs(Arc::clone(costs));
        }

        let mut state = RunState {
            portfolio: Portfolio::new(cfg.base_currency.clone()),
            book: OrderBook::new(),
            risk: RiskManager::new(cfg.risk.unwrap_or_default()),
            rng: SeedHierarchy::new(cfg.seed).rng_for(&run_id, strategy.name(), 0),
            marks: BTreeMap::new(),
            equity: Vec::new(),
            num_orders: 0,
            num_fills: 0,
        };
        state.portfolio.deposit(cfg.initial_cash, &cfg.base_currency);

        strategy.on_start(&mut self.context(cfg.start, &mut state))?;

        let mut last_ts = cfg.start;
        while !queue.is_empty() {
            let batch = queue.pop_batch();
            let Some(ts) = batch.first().map(|e| e.ts) else {
                break;
            };
            last_ts = ts;
            let mut bars_now: BTreeMap<SymbolId, Bar> = BTreeMap::new();
            let mut closing: Vec<String> = Vec::new();
            for event in &batch {
                self.apply_event(event, &clock, &mut queue, &mut state, &mut bars_now, &mut closing)?;
                strategy.on_event(event, &mut self.context(ts, &mut state))?;
            }
            self.match_orders(ts, &bars_now, &listings, &simulator, &mut state, sink)?;
            if !closing.is_empty() {
                expire_day_orders(ts, &closing, &listings, &mut state, sink)?;
            }
            if !bars_now.is_empty() {
                self.snapshot(ts, &mut state, sink)?;
            }
        }

        strategy.on_end(&mut self.context(last_ts, &mut state))?;
        // Orders canceled in on_end still get their final log row.
        for order in state.book.drain_terminal() {
            sink.record_order(OrderRecord::snapshot(last_ts, &order))?;
            state.num_orders += 1;
        }

        let metrics = RunMetrics::from_equity(&state.equity, state.num_orders, state.num_fills);
        let manifest = RunManifest {
            run_id: run_id.clone(),
            params_hash: run_id.0.clone(),
            params,
        };
        sink.finish(&metrics, &manifest)?;
        info!(
            run_id = %run_id.short(12),
            final_equity = metrics.final_equity,
            total_return = metrics.total_return,
            orders = metrics.num_orders,
            fills = metrics.num_fills,
            "backtest finished"
        );
        Ok(RunSummary { run_id, metrics })
    }

    fn context<'a>(&'a self, now: DateTime<Utc>, state: &'a mut RunState) -> Context<'a> {
        Context::new(
            now,
            &self.reader,
            &state.portfolio,
            &mut state.book,
            &mut state.risk,
            self.calendar.as_ref(),
            &mut state.rng,
        )
    }

    fn listings(&self) -> BTreeMap<SymbolId, Listing> {
        // Records are sorted by (id, active_from), so later listings win.
        self.reader
            .symbol_master()
            .records()
            .iter()
            .map(|r| {
                (
                    r.symbol_id,
                    Listing {
                        venue: r.exchange.clone(),
                        currency: r.currency.clone(),
                    },
                )
            })
            .collect()
    }

    fn seed_market_events(&self, queue: &mut EventQueue<MarketEvent>) {
        let (start, end) = (self.config.start, self.config.end);
        for bar in self.reader.bars_store().bars_between(start, end) {
            queue.push(bar.ts, EventKind::Bar, MarketEvent::Bar(bar.clone()));
        }
        for rate in self.reader.fx_table().rates_between(start, end) {
            queue.push(rate.ts, EventKind::Fx, MarketEvent::Fx(rate.clone()));
        }
        for action in self.actions.actions_between(start.date_naive(), end.date_naive()) {
            let ts = action.effective_date.and_time(NaiveTime::MIN).and_utc().max(start);
            queue.push(ts, EventKind::CorporateAction, MarketEvent::CorporateAction(action.clone()));
        }
    }

    fn apply_event(
        &self,
        event: &Event<MarketEvent>,
        clock: &Clock,
        queue: &mut EventQueue<MarketEvent>,
        state: &mut RunState,
        bars_now: &mut BTreeMap<SymbolId, Bar>,
        closing: &mut Vec<String>,
    ) -> Result<(), EngineError> {
        match &event.payload {
            MarketEvent::Clock(ClockEvent::Start) => clock.advance(queue, event.ts)?,
            MarketEvent::Clock(ClockEvent::Session { exchange, boundary }) => {
                clock.advance_exchange(queue, exchange, event.ts)?;
                if *boundary == Boundary::Close {
                    closing.push(exchange.clone());
                }
            }
            MarketEvent::Bar(bar) => {
                state.marks.insert(bar.symbol_id, bar.close);
                bars_now.insert(bar.symbol_id, bar.clone());
            }
            MarketEvent::Fx(_) => {}
            MarketEvent::CorporateAction(action) => {
                let dividend = state.portfolio.process_actions_for_symbol(
                    action.symbol_id,
                    self.actions.actions_for(action.symbol_id),
                    event.ts,
                );
                if dividend != 0.0 {
                    info!(symbol = %action.symbol_id, dividend, "dividend credited");
                }
            }
        }
        Ok(())
    }

    fn match_orders(
        &self,
        ts: DateTime<Utc>,
        bars_now: &BTreeMap<SymbolId, Bar>,
        listings: &BTreeMap<SymbolId, Listing>,
        simulator: &ExecutionSimulator,
        state: &mut RunState,
        sink: &mut dyn ArtifactSink,
    ) -> Result<(), EngineError> {
        let RunState {
            portfolio,
            book,
            risk,
            num_orders,
            num_fills,
            ..
        } = state;
        for order in book.orders_mut().iter_mut() {
            if order.is_terminal() {
                // Canceled by the strategy or at an exchange close since the last cycle.
                sink.record_order(OrderRecord::snapshot(ts, order))?;
                *num_orders += 1;
                continue;
            }
            // No tradable quote without a positive close.
            let Some(bar) = bars_now
                .get(&order.symbol_id)
                .filter(|b| b.close > 0.0 && b.close.is_finite())
            else {
                let before = order.state();
                order.handle_end_of_cycle();
                if order.state() != before {
                    sink.record_order(OrderRecord::snapshot(ts, order))?;
                    *num_orders += 1;
                }
                continue;
            };

            let (venue, currency) = match listings.get(&order.symbol_id) {
                Some(l) => (l.venue.as_str(), l.currency.as_str()),
                None => (UNKNOWN_VENUE, self.config.base_currency.as_str()),
            };
            order.acknowledge();
            self.fill_order(ts, order, bar, venue, currency, simulator, portfolio, risk, num_fills, sink)?;
            sink.record_order(OrderRecord::snapshot(ts, order))?;
            *num_orders += 1;
        }
        book.drain_terminal();
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn fill_order(
        &self,
        ts: DateTime<Utc>,
        order: &mut Order,
        bar: &Bar,
        venue: &str,
        currency: &str,
        simulator: &ExecutionSimulator,
        portfolio: &mut Portfolio,
        risk: &RiskManager,
        num_fills: &mut usize,
        sink: &mut dyn ArtifactSink,
    ) -> Result<(), EngineError> {
        let fx = portfolio.rate_to_base(currency, ts, &self.reader)?;
        let signed_qty = order.side.sign() * order.remaining() as f64;
        if let Err(violation) = risk.check(portfolio, order.symbol_id, bar.close, signed_qty, fx) {
            warn!(order = %order.id, %violation, "order rejected by risk");
            order.reject();
            return Ok(());
        }

        let quote = Quote::from_close(bar.close, self.config.spread_bps);
        let available = bar.volume.max(order.remaining());
        let execution = match simulator.simulate(&order.remaining_clone(), &quote, venue, available, Some(ts)) {
            Ok(execution) => execution,
            Err(e) => {
                warn!(order = %order.id, error = %e, "order rejected by execution");
                order.reject();
                return Ok(());
            }
        };

        let before = order.filled_quantity();
        for fill in &execution.fills {
            order.add_fill(fill.quantity);
        }
        order.handle_end_of_cycle();
        let mut delta = order.filled_quantity().saturating_sub(before);
        if delta == 0 {
            return Ok(());
        }

        for fill in &execution.fills {
            let qty = fill.quantity.min(delta);
            if qty == 0 {
                break;
            }
            delta -= qty;
            portfolio.apply_fill(order.symbol_id, currency, order.side, qty as f64, fill.price);
            debug!(order = %order.id, qty, price = fill.price, cost = execution.cost, "fill applied");
            sink.record_fill(FillRecord {
                ts,
                order_id: order.id,
                symbol_id: order.symbol_id,
                price: fill.price,
                quantity: qty,
                venue: venue.to_string(),
                cost: execution.cost,
            })?;
            *num_fills += 1;
        }
        portfolio.apply_transaction_cost(currency, execution.cost);
        Ok(())
    }

    fn snapshot(&self, ts: DateTime<Utc>, state: &mut RunState, sink: &mut dyn ArtifactSink) -> Result<(), EngineError> {
        let equity = state.portfolio.total_value(ts, &state.marks, &self.reader)?;
        let record = EquityRecord { ts, equity };
        sink.record_equity(record.clone())?;
        state.equity.push(record);
        for position in state.portfolio.positions() {
            sink.record_position(PositionRecord::snapshot(ts, position))?;
        }
        Ok(())
    }
}

/// Cancel DAY orders listed on a closing exchange. Runs after the matching
/// cycle, so orders still get the bar printed at the close.
fn expire_day_orders(
    ts: DateTime<Utc>,
    closing: &[String],
    listings: &BTreeMap<SymbolId, Listing>,
    state: &mut RunState,
    sink: &mut dyn ArtifactSink,
) -> Result<(), EngineError> {
    let expired = state.book.cancel_where(|o| {
        o.tif == TimeInForce::Day
            && listings
                .get(&o.symbol_id)
                .map_or(false, |l| closing.iter().any(|ex| *ex == l.venue))
    });
    if expired.is_empty() {
        return Ok(());
    }
    debug!(count = expired.len(), exchanges = ?closing, "DAY orders expired at close");
    for order in state.book.drain_terminal() {
        sink.record_order(OrderRecord::snapshot(ts, &order))?;
        state.num_orders += 1;
    }
    Ok(())
}

/// Mutable state of one run.
struct RunState {
    portfolio: Portfolio,
    book: OrderBook,
    risk: RiskManager,
    rng: StdRng,
    marks: BTreeMap<SymbolId, f64>,
    equity: Vec<EquityRecord>,
    num_orders: usize,
    num_fills: usize,
}
