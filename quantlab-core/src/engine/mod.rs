//! Event-driven backtesting engine.
//!
//! - `events`: deterministic priority queue
//! - `clock`: exchange open/close boundaries
//! - `book`: per-run working orders
//! - `risk`: pre-trade caps
//! - `sink`: artifact records and their destination
//! - `backtest`: the driver tying it all together

pub mod backtest;
pub mod book;
pub mod clock;
pub mod events;
pub mod risk;
pub mod sink;

pub use backtest::{Backtest, BacktestConfig, EngineError, MarketEvent, RunSummary, UNKNOWN_VENUE};
pub use book::{CancelTarget, OrderBook};
pub use clock::{Boundary, Clock, ClockError, ClockEvent};
pub use events::{Event, EventHandle, EventKind, EventQueue, QueueError};
pub use risk::{RiskCaps, RiskManager, RiskUpdate, RiskViolation};
pub use sink::{
    ArtifactSink, EquityRecord, FillRecord, MemorySink, OrderRecord, PositionRecord, RunManifest, RunMetrics,
    SinkError,
};
