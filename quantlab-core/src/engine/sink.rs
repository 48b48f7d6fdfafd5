//! Artifact records emitted by the driver and the sink trait that stores them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Order, OrderId, OrderSide, OrderState, OrderType, RunId, SymbolId, TimeInForce};
use crate::portfolio::Position;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SinkError {
    #[error("artifact write failed: {0}")]
    Write(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityRecord {
    pub ts: DateTime<Utc>,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub ts: DateTime<Utc>,
    pub order_id: OrderId,
    pub symbol_id: SymbolId,
    pub side: OrderSide,
    pub quantity: u64,
    pub order_type: OrderType,
    pub tif: TimeInForce,
    pub limit_price: Option<f64>,
    pub state: OrderState,
}

impl OrderRecord {
    pub fn snapshot(ts: DateTime<Utc>, order: &Order) -> Self {
        Self {
            ts,
            order_id: order.id,
            symbol_id: order.symbol_id,
            side: order.side,
            quantity: order.quantity,
            order_type: order.order_type,
            tif: order.tif,
            limit_price: order.limit_price,
            state: order.state(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillRecord {
    pub ts: DateTime<Utc>,
    pub order_id: OrderId,
    pub symbol_id: SymbolId,
    pub price: f64,
    pub quantity: u64,
    pub venue: String,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub ts: DateTime<Utc>,
    pub symbol_id: SymbolId,
    pub currency: String,
    pub quantity: f64,
    pub average_price: f64,
}

impl PositionRecord {
    pub fn snapshot(ts: DateTime<Utc>, position: &Position) -> Self {
        Self {
            ts,
            symbol_id: position.symbol_id,
            currency: position.currency.clone(),
            quantity: position.quantity,
            average_price: position.average_price,
        }
    }
}

/// Summary metrics of a single run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub final_equity: f64,
    pub start_equity: f64,
    #[serde(rename = "return")]
    pub total_return: f64,
    pub num_orders: usize,
    pub num_fills: usize,
}

impl RunMetrics {
    pub fn from_equity(equity: &[EquityRecord], num_orders: usize, num_fills: usize) -> Self {
        let start_equity = equity.first().map_or(0.0, |e| e.equity);
        let final_equity = equity.last().map_or(0.0, |e| e.equity);
        let total_return = if start_equity != 0.0 {
            final_equity / start_equity - 1.0
        } else {
            0.0
        };
        Self {
            final_equity,
            start_equity,
            total_return,
            num_orders,
            num_fills,
        }
    }
}

/// Identity of a run. Contains no wall-clock data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: RunId,
    pub params_hash: String,
    pub params: serde_json::Value,
}

/// Destination for run artifacts.
pub trait ArtifactSink {
    fn record_equity(&mut self, record: EquityRecord) -> Result<(), SinkError>;
    fn record_order(&mut self, record: OrderRecord) -> Result<(), SinkError>;
    fn record_fill(&mut self, record: FillRecord) -> Result<(), SinkError>;
    fn record_position(&mut self, record: PositionRecord) -> Result<(), SinkError>;
    /// Called once after the last record.
    fn finish(&mut self, metrics: &RunMetrics, manifest: &RunManifest) -> Result<(), SinkError>;
}

/// Keeps every record in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySink {
    pub equity: Vec<EquityRecord>,
    pub orders: Vec<OrderRecord>,
    pub fills: Vec<FillRecord>,
    pub positions: Vec<PositionRecord>,
    pub metrics: Option<RunMetrics>,
    pub manifest: Option<RunManifest>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactSink for MemorySink {
    fn record_equity(&mut self, record: EquityRecord) -> Result<(), SinkError> {
        self.equity.push(record);
        Ok(())
    }

    fn record_order(&mut self, record: OrderRecord) -> Result<(), SinkError> {
        self.orders.push(record);
        Ok(())
    }

    fn record_fill(&mut self, record: FillRecord) -> Result<(), SinkError> {
        self.fills.push(record);
        Ok(())
    }

    fn record_position(&mut self, record: PositionRecord) -> Result<(), SinkError> {
        self.positions.push(record);
        Ok(())
    }

    fn finish(&mut self, metrics: &RunMetrics, manifest: &RunManifest) -> Result<(), SinkError> {
        self.metrics = Some(metrics.clone());
        self.manifest = Some(manifest.clone());
        Ok(())
    }
}
