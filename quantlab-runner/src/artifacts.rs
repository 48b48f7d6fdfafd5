//! On-disk artifact writer for a single run.
//!
//! Writes into one directory:
//! - `equity.csv`: `ts, equity`
//! - `orders.csv`: `ts, order_id, symbol_id, side, quantity, type, tif, limit_price, state`
//! - `fills.csv`: `ts, order_id, symbol_id, price, quantity, venue, cost`
//! - `positions.csv`: `ts, symbol_id, currency, quantity, average_price`
//! - `metrics.json`: driver metrics plus Sharpe and drawdown
//! - `run_manifest.json`: run ID, params hash and parameters
//!
//! Rows are buffered in memory and flushed by `finish`. Timestamps are
//! ISO-8601 UTC with a `Z` suffix. Nothing time-of-writing dependent is
//! recorded, so identical runs produce byte-identical files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

use quantlab_core::engine::{
    ArtifactSink, EquityRecord, FillRecord, OrderRecord, PositionRecord, RunManifest, RunMetrics,
    SinkError,
};

use crate::metrics::PerformanceMetrics;

pub const EQUITY_CSV: &str = "equity.csv";
pub const ORDERS_CSV: &str = "orders.csv";
pub const FILLS_CSV: &str = "fills.csv";
pub const POSITIONS_CSV: &str = "positions.csv";
pub const METRICS_JSON: &str = "metrics.json";
pub const MANIFEST_JSON: &str = "run_manifest.json";

pub(crate) fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn sink_err(e: anyhow::Error) -> SinkError {
    SinkError::Write(format!("{e:#}"))
}

fn new_table(header: &[&str]) -> Result<csv::Writer<Vec<u8>>> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(header)?;
    Ok(wtr)
}

fn flush_table(wtr: &mut csv::Writer<Vec<u8>>, path: &Path) -> Result<()> {
    wtr.flush().context("failed to flush CSV writer")?;
    std::fs::write(path, wtr.get_ref())
        .with_context(|| format!("failed to write {}", path.display()))
}

/// Write a value as pretty JSON.
pub(crate) fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize {}", path.display()))?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

/// [`ArtifactSink`] that lays a run out as CSV and JSON files.
pub struct CsvArtifactWriter {
    dir: PathBuf,
    equity: csv::Writer<Vec<u8>>,
    orders: csv::Writer<Vec<u8>>,
    fills: csv::Writer<Vec<u8>>,
    positions: csv::Writer<Vec<u8>>,
    curve: Vec<f64>,
    metrics: Option<PerformanceMetrics>,
}

impl std::fmt::Debug for CsvArtifactWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvArtifactWriter")
            .field("dir", &self.dir)
            .field("snapshots", &self.curve.len())
            .finish()
    }
}

impl CsvArtifactWriter {
    /// Create `dir` (and parents) and prepare the tables.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create artifact dir: {}", dir.display()))?;
        Ok(Self {
            equity: new_table(&["ts", "equity"])?,
            orders: new_table(&[
                "ts",
                "order_id",
                "symbol_id",
                "side",
                "quantity",
                "type",
                "tif",
                "limit_price",
                "state",
            ])?,
            fills: new_table(&["ts", "order_id", "symbol_id", "price", "quantity", "venue", "cost"])?,
            positions: new_table(&["ts", "symbol_id", "currency", "quantity", "average_price"])?,
            dir,
            curve: Vec::new(),
            metrics: None,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Metrics written by `finish`, if it has run.
    pub fn metrics(&self) -> Option<&PerformanceMetrics> {
        self.metrics.as_ref()
    }

    fn flush_all(&mut self, metrics: &PerformanceMetrics, manifest: &RunManifest) -> Result<()> {
        flush_table(&mut self.equity, &self.dir.join(EQUITY_CSV))?;
        flush_table(&mut self.orders, &self.dir.join(ORDERS_CSV))?;
        flush_table(&mut self.fills, &self.dir.join(FILLS_CSV))?;
        flush_table(&mut self.positions, &self.dir.join(POSITIONS_CSV))?;
        write_json(&self.dir.join(METRICS_JSON), metrics)?;
        write_json(&self.dir.join(MANIFEST_JSON), manifest)
    }
}

impl ArtifactSink for CsvArtifactWriter {
    fn record_equity(&mut self, record: EquityRecord) -> Result<(), SinkError> {
        self.curve.push(record.equity);
        self.equity
            .write_record([iso(record.ts), record.equity.to_string()])
            .context("failed to write equity row")
            .map_err(sink_err)
    }

    fn record_order(&mut self, r: OrderRecord) -> Result<(), SinkError> {
        self.orders
            .write_record([
                iso(r.ts),
                r.order_id.to_string(),
                r.symbol_id.0.to_string(),
                r.side.as_str().to_string(),
                r.quantity.to_string(),
                r.order_type.as_str().to_string(),
                r.tif.as_str().to_string(),
                r.limit_price.map(|p| p.to_string()).unwrap_or_default(),
                r.state.as_str().to_string(),
            ])
            .context("failed to write order row")
            .map_err(sink_err)
    }

    fn record_fill(&mut self, r: FillRecord) -> Result<(), SinkError> {
        self.fills
            .write_record([
                iso(r.ts),
                r.order_id.to_string(),
                r.symbol_id.0.to_string(),
                r.price.to_string(),
                r.quantity.to_string(),
                r.venue,
                r.cost.to_string(),
            ])
            .context("failed to write fill row")
            .map_err(sink_err)
    }

    fn record_position(&mut self, r: PositionRecord) -> Result<(), SinkError> {
        self.positions
            .write_record([
                iso(r.ts),
                r.symbol_id.0.to_string(),
                r.currency,
                r.quantity.to_string(),
                r.average_price.to_string(),
            ])
            .context("failed to write position row")
            .map_err(sink_err)
    }

    fn finish(&mut self, metrics: &RunMetrics, manifest: &RunManifest) -> Result<(), SinkError> {
        let full = PerformanceMetrics::compute(metrics, &self.curve);
        self.flush_all(&full, manifest).map_err(sink_err)?;
        self.metrics = Some(full);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use quantlab_core::domain::{OrderId, OrderSide, OrderState, OrderType, RunId, SymbolId, TimeInForce};

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 21, 0, 0).unwrap()
    }

    #[test]
    fn iso_uses_z_suffix() {
        assert_eq!(iso(ts(2)), "2024-01-02T21:00:00Z");
    }

    #[test]
    fn writes_every_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("run");
        let mut w = CsvArtifactWriter::create(&dir).unwrap();

        w.record_equity(EquityRecord { ts: ts(2), equity: 100.0 }).unwrap();
        w.record_equity(EquityRecord { ts: ts(3), equity: 90.0 }).unwrap();
        w.record_order(OrderRecord {
            ts: ts(2),
            order_id: OrderId(1),
            symbol_id: SymbolId(7),
            side: OrderSide::Buy,
            quantity: 10,
            order_type: OrderType::Limit,
            tif: TimeInForce::Day,
            limit_price: Some(10.5),
            state: OrderState::Filled,
        })
        .unwrap();
        w.record_fill(FillRecord {
            ts: ts(2),
            order_id: OrderId(1),
            symbol_id: SymbolId(7),
            price: 10.25,
            quantity: 10,
            venue: "XNYS".into(),
            cost: 0.05,
        })
        .unwrap();

        let run = RunMetrics {
            final_equity: 90.0,
            start_equity: 100.0,
            total_return: -0.1,
            num_orders: 1,
            num_fills: 1,
        };
        let manifest = RunManifest {
            run_id: RunId("abc".into()),
            params_hash: "abc".into(),
            params: serde_json::json!({"strategy": "t"}),
        };
        w.finish(&run, &manifest).unwrap();

        let equity = std::fs::read_to_string(dir.join(EQUITY_CSV)).unwrap();
        assert_eq!(equity, "ts,equity\n2024-01-02T21:00:00Z,100\n2024-01-03T21:00:00Z,90\n");

        let orders = std::fs::read_to_string(dir.join(ORDERS_CSV)).unwrap();
        assert!(orders.starts_with("ts,order_id,symbol_id,side,quantity,type,tif,limit_price,state\n"));
        assert!(orders.contains("order_1,7,BUY,10,LMT,DAY,10.5,FILLED"));

        let fills = std::fs::read_to_string(dir.join(FILLS_CSV)).unwrap();
        assert!(fills.contains("2024-01-02T21:00:00Z,order_1,7,10.25,10,XNYS,0.05"));

        let positions = std::fs::read_to_string(dir.join(POSITIONS_CSV)).unwrap();
        assert_eq!(positions, "ts,symbol_id,currency,quantity,average_price\n");

        let metrics: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join(METRICS_JSON)).unwrap()).unwrap();
        assert_eq!(metrics["return"], -0.1);
        assert!((metrics["max_drawdown"].as_f64().unwrap() + 0.1).abs() < 1e-12);

        let m: RunManifest =
            serde_json::from_str(&std::fs::read_to_string(dir.join(MANIFEST_JSON)).unwrap()).unwrap();
        assert_eq!(m, manifest);
        assert_eq!(w.metrics().unwrap().run, run);
    }

    #[test]
    fn market_orders_leave_limit_blank() {
        let tmp = tempfile::tempdir().unwrap();
        let mut w = CsvArtifactWriter::create(tmp.path()).unwrap();
        w.record_order(OrderRecord {
            ts: ts(2),
            order_id: OrderId(3),
            symbol_id: SymbolId(1),
            side: OrderSide::Sell,
            quantity: 5,
            order_type: OrderType::Market,
            tif: TimeInForce::Ioc,
            limit_price: None,
            state: OrderState::Canceled,
        })
        .unwrap();
        w.finish(&RunMetrics::default(), &RunManifest {
            run_id: RunId("x".into()),
            params_hash: "x".into(),
            params: serde_json::Value::Null,
        })
        .unwrap();
        let orders = std::fs::read_to_string(tmp.path().join(ORDERS_CSV)).unwrap();
        assert!(orders.contains("order_3,1,SELL,5,MKT,IOC,,CANCELED"));
    }
}
