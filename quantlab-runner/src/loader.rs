//! CSV ingestion for bars, symbols, FX rates and corporate actions.
//!
//! Bars files carry one row per symbol per session date:
//! `dt, symbol_id, open, high, low, close, volume`. Each row is stamped with
//! the UTC close of its exchange session on `dt` (rows dated on a closed day
//! take the next session's close). Rows with an empty or `nan` field are
//! skipped and reported by index; session days between the first and last
//! date that have no row at all are reported as missing.
//!
//! [`Dataset`] bundles the loaded stores behind `Arc`s so parallel folds and
//! trials share one copy.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use quantlab_core::calendar::{CalendarError, TradingCalendar};
use quantlab_core::data::{BarsStore, CorporateActionStore, FxTable, PitDataReader, SymbolMaster};
use quantlab_core::domain::{Bar, CorporateAction, FxRate, SymbolId, SymbolRecord};
use quantlab_core::engine::{Backtest, BacktestConfig};
use quantlab_core::execution::{CostCalculator, CostError, CostProfiles};

use crate::config::RunConfig;

const BAR_COLUMNS: [&str; 7] = ["dt", "symbol_id", "open", "high", "low", "close", "volume"];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing required columns: {0:?}")]
    MissingColumns(Vec<String>),
    #[error("row {row}: invalid {column} value {value:?}")]
    Parse {
        row: usize,
        column: String,
        value: String,
    },
    #[error(transparent)]
    Calendar(#[from] CalendarError),
    #[error(transparent)]
    Cost(#[from] CostError),
}

/// Data-quality findings from a bars file. Neither is fatal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Session days in `[min dt, max dt]` with no row.
    pub missing_dates: Vec<NaiveDate>,
    /// Zero-based indices of skipped rows with empty or `nan` fields.
    pub nan_rows: Vec<usize>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.missing_dates.is_empty() && self.nan_rows.is_empty()
    }
}

fn open_file(path: &Path) -> Result<File, LoadError> {
    File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ─── Bars ────────────────────────────────────────────────────────────

/// Parse a float cell; `None` for empty or `nan`.
fn nullable(value: &str) -> Option<&str> {
    let v = value.trim();
    if v.is_empty() || v.eq_ignore_ascii_case("nan") {
        None
    } else {
        Some(v)
    }
}

fn parse_err(row: usize, column: &str, value: &str) -> LoadError {
    LoadError::Parse {
        row,
        column: column.to_string(),
        value: value.to_string(),
    }
}

fn parse_volume(row: usize, raw: &str) -> Result<u64, LoadError> {
    if let Ok(v) = raw.parse::<u64>() {
        return Ok(v);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v as u64),
        _ => Err(parse_err(row, "volume", raw)),
    }
}

/// Close of the session on `dt`; rows dated on a closed day take the next close.
fn session_close(
    calendar: &dyn TradingCalendar,
    exchange: &str,
    dt: NaiveDate,
) -> Result<DateTime<Utc>, LoadError> {
    if let Some(session) = calendar.session(exchange, dt)? {
        return Ok(session.close);
    }
    let noon = dt.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN));
    Ok(calendar.next_close(exchange, noon.and_utc())?)
}

/// Load a daily bars file for one exchange.
pub fn load_daily_bars_csv(
    path: &Path,
    exchange: &str,
    calendar: &dyn TradingCalendar,
) -> Result<(Vec<Bar>, LoadReport), LoadError> {
    let (bars, report) = read_daily_bars(open_file(path)?, exchange, calendar)?;
    if !report.is_clean() {
        warn!(
            path = %path.display(),
            exchange,
            missing_dates = report.missing_dates.len(),
            nan_rows = report.nan_rows.len(),
            "bars file has gaps"
        );
    }
    Ok((bars, report))
}

/// Same as [`load_daily_bars_csv`] over any reader.
pub fn read_daily_bars<R: Read>(
    source: R,
    exchange: &str,
    calendar: &dyn TradingCalendar,
) -> Result<(Vec<Bar>, LoadReport), LoadError> {
    let mut rdr = csv::Reader::from_reader(source);
    let headers = rdr.headers()?.clone();
    let missing: Vec<String> = BAR_COLUMNS
        .iter()
        .filter(|c| !headers.iter().any(|h| h.trim() == **c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(LoadError::MissingColumns(missing));
    }
    let col = |name: &str| headers.iter().position(|h| h.trim() == name).unwrap_or(0);
    let idx: Vec<usize> = BAR_COLUMNS.iter().map(|c| col(c)).collect();

    let mut bars = Vec::new();
    let mut report = LoadReport::default();
    let mut seen: BTreeSet<NaiveDate> = BTreeSet::new();

    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        let cell = |i: usize| record.get(idx[i]).unwrap_or("");

        let dt_raw = cell(0).trim();
        let dt = NaiveDate::parse_from_str(dt_raw, "%Y-%m-%d")
            .map_err(|_| parse_err(row, "dt", dt_raw))?;
        seen.insert(dt);

        let id_raw = cell(1).trim();
        let symbol_id = id_raw
            .parse::<u64>()
            .map_err(|_| parse_err(row, "symbol_id", id_raw))?;

        let mut prices = [0.0_f64; 4];
        let mut has_nan = false;
        for (slot, i) in prices.iter_mut().zip(2..6) {
            match nullable(cell(i)) {
                Some(v) => {
                    *slot = v.parse().map_err(|_| parse_err(row, BAR_COLUMNS[i], v))?;
                }
                None => has_nan = true,
            }
        }
        let volume = match nullable(cell(6)) {
            Some(v) => parse_volume(row, v)?,
            None => {
                has_nan = true;
                0
            }
        };
        if has_nan {
            report.nan_rows.push(row);
            continue;
        }

        let [open, high, low, close] = prices;
        if !(close > 0.0) || !close.is_finite() {
            return Err(parse_err(row, "close", cell(5).trim()));
        }
        let ts = session_close(calendar, exchange, dt)?;
        bars.push(Bar {
            ts,
            symbol_id: SymbolId(symbol_id),
            open,
            high,
            low,
            close,
            volume,
            session_date: dt,
        });
    }

    if let (Some(&first), Some(&last)) = (seen.first(), seen.last()) {
        let mut day = first;
        while day <= last {
            if !seen.contains(&day) && calendar.session(exchange, day)?.is_some() {
                report.missing_dates.push(day);
            }
            day += Duration::days(1);
        }
    }

    Ok((bars, report))
}

// ─── Reference data ──────────────────────────────────────────────────

/// Accepts RFC 3339 instants or bare dates (midnight UTC).
fn parse_instant(row: usize, column: &str, raw: &str) -> Result<DateTime<Utc>, LoadError> {
    let v = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(v) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(v, "%Y-%m-%d")
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .map_err(|_| parse_err(row, column, v))
}

#[derive(Debug, Deserialize)]
struct SymbolRow {
    symbol_id: u64,
    ticker: String,
    exchange: String,
    currency: String,
    active_from: String,
    #[serde(default)]
    active_to: Option<String>,
}

/// Columns: `symbol_id, ticker, exchange, currency, active_from, active_to`.
pub fn read_symbols<R: Read>(source: R) -> Result<Vec<SymbolRecord>, LoadError> {
    let mut rdr = csv::Reader::from_reader(source);
    let mut out = Vec::new();
    for (row, rec) in rdr.deserialize::<SymbolRow>().enumerate() {
        let rec = rec?;
        let active_to = match rec.active_to.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(v) => Some(parse_instant(row, "active_to", v)?),
        };
        out.push(SymbolRecord {
            symbol_id: SymbolId(rec.symbol_id),
            ticker: rec.ticker,
            exchange: rec.exchange,
            currency: rec.currency,
            active_from: parse_instant(row, "active_from", &rec.active_from)?,
            active_to,
        });
    }
    Ok(out)
}

pub fn load_symbols_csv(path: &Path) -> Result<Vec<SymbolRecord>, LoadError> {
    read_symbols(open_file(path)?)
}

#[derive(Debug, Deserialize)]
struct FxRow {
    ts: String,
    base: String,
    quote: String,
    rate: f64,
}

/// Columns: `ts, base, quote, rate`.
pub fn read_fx<R: Read>(source: R) -> Result<Vec<FxRate>, LoadError> {
    let mut rdr = csv::Reader::from_reader(source);
    let mut out = Vec::new();
    for (row, rec) in rdr.deserialize::<FxRow>().enumerate() {
        let rec = rec?;
        if !rec.rate.is_finite() || rec.rate <= 0.0 {
            return Err(parse_err(row, "rate", &rec.rate.to_string()));
        }
        out.push(FxRate {
            ts: parse_instant(row, "ts", &rec.ts)?,
            base: rec.base,
            quote: rec.quote,
            rate: rec.rate,
        });
    }
    Ok(out)
}

pub fn load_fx_csv(path: &Path) -> Result<Vec<FxRate>, LoadError> {
    read_fx(open_file(path)?)
}

#[derive(Debug, Deserialize)]
struct ActionRow {
    symbol_id: u64,
    effective_date: NaiveDate,
    #[serde(default)]
    split_ratio: Option<f64>,
    #[serde(default)]
    dividend_cash_per_share: Option<f64>,
    currency: String,
}

/// Columns: `symbol_id, effective_date, split_ratio, dividend_cash_per_share, currency`.
///
/// Empty ratio / dividend cells read as the no-op values 1.0 / 0.0.
pub fn read_corporate_actions<R: Read>(source: R) -> Result<Vec<CorporateAction>, LoadError> {
    let mut rdr = csv::Reader::from_reader(source);
    let mut out = Vec::new();
    for rec in rdr.deserialize::<ActionRow>() {
        let rec = rec?;
        out.push(CorporateAction {
            symbol_id: SymbolId(rec.symbol_id),
            effective_date: rec.effective_date,
            split_ratio: rec.split_ratio.unwrap_or(1.0),
            dividend: rec.dividend_cash_per_share.unwrap_or(0.0),
            currency: rec.currency,
        });
    }
    Ok(out)
}

pub fn load_corporate_actions_csv(path: &Path) -> Result<Vec<CorporateAction>, LoadError> {
    read_corporate_actions(open_file(path)?)
}

// ─── Dataset ─────────────────────────────────────────────────────────

/// Immutable inputs shared by every run over the same data.
#[derive(Clone)]
pub struct Dataset {
    pub bars: Arc<BarsStore>,
    pub fx: Arc<FxTable>,
    pub symbols: Arc<SymbolMaster>,
    pub actions: Arc<CorporateActionStore>,
    pub calendar: Arc<dyn TradingCalendar>,
    pub costs: Option<Arc<dyn CostCalculator>>,
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("bars", &self.bars.len())
            .field("fx", &self.fx.len())
            .field("symbols", &self.symbols.records().len())
            .field("has_costs", &self.costs.is_some())
            .finish()
    }
}

impl Dataset {
    pub fn new(
        bars: Vec<Bar>,
        fx: Vec<FxRate>,
        symbols: Vec<SymbolRecord>,
        actions: Vec<CorporateAction>,
        calendar: Arc<dyn TradingCalendar>,
    ) -> Self {
        Self {
            bars: Arc::new(BarsStore::from_bars(bars)),
            fx: Arc::new(FxTable::from_rates(fx)),
            symbols: Arc::new(SymbolMaster::from_records(symbols)),
            actions: Arc::new(CorporateActionStore::from_actions(actions)),
            calendar,
            costs: None,
        }
    }

    pub fn with_costs(mut self, costs: Arc<dyn CostCalculator>) -> Self {
        self.costs = Some(costs);
        self
    }

    /// Load every input named by a run configuration.
    pub fn load(config: &RunConfig, calendar: Arc<dyn TradingCalendar>) -> Result<Self, LoadError> {
        let data = &config.data;
        let mut bars = Vec::new();
        for file in &data.bars {
            let (mut rows, _) = load_daily_bars_csv(&file.path, &file.exchange, calendar.as_ref())?;
            bars.append(&mut rows);
        }
        let symbols = load_symbols_csv(&data.symbols)?;
        let fx = match &data.fx {
            Some(p) => load_fx_csv(p)?,
            None => Vec::new(),
        };
        let actions = match &data.corporate_actions {
            Some(p) => load_corporate_actions_csv(p)?,
            None => Vec::new(),
        };
        info!(
            bars = bars.len(),
            symbols = symbols.len(),
            fx = fx.len(),
            actions = actions.len(),
            "dataset loaded"
        );
        let dataset = Self::new(bars, fx, symbols, actions, calendar);
        match &config.costs {
            Some(path) => Ok(dataset.with_costs(Arc::new(CostProfiles::from_file(path)?))),
            None => Ok(dataset),
        }
    }

    pub fn reader(&self) -> PitDataReader {
        PitDataReader::new(self.bars.clone(), self.fx.clone(), self.symbols.clone())
    }

    /// Sorted distinct bar timestamps in `[start, end]`.
    pub fn timestamps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        self.bars.timestamps_between(start, end)
    }

    /// A driver over this dataset.
    pub fn backtest(&self, config: BacktestConfig) -> Backtest {
        let bt = Backtest::new(config, self.reader(), self.actions.clone(), self.calendar.clone());
        match &self.costs {
            Some(costs) => bt.with_costs(costs.clone()),
            None => bt,
        }
    }
}
