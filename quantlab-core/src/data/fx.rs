//! FX observations with as-of lookup.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::error::DataError;
use crate::domain::FxRate;

/// Source of point-in-time conversion rates.
pub trait FxSource: Send + Sync {
    /// Most recent `base → quote` rate observed at or before `asof`.
    fn rate_asof(&self, base: &str, quote: &str, asof: DateTime<Utc>) -> Result<FxRate, DataError>;
}

/// In-memory FX table keyed by exact `(base, quote)` pair.
///
/// No inversion or triangulation: a missing pair is a lookup failure.
#[derive(Debug, Clone, Default)]
pub struct FxTable {
    series: BTreeMap<(String, String), Vec<FxRate>>,
}

impl FxTable {
    pub fn from_rates(rates: impl IntoIterator<Item = FxRate>) -> Self {
        let mut series: BTreeMap<(String, String), Vec<FxRate>> = BTreeMap::new();
        for rate in rates {
            series
                .entry((rate.base.clone(), rate.quote.clone()))
                .or_default()
                .push(rate);
        }
        for rates in series.values_mut() {
            rates.sort_by_key(|r| r.ts);
        }
        Self { series }
    }

    /// All observations within `[start, end]`, ordered by `(ts, pair)`.
    pub fn rates_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<&FxRate> {
        let mut out: Vec<&FxRate> = self
            .series
            .values()
            .flatten()
            .filter(|r| r.ts >= start && r.ts <= end)
            .collect();
        out.sort_by(|a, b| (a.ts, &a.base, &a.quote).cmp(&(b.ts, &b.base, &b.quote)));
        out
    }

    pub fn len(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FxSource for FxTable {
    fn rate_asof(&self, base: &str, quote: &str, asof: DateTime<Utc>) -> Result<FxRate, DataError> {
        let not_found = || DataError::NotFound(format!("no {base}/{quote} rate at or before {asof}"));
        let series = self
            .series
            .get(&(base.to_string(), quote.to_string()))
            .ok_or_else(not_found)?;
        let idx = series.partition_point(|r| r.ts <= asof);
        if idx == 0 {
            return Err(not_found());
        }
        Ok(series[idx - 1].clone())
    }
}
