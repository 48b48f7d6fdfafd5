use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exchange rate observation: one unit of `base` is worth `rate` units of `quote`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxRate {
    pub ts: DateTime<Utc>,
    pub base: String,
    pub quote: String,
    pub rate: f64,
}
