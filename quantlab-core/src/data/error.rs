use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors from the point-in-time data layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataError {
    /// The caller asked for something it may not see (e.g. `end > asof`).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// No row satisfies the as-of query.
    #[error("not found: {0}")]
    NotFound(String),
    /// A supposedly safe query returned data dated after `asof`.
    /// Fatal: the dataset itself is corrupt.
    #[error("dataset violation: bar at {bar_ts} returned for asof {asof}")]
    DatasetViolation {
        bar_ts: DateTime<Utc>,
        asof: DateTime<Utc>,
    },
}

impl DataError {
    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DataError::DatasetViolation { .. })
    }
}
