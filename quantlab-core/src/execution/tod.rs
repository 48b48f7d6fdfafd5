//! Time-of-day spread widening.
//!
//! Quoted spreads are scaled by a bucket multiplier: the first and last
//! `window_minutes` of the venue's session are OPEN and CLOSE, the rest MID.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TodBucket {
    Open,
    Mid,
    Close,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TodMultipliers {
    pub open: f64,
    pub mid: f64,
    pub close: f64,
    pub window_minutes: i64,
}

impl Default for TodMultipliers {
    fn default() -> Self {
        Self {
            open: 1.5,
            mid: 1.0,
            close: 1.3,
            window_minutes: 30,
        }
    }
}

impl TodMultipliers {
    /// No widening in any bucket.
    pub fn flat() -> Self {
        Self {
            open: 1.0,
            mid: 1.0,
            close: 1.0,
            ..Self::default()
        }
    }

    pub fn multiplier(&self, bucket: TodBucket) -> f64 {
        match bucket {
            TodBucket::Open => self.open,
            TodBucket::Mid => self.mid,
            TodBucket::Close => self.close,
        }
    }

    /// Bucket of `ts` within `session`. Instants before the open count as
    /// OPEN and instants at or after the close count as CLOSE.
    pub fn bucket(&self, session: &Session, ts: DateTime<Utc>) -> TodBucket {
        let window = Duration::minutes(self.window_minutes);
        if ts < session.open + window {
            TodBucket::Open
        } else if ts >= session.close - window {
            TodBucket::Close
        } else {
            TodBucket::Mid
        }
    }
}
