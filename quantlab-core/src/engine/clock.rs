//! Market-session clock.
//!
//! Seeds the queue with a single "start" event, then keeps one pending
//! open/close boundary per tracked exchange. Exchanges are visited in sorted
//! order so boundary events receive deterministic sequence numbers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calendar::{CalendarError, TradingCalendar};
use crate::engine::events::{EventKind, EventQueue};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClockError {
    #[error("clock requires at least one exchange")]
    NoExchanges,
    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

/// Which side of a session a boundary marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boundary {
    Open,
    Close,
}

/// Payload of CLOCK events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockEvent {
    Start,
    Session { exchange: String, boundary: Boundary },
}

impl ClockEvent {
    /// `"start"`, or `"XNYS:open"` / `"XNYS:close"`.
    pub fn label(&self) -> String {
        match self {
            ClockEvent::Start => "start".to_string(),
            ClockEvent::Session { exchange, boundary } => match boundary {
                Boundary::Open => format!("{exchange}:open"),
                Boundary::Close => format!("{exchange}:close"),
            },
        }
    }
}

pub struct Clock {
    exchanges: Vec<String>,
    calendar: Arc<dyn TradingCalendar>,
    horizon: Option<DateTime<Utc>>,
}

impl Clock {
    pub fn new(
        exchanges: impl IntoIterator<Item = String>,
        calendar: Arc<dyn TradingCalendar>,
    ) -> Result<Self, ClockError> {
        let mut exchanges: Vec<String> = exchanges.into_iter().collect();
        exchanges.sort();
        exchanges.dedup();
        if exchanges.is_empty() {
            return Err(ClockError::NoExchanges);
        }
        Ok(Self {
            exchanges,
            calendar,
            horizon: None,
        })
    }

    /// Boundaries after `horizon` are never scheduled.
    pub fn with_horizon(mut self, horizon: DateTime<Utc>) -> Self {
        self.horizon = Some(horizon);
        self
    }

    pub fn exchanges(&self) -> &[String] {
        &self.exchanges
    }

    pub fn seed<P: From<ClockEvent>>(&self, queue: &mut EventQueue<P>, start: DateTime<Utc>) {
        queue.push(start, EventKind::Clock, ClockEvent::Start.into());
    }

    /// Schedule the next boundary for every tracked exchange.
    pub fn advance<P: From<ClockEvent>>(
        &self,
        queue: &mut EventQueue<P>,
        now: DateTime<Utc>,
    ) -> Result<(), ClockError> {
        for exchange in &self.exchanges {
            self.schedule(queue, exchange, now)?;
        }
        Ok(())
    }

    /// Schedule the next boundary for one exchange.
    pub fn advance_exchange<P: From<ClockEvent>>(
        &self,
        queue: &mut EventQueue<P>,
        exchange: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ClockError> {
        self.schedule(queue, exchange, now)
    }

    fn schedule<P: From<ClockEvent>>(
        &self,
        queue: &mut EventQueue<P>,
        exchange: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ClockError> {
        let (ts, boundary) = if self.calendar.is_open(exchange, now)? {
            (self.calendar.next_close(exchange, now)?, Boundary::Close)
        } else {
            (self.calendar.next_open(exchange, now)?, Boundary::Open)
        };
        if self.horizon.map_or(false, |h| ts > h) {
            return Ok(());
        }
        let event = ClockEvent::Session {
            exchange: exchange.to_string(),
            boundary,
        };
        queue.push(ts, EventKind::Clock, event.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::ExchangeCalendar;
    use chrono::TimeZone;

    fn cal() -> Arc<dyn TradingCalendar> {
        Arc::new(ExchangeCalendar::default())
    }

    fn utc(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, h, m, 0).unwrap()
    }

    #[test]
    fn requires_an_exchange() {
        assert!(matches!(
            Clock::new(Vec::new(), cal()),
            Err(ClockError::NoExchanges)
        ));
    }

    #[test]
    fn seed_pushes_start() {
        let clock = Clock::new(vec!["XNYS".to_string()], cal()).unwrap();
        let mut q: EventQueue<ClockEvent> = EventQueue::new();
        clock.seed(&mut q, utc(2, 0, 0));
        let e = q.pop().unwrap();
        assert_eq!(e.kind, EventKind::Clock);
        assert_eq!(e.payload.label(), "start");
    }

    #[test]
    fn advance_schedules_per_exchange_in_sorted_order() {
        let clock = Clock::new(vec!["XNYS".to_string(), "XETR".to_string()], cal()).unwrap();
        let mut q: EventQueue<ClockEvent> = EventQueue::new();
        // 15:00 UTC: XETR open (16:00 CET), XNYS open (10:00 EST).
        clock.advance(&mut q, utc(2, 15, 0)).unwrap();
        let a = q.pop().unwrap();
        let b = q.pop().unwrap();
        assert_eq!(a.payload.label(), "XETR:close");
        assert_eq!(a.ts, utc(2, 16, 30));
        assert_eq!(b.payload.label(), "XNYS:close");
        assert_eq!(b.ts, utc(2, 21, 0));
    }

    #[test]
    fn closed_exchange_schedules_open() {
        let clock = Clock::new(vec!["XNYS".to_string()], cal()).unwrap();
        let mut q: EventQueue<ClockEvent> = EventQueue::new();
        clock.advance(&mut q, utc(2, 21, 0)).unwrap();
        let e = q.pop().unwrap();
        assert_eq!(e.payload.label(), "XNYS:open");
        assert_eq!(e.ts, utc(3, 14, 30));
    }

    #[test]
    fn horizon_suppresses_late_boundaries() {
        let clock = Clock::new(vec!["XNYS".to_string()], cal())
            .unwrap()
            .with_horizon(utc(2, 20, 0));
        let mut q: EventQueue<ClockEvent> = EventQueue::new();
        clock.advance(&mut q, utc(2, 15, 0)).unwrap();
        assert!(q.is_empty());
    }
}
