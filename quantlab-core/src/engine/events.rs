//! Deterministic event queue.
//!
//! A binary min-heap keyed on `(ts, kind rank, insertion sequence)`:
//! - earlier timestamps always pop first
//! - at equal timestamps, kinds pop in fixed rank order
//!   (`Clock < Bar < Fx < CorporateAction`)
//! - the insertion sequence keeps FIFO order for identical `(ts, kind)`
//!
//! The tie-break is part of the key, so the pop order never depends on the
//! heap's internal layout or on push order across kinds.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event kinds, declared in tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Clock = 0,
    Bar = 1,
    Fx = 2,
    CorporateAction = 3,
}

impl EventKind {
    pub fn rank(self) -> u8 {
        self as u8
    }
}

/// Receipt for a pushed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventHandle {
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event<P> {
    pub ts: DateTime<Utc>,
    pub kind: EventKind,
    pub seq: u64,
    pub payload: P,
}

impl<P> Event<P> {
    fn key(&self) -> (DateTime<Utc>, u8, u64) {
        (self.ts, self.kind.rank(), self.seq)
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("pop from empty event queue")]
    Empty,
}

/// Heap entry ordered on the event key only; payloads need no ordering.
#[derive(Debug)]
struct Entry<P>(Event<P>);

impl<P> PartialEq for Entry<P> {
    fn eq(&self, other: &Self) -> bool {
        self.0.key() == other.0.key()
    }
}

impl<P> Eq for Entry<P> {}

impl<P> PartialOrd for Entry<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> Ord for Entry<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.key().cmp(&other.0.key())
    }
}

#[derive(Debug)]
pub struct EventQueue<P> {
    heap: BinaryHeap<Reverse<Entry<P>>>,
    next_seq: u64,
}

impl<P> Default for EventQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> EventQueue<P> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn push(&mut self, ts: DateTime<Utc>, kind: EventKind, payload: P) -> EventHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Entry(Event {
            ts,
            kind,
            seq,
            payload,
        })));
        EventHandle { seq }
    }

    pub fn pop(&mut self) -> Result<Event<P>, QueueError> {
        self.heap
            .pop()
            .map(|Reverse(Entry(event))| event)
            .ok_or(QueueError::Empty)
    }

    pub fn peek(&self) -> Option<&Event<P>> {
        self.heap.peek().map(|Reverse(Entry(event))| event)
    }

    /// Pop every event sharing the earliest timestamp, in key order.
    pub fn pop_batch(&mut self) -> Vec<Event<P>> {
        let Some(ts) = self.peek().map(|e| e.ts) else {
            return Vec::new();
        };
        let mut batch = Vec::new();
        while self.peek().map_or(false, |e| e.ts == ts) {
            if let Ok(event) = self.pop() {
                batch.push(event);
            }
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drop all pending events. Sequence numbers keep increasing.
    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, h, 0, 0).unwrap()
    }

    #[test]
    fn pop_empty_errors() {
        let mut q: EventQueue<()> = EventQueue::new();
        assert_eq!(q.pop(), Err(QueueError::Empty));
        assert!(q.peek().is_none());
    }

    #[test]
    fn same_timestamp_orders_by_kind() {
        let mut q = EventQueue::new();
        q.push(t(10), EventKind::CorporateAction, "ca");
        q.push(t(10), EventKind::Fx, "fx");
        q.push(t(10), EventKind::Bar, "bar");
        q.push(t(10), EventKind::Clock, "clock");
        let order: Vec<_> = (0..4).map(|_| q.pop().unwrap().payload).collect();
        assert_eq!(order, vec!["clock", "bar", "fx", "ca"]);
    }

    #[test]
    fn earlier_timestamp_wins_over_rank() {
        let mut q = EventQueue::new();
        q.push(t(11), EventKind::Clock, "late-clock");
        q.push(t(10), EventKind::CorporateAction, "early-ca");
        assert_eq!(q.pop().unwrap().payload, "early-ca");
        assert_eq!(q.pop().unwrap().payload, "late-clock");
    }

    #[test]
    fn fifo_within_identical_key() {
        let mut q = EventQueue::new();
        for i in 0..5 {
            q.push(t(10), EventKind::Bar, i);
        }
        let order: Vec<_> = (0..5).map(|_| q.pop().unwrap().payload).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn handles_are_sequential() {
        let mut q = EventQueue::new();
        let a = q.push(t(10), EventKind::Bar, ());
        let b = q.push(t(9), EventKind::Bar, ());
        assert!(a < b);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn pop_batch_takes_one_timestamp() {
        let mut q = EventQueue::new();
        q.push(t(10), EventKind::Bar, 1);
        q.push(t(11), EventKind::Bar, 3);
        q.push(t(10), EventKind::Clock, 0);
        let batch: Vec<_> = q.pop_batch().into_iter().map(|e| e.payload).collect();
        assert_eq!(batch, vec![0, 1]);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn clear_empties() {
        let mut q = EventQueue::new();
        q.push(t(10), EventKind::Bar, ());
        q.clear();
        assert!(q.is_empty());
        assert!(q.pop_batch().is_empty());
    }
}
