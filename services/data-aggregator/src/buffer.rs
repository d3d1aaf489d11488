//! Bounded rolling windows of finalized records

use chainflow_common::Timestamped;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// A rolling window shared between its owning aggregator (writer) and the
/// dispatch task (reader). Critical sections stay short: `push` appends one
/// record, `get_last` copies a snapshot out.
pub type SharedWindow<T> = Arc<Mutex<RollingWindow<T>>>;

/// Bounded FIFO of finalized records for one (symbol, timeframe) pair.
///
/// Capacity is fixed at construction. A push that would exceed capacity
/// evicts the single oldest record before appending, so `len() <= capacity()`
/// holds at all times. Records are value-copied in and out; the buffer never
/// shares mutable state with producers.
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
    records: VecDeque<T>,
    capacity: usize,
}

impl<T: Timestamped + Clone> RollingWindow<T> {
    /// Create a window holding at most `capacity` records
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(4096)),
            capacity: capacity.max(1),
        }
    }

    /// Append a record, evicting the single oldest one at capacity
    pub fn push(&mut self, record: T) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// The most recent `min(n, len)` records in chronological order
    #[must_use]
    pub fn get_last(&self, n: usize) -> Vec<T> {
        let skip = self.records.len().saturating_sub(n);
        self.records.iter().skip(skip).cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.records.len() == self.capacity
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn oldest_datetime(&self) -> Option<DateTime<Utc>> {
        self.records.front().map(Timestamped::datetime)
    }

    #[must_use]
    pub fn newest_datetime(&self) -> Option<DateTime<Utc>> {
        self.records.back().map(Timestamped::datetime)
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
