//! Producer/consumer statistics for a work queue

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals updated lock-free outside the queue mutex
#[derive(Debug, Default)]
pub(crate) struct QueueCounters {
    produced: AtomicU64,
    consumed: AtomicU64,
    dropped: AtomicU64,
}

impl QueueCounters {
    pub(crate) fn record_produced(&self) {
        self.produced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_consumed(&self) {
        self.consumed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn load(&self) -> (u64, u64, u64) {
        (
            self.produced.load(Ordering::Acquire),
            self.consumed.load(Ordering::Acquire),
            self.dropped.load(Ordering::Acquire),
        )
    }
}

/// Snapshot of queue occupancy and throughput
///
/// Fields are read independently and may be mutually stale under load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Maximum number of buffered items
    pub capacity: usize,
    /// Items buffered right now
    pub len: usize,
    /// Items accepted by `put`/`try_put`
    pub produced: u64,
    /// Items handed out by `take`/`try_take`
    pub consumed: u64,
    /// Items rejected by a closed queue or abandoned by an expired put
    pub dropped: u64,
    /// Whether `close` has been called
    pub closed: bool,
}

impl QueueStats {
    /// Items produced but not yet consumed
    pub fn in_flight(&self) -> u64 {
        self.produced.saturating_sub(self.consumed)
    }
}

impl fmt::Display for QueueStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WorkQueue: {}/{} buffered, {} produced, {} consumed, {} dropped{}",
            self.len,
            self.capacity,
            self.produced,
            self.consumed,
            self.dropped,
            if self.closed { " (closed)" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_in_flight() {
        let counters = QueueCounters::default();
        counters.record_produced();
        counters.record_produced();
        counters.record_consumed();
        counters.record_dropped();

        let (produced, consumed, dropped) = counters.load();
        let stats = QueueStats { capacity: 4, len: 1, produced, consumed, dropped, closed: true };

        assert_eq!(stats.in_flight(), 1);
        assert!(stats.to_string().contains("(closed)"));
    }
}
