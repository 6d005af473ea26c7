//! Collaborator traits for event and metric reporting
//!
//! Components accept these through [`super::Observer`] and behave identically
//! whether a real implementation or the no-op default is plugged in.

use std::collections::HashMap;
use std::fmt::Debug;

use parking_lot::Mutex;

use super::EventKind;

// ============================================================================
// Event Sink
// ============================================================================

/// Receiver for notable component transitions
///
/// Invoked synchronously on the transitioning thread after the component has
/// released its internal lock. Implementations must not block.
pub trait EventSink: Send + Sync {
    /// Record one event with a free-form detail string
    fn record(&self, kind: EventKind, detail: &str);
}

impl<F> EventSink for F
where
    F: Fn(EventKind, &str) + Send + Sync,
{
    fn record(&self, kind: EventKind, detail: &str) {
        self(kind, detail);
    }
}

/// Sink that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn record(&self, _kind: EventKind, _detail: &str) {}
}

// ============================================================================
// Metrics
// ============================================================================

/// Named counter hooks
pub trait MetricsRecorder: Send + Sync + Debug {
    /// Increment the counter called `name` by one
    fn increment(&self, name: &'static str);
}

/// Recorder that ignores every increment
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsRecorder for NoopMetrics {
    fn increment(&self, _name: &'static str) {}
}

/// In-process counter table
///
/// Useful for monitoring endpoints in small deployments and for asserting
/// counter values in tests.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: Mutex<HashMap<&'static str, u64>>,
}

impl InMemoryMetrics {
    /// Create an empty counter table
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `name` (zero when never incremented)
    pub fn get(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    /// Copy of all counters
    pub fn snapshot(&self) -> HashMap<&'static str, u64> {
        self.counters.lock().clone()
    }
}

impl MetricsRecorder for InMemoryMetrics {
    fn increment(&self, name: &'static str) {
        *self.counters.lock().entry(name).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_closure_is_event_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink = move |kind: EventKind, detail: &str| {
            seen_clone.lock().push((kind, detail.to_string()));
        };

        sink.record(EventKind::SlotAcquired, "slot 0");

        assert_eq!(seen.lock().as_slice(), &[(EventKind::SlotAcquired, "slot 0".to_string())]);
    }

    #[test]
    fn test_in_memory_metrics_counts() {
        let metrics = InMemoryMetrics::new();
        metrics.increment("retries_total");
        metrics.increment("retries_total");
        metrics.increment("circuit_open_total");

        assert_eq!(metrics.get("retries_total"), 2);
        assert_eq!(metrics.get("circuit_open_total"), 1);
        assert_eq!(metrics.get("never_seen"), 0);
        assert_eq!(metrics.snapshot().len(), 2);
    }
}
