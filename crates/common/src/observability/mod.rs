//! Event and metric hooks shared by all primitives
//!
//! Each component owns an [`Observer`], which bundles an optional
//! [`EventSink`] callback and an optional [`MetricsRecorder`]. Both default to
//! no-ops; core behaviour never depends on them.
//!
//! Events are also mirrored to `tracing` at `debug` level so that enabling a
//! subscriber is enough to see transitions without wiring a sink.

pub mod traits;

use std::fmt;
use std::sync::Arc;

use tracing::debug;

pub use traits::{EventSink, InMemoryMetrics, MetricsRecorder, NoopMetrics, NoopSink};

/// Counter names emitted through [`MetricsRecorder::increment`]
pub mod counters {
    /// Retry attempts scheduled after a failure
    pub const RETRIES_TOTAL: &str = "retries_total";
    /// Retry sequences that ran out of attempts
    pub const RETRIES_EXHAUSTED_TOTAL: &str = "retries_exhausted_total";
    /// Closed/HalfOpen → Open transitions
    pub const CIRCUIT_OPEN_TOTAL: &str = "circuit_open_total";
    /// Calls rejected without invoking the operation
    pub const CIRCUIT_REJECTED_TOTAL: &str = "circuit_rejected_total";
    /// Successful slot acquisitions
    pub const POOL_ACQUIRED_TOTAL: &str = "pool_acquired_total";
    /// Releases of slots that were not held
    pub const POOL_INVALID_RELEASE_TOTAL: &str = "pool_invalid_release_total";
    /// Items rejected by a closed queue or an expired put
    pub const QUEUE_ITEMS_DROPPED_TOTAL: &str = "queue_items_dropped_total";
}

/// Kind of a notable transition reported to an [`EventSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SlotAcquired,
    SlotReleased,
    InvalidRelease,
    RetryAttempted,
    RetriesExhausted,
    CircuitOpened,
    CircuitHalfOpened,
    CircuitClosed,
    CallRejected,
    ItemDropped,
    QueueClosed,
}

impl EventKind {
    /// Stable snake_case name, suitable for log fields and metric labels
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SlotAcquired => "slot_acquired",
            Self::SlotReleased => "slot_released",
            Self::InvalidRelease => "invalid_release",
            Self::RetryAttempted => "retry_attempted",
            Self::RetriesExhausted => "retries_exhausted",
            Self::CircuitOpened => "circuit_opened",
            Self::CircuitHalfOpened => "circuit_half_opened",
            Self::CircuitClosed => "circuit_closed",
            Self::CallRejected => "call_rejected",
            Self::ItemDropped => "item_dropped",
            Self::QueueClosed => "queue_closed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bundle of optional event sink and metrics recorder
#[derive(Clone, Default)]
pub struct Observer {
    sink: Option<Arc<dyn EventSink>>,
    metrics: Option<Arc<dyn MetricsRecorder>>,
}

impl Observer {
    /// Observer that reports nothing beyond `tracing`
    pub fn noop() -> Self {
        Self::default()
    }

    /// Attach an event sink
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Attach a metrics recorder
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Report an event. Never call while holding a component lock.
    pub fn emit(&self, kind: EventKind, detail: &str) {
        debug!(event = %kind, detail, "resilex event");
        if let Some(sink) = &self.sink {
            sink.record(kind, detail);
        }
    }

    /// Increment a named counter
    pub fn count(&self, name: &'static str) {
        if let Some(metrics) = &self.metrics {
            metrics.increment(name);
        }
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("sink", &self.sink.is_some())
            .field("metrics", &self.metrics)
            .finish()
    }
}
