//! Test helpers
//!
//! - [`RecordingSink`]: an [`EventSink`] that keeps every event for assertions
//!
//! [`MockClock`](crate::time::MockClock) lives with the clock abstraction.

use parking_lot::Mutex;

use crate::observability::{EventKind, EventSink};

/// Event sink that records `(kind, detail)` pairs in arrival order
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(EventKind, String)>>,
}

impl RecordingSink {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events
    pub fn events(&self) -> Vec<(EventKind, String)> {
        self.events.lock().clone()
    }

    /// Recorded event kinds only
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(|(kind, _)| *kind).collect()
    }

    /// Number of events of `kind`
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|(k, _)| *k == kind).count()
    }
}

impl EventSink for RecordingSink {
    fn record(&self, kind: EventKind, detail: &str) {
        self.events.lock().push((kind, detail.to_string()));
    }
}
