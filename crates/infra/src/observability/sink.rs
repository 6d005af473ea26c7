//! `tracing`-backed event sink

use resilex_common::observability::{EventKind, EventSink};
use tracing::{debug, info, warn};

/// Forwards component events to `tracing`
///
/// Failure-side transitions (circuit opening, exhausted retries, invalid
/// releases, dropped items) log at `warn`, recovery at `info` and everything
/// else at `debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, kind: EventKind, detail: &str) {
        match kind {
            EventKind::CircuitOpened
            | EventKind::RetriesExhausted
            | EventKind::InvalidRelease
            | EventKind::ItemDropped => {
                warn!(event = %kind, detail, "resilience event");
            }
            EventKind::CircuitClosed | EventKind::QueueClosed => {
                info!(event = %kind, detail, "resilience event");
            }
            _ => debug!(event = %kind, detail, "resilience event"),
        }
    }
}
