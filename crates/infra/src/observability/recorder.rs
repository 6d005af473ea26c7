//! Prometheus-backed metrics recorder

use std::fmt;

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use resilex_common::observability::MetricsRecorder;

use crate::errors::{InfraError, InfraResult};

/// Name of the counter vector holding every resilex counter
pub const METRIC_NAME: &str = "resilex_events_total";

/// [`MetricsRecorder`] storing counters in a Prometheus registry
///
/// Every component counter becomes one label value of
/// `resilex_events_total{counter="..."}`.
#[derive(Clone)]
pub struct PrometheusMetrics {
    events: IntCounterVec,
}

impl PrometheusMetrics {
    /// Register the counter vector with `registry`
    ///
    /// # Errors
    /// Returns `InfraError::Metrics` if `registry` already holds a metric
    /// with the same name.
    pub fn new(registry: &Registry) -> InfraResult<Self> {
        let events = IntCounterVec::new(
            Opts::new(METRIC_NAME, "Resilience component counters by name"),
            &["counter"],
        )?;
        registry.register(Box::new(events.clone()))?;
        Ok(Self { events })
    }

    /// Current value of counter `name`
    pub fn get(&self, name: &str) -> u64 {
        self.events.with_label_values(&[name]).get()
    }
}

impl MetricsRecorder for PrometheusMetrics {
    fn increment(&self, name: &'static str) {
        self.events.with_label_values(&[name]).inc();
    }
}

impl fmt::Debug for PrometheusMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrometheusMetrics").field("metric", &METRIC_NAME).finish()
    }
}

/// Render `registry` in the Prometheus text exposition format
pub fn encode_text(registry: &Registry) -> InfraResult<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| InfraError::Metrics(prometheus::Error::Msg(e.to_string())))
}
