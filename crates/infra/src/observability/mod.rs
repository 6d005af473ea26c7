//! Observability wiring for resilex components
//!
//! - [`init_tracing`]: install the global `tracing` subscriber
//! - [`TracingEventSink`]: forward component events to `tracing`
//! - [`PrometheusMetrics`]: back component counters with a Prometheus
//!   registry
//!
//! [`observer`] bundles the last two into the [`Observer`] that components
//! accept.

pub mod recorder;
pub mod sink;

use std::sync::Arc;

use prometheus::Registry;
use resilex_common::observability::Observer;
use tracing_subscriber::EnvFilter;

pub use recorder::{encode_text, PrometheusMetrics};
pub use sink::TracingEventSink;

use crate::config::LoggingConfig;
use crate::errors::{InfraError, InfraResult};

const DEFAULT_FILTER: &str = "info";

/// Install a global fmt subscriber
///
/// `filter` is an `EnvFilter` directive such as `"resilex_common=debug"`.
/// When it is `None` the `RUST_LOG` variable is used, then `info`.
///
/// # Errors
/// Returns `InfraError::Tracing` if the directive does not parse or a global
/// subscriber is already installed.
pub fn init_tracing(filter: Option<&str>, json: bool) -> InfraResult<()> {
    let env_filter = match filter {
        Some(directive) => EnvFilter::try_new(directive),
        None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_FILTER)),
    }
    .map_err(|e| InfraError::Tracing(e.to_string()))?;

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true);
    let installed = if json { builder.json().try_init() } else { builder.try_init() };
    installed.map_err(|e| InfraError::Tracing(e.to_string()))
}

/// [`init_tracing`] driven by the logging section of the settings
pub fn init_from_config(config: &LoggingConfig) -> InfraResult<()> {
    init_tracing(config.filter.as_deref(), config.json)
}

/// Observer reporting events to `tracing` and counters to `registry`
///
/// # Errors
/// Returns `InfraError::Metrics` if the counters are already registered.
pub fn observer(registry: &Registry) -> InfraResult<Observer> {
    let metrics = PrometheusMetrics::new(registry)?;
    Ok(Observer::noop().with_sink(Arc::new(TracingEventSink)).with_metrics(Arc::new(metrics)))
}
