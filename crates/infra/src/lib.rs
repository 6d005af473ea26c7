//! # resilex Infrastructure
//!
//! The "impure" edge around `resilex-common`.
//!
//! This crate contains:
//! - Configuration loading from `RESILEX_*` environment variables or
//!   JSON/TOML files
//! - Tracing subscriber setup
//! - A Prometheus-backed metrics recorder and a `tracing` event sink
//!
//! ## Architecture
//! - Depends on `resilex-common` for every component
//! - Components never read configuration or install subscribers themselves;
//!   callers wire them up here

pub mod config;
pub mod errors;
pub mod observability;

// Re-export commonly used items
pub use config::{LoggingConfig, Settings};
pub use errors::{InfraError, InfraResult};
