//! Time abstractions for backoff and cooldown decisions
//!
//! Every time-based decision in resilex (retry backoff, circuit breaker
//! cooldown) reads time through the [`Clock`] trait so tests can swap in a
//! [`MockClock`] and run deterministically without real sleeps.
//!
//! ```rust
//! use std::time::Duration;
//!
//! use resilex_common::time::{Clock, MockClock};
//!
//! let clock = MockClock::new();
//! let start = clock.now();
//! clock.advance(Duration::from_secs(5));
//! assert_eq!(clock.now().duration_since(start), Duration::from_secs(5));
//! ```

pub mod clock;

pub use clock::{Clock, MockClock, SystemClock};
