//! Configuration loading and management
//!
//! [`Settings`] is the deployable shape of a resilex setup: one section per
//! component plus worker count, acquire timeout and logging. It is loaded
//! from environment variables or a JSON/TOML file (see [`loader`]).

pub mod loader;

use std::time::Duration;

use resilex_common::observability::Observer;
use resilex_common::resilience::{
    CircuitBreakerConfig, ExecutorConfig, ResilientExecutor, RetryConfig, WorkerPool,
};
use resilex_common::sync::{PoolConfig, QueueConfig};
use resilex_common::utils::serde::option_duration_millis;
use resilex_common::{ResilienceError, ResilienceResult};
use serde::{Deserialize, Serialize};

// Re-export commonly used items
pub use loader::{load, load_from_env, load_from_file, probe_config_paths};

const DEFAULT_WORKERS: usize = 4;

/// Logging section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `None` defers to `RUST_LOG`
    #[serde(default)]
    pub filter: Option<String>,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

/// Complete runtime configuration
///
/// Every section is optional in files; missing sections take the component
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    /// Number of worker tasks draining the queue
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub breaker: CircuitBreakerConfig,
    /// Longest wait for a pool slot; absent means wait indefinitely
    #[serde(default, with = "option_duration_millis")]
    pub acquire_timeout: Option<Duration>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            queue: QueueConfig::default(),
            workers: DEFAULT_WORKERS,
            retry: RetryConfig::default(),
            breaker: CircuitBreakerConfig::default(),
            acquire_timeout: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    /// Validate every section
    ///
    /// # Errors
    /// Returns `ResilienceError::InvalidConfig` naming the first bad value.
    pub fn validate(&self) -> ResilienceResult<()> {
        self.executor_config().validate()?;
        self.queue.validate()?;
        if self.workers == 0 {
            return Err(ResilienceError::invalid_config("workers must be greater than 0"));
        }
        Ok(())
    }

    /// Executor portion of the settings
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            pool: self.pool.clone(),
            retry: self.retry.clone(),
            breaker: self.breaker.clone(),
            acquire_timeout: self.acquire_timeout,
        }
    }

    /// Build an executor on the system clock reporting to `observer`
    pub fn build_executor(&self, observer: Observer) -> ResilienceResult<ResilientExecutor> {
        ResilientExecutor::with_clock_and_observer(
            &self.executor_config(),
            resilex_common::SystemClock,
            observer,
        )
    }

    /// Build an executor and start `workers` tasks on the current runtime
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_worker_pool(&self, observer: Observer) -> ResilienceResult<WorkerPool> {
        self.validate()?;
        let executor = self.build_executor(observer.clone())?;
        WorkerPool::start_with_observer(executor, self.workers, self.queue.capacity, observer)
    }
}
