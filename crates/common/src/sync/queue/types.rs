use serde::{Deserialize, Serialize};

use crate::error::{ResilienceError, ResilienceResult};

/// Configuration for a [`WorkQueue`](super::WorkQueue)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of buffered items
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

impl QueueConfig {
    /// Reject a zero capacity
    pub fn validate(&self) -> ResilienceResult<()> {
        if self.capacity == 0 {
            return Err(ResilienceError::invalid_config("queue capacity must be greater than 0"));
        }
        Ok(())
    }
}
