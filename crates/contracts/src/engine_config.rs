//! Dispatch engine configuration contracts that can be shared across crates.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-engine tuning: queue bound and retry budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Queue capacity (`q_max`)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Behavior of `enqueue` on a full queue
    #[serde(default)]
    pub backpressure: Backpressure,

    /// Total attempts per payload (initial attempt included)
    #[serde(default = "default_retry_max")]
    pub retry_max: u32,

    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Multiplier applied to the delay for each further retry (1.0 = constant)
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Upper bound for any single retry delay, in milliseconds
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
}

fn default_queue_capacity() -> usize {
    5
}

fn default_retry_max() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_backoff_factor() -> f64 {
    1.0
}

fn default_max_retry_delay_ms() -> u64 {
    30_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            backpressure: Backpressure::default(),
            retry_max: default_retry_max(),
            retry_delay_ms: default_retry_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
        }
    }
}

impl EngineConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    /// Apply per-handler overrides on top of these settings
    pub fn merged(&self, overrides: &EngineOverrides) -> Self {
        Self {
            queue_capacity: overrides.queue_capacity.unwrap_or(self.queue_capacity),
            backpressure: overrides.backpressure.unwrap_or(self.backpressure),
            retry_max: overrides.retry_max.unwrap_or(self.retry_max),
            retry_delay_ms: overrides.retry_delay_ms.unwrap_or(self.retry_delay_ms),
            backoff_factor: overrides.backoff_factor.unwrap_or(self.backoff_factor),
            max_retry_delay_ms: overrides
                .max_retry_delay_ms
                .unwrap_or(self.max_retry_delay_ms),
        }
    }
}

/// Optional per-handler overrides of [`EngineConfig`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineOverrides {
    #[serde(default)]
    pub queue_capacity: Option<usize>,
    #[serde(default)]
    pub backpressure: Option<Backpressure>,
    #[serde(default)]
    pub retry_max: Option<u32>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
    #[serde(default)]
    pub backoff_factor: Option<f64>,
    #[serde(default)]
    pub max_retry_delay_ms: Option<u64>,
}

/// What `enqueue` does when the queue is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backpressure {
    /// Wait for a free slot (or for the engine to stop)
    #[default]
    Block,
    /// Fail immediately with a queue-full error
    Reject,
}
