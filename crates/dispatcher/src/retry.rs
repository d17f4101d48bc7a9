//! RetryPolicy - bounded re-attempts of a failed payload
//!
//! `attempt_count` is the number of failed attempts so far for the payload in
//! flight. With the default policy (3 attempts) a payload that keeps failing is
//! processed three times and then dropped.
//!
//! The delay before retry `n` is `delay × backoff_factor^(n-1)`, clamped to
//! `max_delay`. A factor of 1.0 keeps the delay constant.

use std::time::Duration;

use contracts::EngineConfig;

/// Retry decision for one in-flight payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    backoff_factor: f64,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    /// 3 attempts in total, 1s apart
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// Constant delay between attempts
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff_factor: 1.0,
            max_delay: delay,
        }
    }

    /// Grow the delay by `factor` after every failure, never beyond `max_delay`
    pub fn with_backoff(mut self, factor: f64, max_delay: Duration) -> Self {
        self.backoff_factor = factor;
        self.max_delay = max_delay.max(self.delay);
        self
    }

    /// Build from engine settings
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::fixed(config.retry_max, config.retry_delay())
            .with_backoff(config.backoff_factor, config.max_retry_delay())
    }

    /// Total attempts allowed per payload
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt is allowed after `attempt_count` failures
    pub fn should_retry(&self, attempt_count: u32) -> bool {
        attempt_count < self.max_attempts
    }

    /// Delay to wait after the `attempt_count`-th failure
    pub fn delay_for(&self, attempt_count: u32) -> Duration {
        let exponent = attempt_count.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.delay.as_secs_f64() * self.backoff_factor.powi(exponent);

        if !secs.is_finite() || secs < 0.0 || secs > self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}
