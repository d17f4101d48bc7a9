//! Engine metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters for a single dispatch engine
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Current queue length
    queue_len: AtomicUsize,
    /// Total processing attempts (retries included)
    attempt_count: AtomicU64,
    /// Payloads processed successfully
    success_count: AtomicU64,
    /// Failed attempts that were followed by a retry
    retry_count: AtomicU64,
    /// Payloads dropped after exhausting retries
    exhausted_count: AtomicU64,
    /// Payloads refused at enqueue time (queue full / engine stopped)
    rejected_count: AtomicU64,
}

impl EngineMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current queue length
    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    /// Set current queue length
    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn attempt_count(&self) -> u64 {
        self.attempt_count.load(Ordering::Relaxed)
    }

    pub fn inc_attempt_count(&self) {
        self.attempt_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn success_count(&self) -> u64 {
        self.success_count.load(Ordering::Relaxed)
    }

    pub fn inc_success_count(&self) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retry_count(&self) -> u64 {
        self.retry_count.load(Ordering::Relaxed)
    }

    pub fn inc_retry_count(&self) {
        self.retry_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn exhausted_count(&self) -> u64 {
        self.exhausted_count.load(Ordering::Relaxed)
    }

    pub fn inc_exhausted_count(&self) {
        self.exhausted_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected_count.load(Ordering::Relaxed)
    }

    pub fn inc_rejected_count(&self) {
        self.rejected_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            attempt_count: self.attempt_count(),
            success_count: self.success_count(),
            retry_count: self.retry_count(),
            exhausted_count: self.exhausted_count(),
            rejected_count: self.rejected_count(),
        }
    }
}

/// Snapshot of engine metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub attempt_count: u64,
    pub success_count: u64,
    pub retry_count: u64,
    pub exhausted_count: u64,
    pub rejected_count: u64,
}

impl MetricsSnapshot {
    /// Payloads that left the queue, delivered or dropped
    pub fn completed(&self) -> u64 {
        self.success_count + self.exhausted_count
    }
}
