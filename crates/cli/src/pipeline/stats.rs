//! Run statistics and per-handler metrics.

use std::time::Duration;

use dispatcher::MetricsSnapshot;

/// Statistics from a dispatch run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Payloads read from the input and handed to the dispatcher
    pub payloads_read: u64,

    /// Input lines that were not valid payload JSON
    pub malformed_lines: u64,

    /// Total duration of the run
    pub duration: Duration,

    /// Final engine metrics, one entry per handler
    pub handlers: Vec<(String, MetricsSnapshot)>,
}

impl PipelineStats {
    /// Payloads read per second
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.payloads_read as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Payloads dropped after exhausting retries, across all handlers
    pub fn total_exhausted(&self) -> u64 {
        self.handlers.iter().map(|(_, m)| m.exhausted_count).sum()
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Dispatch Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Payloads read: {}", self.payloads_read);
        println!("   ├─ Malformed lines: {}", self.malformed_lines);
        println!("   ├─ Throughput: {:.2}/s", self.throughput());
        println!("   └─ Handlers: {}", self.handlers.len());

        for (name, m) in &self.handlers {
            println!("\n📤 {}", name);
            println!("   ├─ Attempts: {}", m.attempt_count);
            println!("   ├─ Delivered: {}", m.success_count);
            println!("   ├─ Retries: {}", m.retry_count);
            println!("   ├─ Dropped after retries: {}", m.exhausted_count);
            println!("   └─ Rejected at enqueue: {}", m.rejected_count);
        }

        println!();
    }
}
