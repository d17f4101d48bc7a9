//! LogStep - logs a payload summary via tracing

use contracts::{EventPayload, ProcessError, ProcessingStep};
use tracing::{info, instrument};

/// Step that logs one line per payload, for debugging
pub struct LogStep {
    name: String,
}

impl LogStep {
    /// Create a new LogStep with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn log_summary(&self, payload: &EventPayload) {
        let labels: Vec<&str> = payload.measurements.keys().map(String::as_str).collect();

        info!(
            handler = %self.name,
            source = %payload.source,
            timestamp = %payload.timestamp_rfc3339(),
            measurements = payload.len(),
            labels = ?labels,
            "EventPayload received"
        );
    }
}

impl ProcessingStep for LogStep {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_step_process",
        skip(self, payload),
        fields(handler = %self.name, source = %payload.source)
    )]
    async fn process(&mut self, payload: &EventPayload) -> Result<(), ProcessError> {
        self.log_summary(payload);
        Ok(())
    }

    #[instrument(name = "log_step_close", skip(self))]
    async fn close(&mut self) -> Result<(), ProcessError> {
        info!(handler = %self.name, "LogStep closed");
        Ok(())
    }
}
