//! CommandStep - runs a local command once per payload

use std::collections::HashMap;
use std::process::Stdio;

use contracts::{ContractError, EventPayload, ProcessError, ProcessingStep};
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Step that spawns a configured command line for every payload.
///
/// The payload reaches the child through the environment:
/// `EVENT_SOURCE`, `EVENT_TIMESTAMP` and `EVENT_PAYLOAD` (JSON).
#[derive(Debug)]
pub struct CommandStep {
    name: String,
    program: String,
    args: Vec<String>,
}

impl CommandStep {
    /// Create a step from an already split command line
    pub fn new(name: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
        }
    }

    /// Create from params (for factory). `command` is split on whitespace.
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let command_line = params
            .get("command")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ContractError::handler_param(&name, "command", "missing"))?;

        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| ContractError::handler_param(&name, "command", "empty"))?;

        Ok(Self::new(name, program, parts.collect()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl ProcessingStep for CommandStep {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "command_step_process",
        skip(self, payload),
        fields(handler = %self.name, program = %self.program, source = %payload.source)
    )]
    async fn process(&mut self, payload: &EventPayload) -> Result<(), ProcessError> {
        let encoded = serde_json::to_string(payload)
            .map_err(|e| ProcessError::malformed_input(format!("encode payload: {e}")))?;

        let output = Command::new(&self.program)
            .args(&self.args)
            .env("EVENT_SOURCE", &payload.source)
            .env("EVENT_TIMESTAMP", payload.timestamp_rfc3339())
            .env("EVENT_PAYLOAD", encoded)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ProcessError::execution(format!("spawn '{}': {e}", self.program)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            info!(handler = %self.name, stdout = %stdout.trim_end(), "Command output");
        }

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(handler = %self.name, stderr = %stderr.trim_end(), "Command stderr");
            Err(ProcessError::execution(format!(
                "'{}' exited with {}",
                self.program, output.status
            )))
        }
    }

    async fn close(&mut self) -> Result<(), ProcessError> {
        Ok(())
    }
}
