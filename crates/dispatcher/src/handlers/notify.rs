//! NotifyStep - posts a short status message rendered from a template
//!
//! Template placeholders: `{VALUE}` `{UNIT}` `{YEAR}` `{MONTH}` `{DAY}`
//! `{HOUR}` `{MINUTE}` `{SECOND}`. `{{` and `}}` are literal braces.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use chrono::{Datelike, Timelike};
use contracts::{ContractError, EventPayload, ProcessError, ProcessingStep};
use tracing::{debug, instrument, warn};

use super::http::{ReconnectingClient, classify_status, classify_transport};

pub const DEFAULT_TEMPLATE: &str =
    "Battery voltage is {VALUE}{UNIT}.\nMeasured at {YEAR}-{MONTH}-{DAY} {HOUR}:{MINUTE}.";
pub const DEFAULT_VALUE_LABEL: &str = "Battery Voltage";
const DEFAULT_MESSAGE_FIELD: &str = "text";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Value,
    Unit,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl Field {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "VALUE" => Self::Value,
            "UNIT" => Self::Unit,
            "YEAR" => Self::Year,
            "MONTH" => Self::Month,
            "DAY" => Self::Day,
            "HOUR" => Self::Hour,
            "MINUTE" => Self::Minute,
            "SECOND" => Self::Second,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Field(Field),
}

/// Message template, parsed once when the step is built
#[derive(Debug, Clone, PartialEq)]
pub struct MessageTemplate {
    segments: Vec<Segment>,
}

impl MessageTemplate {
    pub fn parse(source: &str) -> Result<Self, String> {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    text.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    text.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => name.push(c),
                            None => return Err(format!("unclosed placeholder '{{{name}'")),
                        }
                    }
                    let field = Field::parse(&name)
                        .ok_or_else(|| format!("unknown placeholder '{{{name}}}'"))?;
                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    segments.push(Segment::Field(field));
                }
                '}' => return Err("unmatched '}' in template".to_string()),
                c => text.push(c),
            }
        }
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }
        Ok(Self { segments })
    }

    /// Render for one payload.
    ///
    /// # Errors
    /// `MalformedInput` when the payload has no measurement under `value_label`.
    pub fn render(&self, payload: &EventPayload, value_label: &str) -> Result<String, ProcessError> {
        let measurement = payload.measurement(value_label).ok_or_else(|| {
            ProcessError::malformed_input(format!(
                "payload from '{}' has no '{value_label}' measurement",
                payload.source
            ))
        })?;
        let at = payload.timestamp;

        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Field(Field::Value) => out.push_str(&round2(measurement.value).to_string()),
                Segment::Field(Field::Unit) => out.push_str(&measurement.unit),
                Segment::Field(Field::Year) => out.push_str(&at.year().to_string()),
                Segment::Field(Field::Month) => out.push_str(&at.month().to_string()),
                Segment::Field(Field::Day) => out.push_str(&at.day().to_string()),
                Segment::Field(Field::Hour) => out.push_str(&at.hour().to_string()),
                Segment::Field(Field::Minute) => out.push_str(&at.minute().to_string()),
                Segment::Field(Field::Second) => out.push_str(&at.second().to_string()),
            }
        }
        Ok(out)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Configuration for NotifyStep
#[derive(Debug, Clone)]
pub struct NotifyStepConfig {
    /// Webhook endpoint
    pub url: String,
    pub template: MessageTemplate,
    /// Measurement shown as `{VALUE}`/`{UNIT}`
    pub value_label: String,
    /// JSON key carrying the rendered message
    pub message_field: String,
    pub auth_token: Option<String>,
    pub timeout: Duration,
}

impl NotifyStepConfig {
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let url = params
            .get("url")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "missing 'url' parameter".to_string())?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(format!("invalid url '{}': expected http(s)://", url));
        }

        let template = MessageTemplate::parse(
            params
                .get("template")
                .map(String::as_str)
                .unwrap_or(DEFAULT_TEMPLATE),
        )?;

        let timeout_ms = match params.get("timeout_ms") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|e| format!("invalid timeout_ms '{}': {}", raw, e))?,
            None => DEFAULT_TIMEOUT_MS,
        };

        Ok(Self {
            url: url.to_string(),
            template,
            value_label: param_or(params, "value_label", DEFAULT_VALUE_LABEL),
            message_field: param_or(params, "message_field", DEFAULT_MESSAGE_FIELD),
            auth_token: params
                .get("auth_token")
                .filter(|s| !s.trim().is_empty())
                .cloned(),
            timeout: Duration::from_millis(timeout_ms),
        })
    }
}

fn param_or(params: &HashMap<String, String>, key: &str, default: &str) -> String {
    params
        .get(key)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| default.to_string())
}

/// Step that posts one rendered message per payload
pub struct NotifyStep {
    name: String,
    config: NotifyStepConfig,
    http: ReconnectingClient,
}

impl NotifyStep {
    pub fn new(name: impl Into<String>, config: NotifyStepConfig) -> Result<Self, ContractError> {
        let name = name.into();
        let http = ReconnectingClient::new(config.timeout)
            .map_err(|e| ContractError::handler_creation(&name, e.to_string()))?;
        debug!(handler = %name, url = %config.url, label = %config.value_label, "NotifyStep created");
        Ok(Self { name, config, http })
    }

    /// Create from params (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = NotifyStepConfig::from_params(params)
            .map_err(|e| ContractError::handler_creation(&name, e))?;
        Self::new(name, config)
    }

    pub fn config(&self) -> &NotifyStepConfig {
        &self.config
    }

    pub fn reconnect_counter(&self) -> Arc<AtomicU64> {
        self.http.counter()
    }

    async fn post(&self, message: &str) -> Result<(), ProcessError> {
        let body = HashMap::from([(self.config.message_field.as_str(), message)]);
        let mut request = self.http.client().post(&self.config.url).json(&body);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(classify_status(status))
        }
    }
}

impl ProcessingStep for NotifyStep {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "notify_step_process",
        skip(self, payload),
        fields(handler = %self.name, source = %payload.source)
    )]
    async fn process(&mut self, payload: &EventPayload) -> Result<(), ProcessError> {
        // Nothing was sent, so the client is still good
        let message = self.config.template.render(payload, &self.config.value_label)?;

        match self.post(&message).await {
            Ok(()) => {
                debug!(handler = %self.name, chars = message.len(), "Notification sent");
                Ok(())
            }
            Err(e) => {
                warn!(handler = %self.name, kind = %e.kind(), error = %e, "Notification failed, rebuilding client");
                self.http.rebuild(&self.name);
                Err(e)
            }
        }
    }

    async fn close(&mut self) -> Result<(), ProcessError> {
        debug!(handler = %self.name, "NotifyStep closed");
        Ok(())
    }
}
