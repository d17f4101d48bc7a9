//! HttpStep - uploads measurement batches to an HTTP collection endpoint

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use contracts::{ContractError, EventPayload, ProcessError, ProcessingStep};
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, instrument, warn};

const DEFAULT_COLLECTION: &str = "offgrid";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Configuration for HttpStep
#[derive(Debug, Clone)]
pub struct HttpStepConfig {
    /// Collection endpoint
    pub url: String,
    /// Key wrapping the record list in the request body
    pub collection: String,
    /// Bearer credential
    pub auth_token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl HttpStepConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let url = params
            .get("url")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "missing 'url' parameter".to_string())?;

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(format!("invalid url '{}': expected http(s)://", url));
        }

        let collection = params
            .get("collection")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_COLLECTION)
            .to_string();

        let auth_token = params
            .get("auth_token")
            .filter(|s| !s.trim().is_empty())
            .cloned();

        let timeout_ms = match params.get("timeout_ms") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|e| format!("invalid timeout_ms '{}': {}", raw, e))?,
            None => DEFAULT_TIMEOUT_MS,
        };

        Ok(Self {
            url: url.to_string(),
            collection,
            auth_token,
            timeout: Duration::from_millis(timeout_ms),
        })
    }
}

/// One measurement as the collection endpoint expects it
#[derive(Debug, Serialize)]
struct UploadRecord<'a> {
    /// Label with whitespace removed, usable as a stream key
    stream_id: String,
    label: &'a str,
    source: &'a str,
    value: f64,
    unit: &'a str,
    group: &'a str,
    timestamp: &'a str,
}

/// reqwest client that is thrown away after a failed request
pub(super) struct ReconnectingClient {
    client: reqwest::Client,
    timeout: Duration,
    reconnects: Arc<AtomicU64>,
}

impl ReconnectingClient {
    pub(super) fn new(timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            timeout,
            reconnects: Arc::new(AtomicU64::new(0)),
        })
    }

    pub(super) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub(super) fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.reconnects)
    }

    /// Swap in a fresh client so the next attempt opens new connections
    pub(super) fn rebuild(&mut self, handler: &str) {
        let rebuilt = build_client(self.timeout);
        self.replace(handler, rebuilt);
    }

    /// A failed rebuild keeps the old client; the caller still reports its own failure.
    fn replace(&mut self, handler: &str, rebuilt: reqwest::Result<reqwest::Client>) {
        match rebuilt {
            Ok(client) => {
                self.client = client;
                self.reconnects.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(handler = %handler, error = %e, "Client rebuild failed, keeping previous client");
            }
        }
    }
}

/// Step that posts every payload as a JSON record batch.
///
/// A failed request tears the client down; the next attempt runs on a fresh one.
pub struct HttpStep {
    name: String,
    config: HttpStepConfig,
    http: ReconnectingClient,
}

impl HttpStep {
    /// Create a new HttpStep
    pub fn new(name: impl Into<String>, config: HttpStepConfig) -> Result<Self, ContractError> {
        let name = name.into();
        let http = ReconnectingClient::new(config.timeout)
            .map_err(|e| ContractError::handler_creation(&name, e.to_string()))?;

        debug!(handler = %name, url = %config.url, "HttpStep created");

        Ok(Self { name, config, http })
    }

    /// Create from params (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = HttpStepConfig::from_params(params)
            .map_err(|e| ContractError::handler_creation(&name, e))?;
        Self::new(name, config)
    }

    pub fn config(&self) -> &HttpStepConfig {
        &self.config
    }

    /// Shared counter of client rebuilds, readable after the step moved into its engine
    pub fn reconnect_counter(&self) -> Arc<AtomicU64> {
        self.http.counter()
    }

    async fn send(&self, payload: &EventPayload) -> Result<(), ProcessError> {
        let timestamp = payload.timestamp_rfc3339();
        let records: Vec<UploadRecord<'_>> = payload
            .measurements
            .iter()
            .map(|(label, m)| UploadRecord {
                stream_id: label.split_whitespace().collect(),
                label,
                source: &payload.source,
                value: m.value,
                unit: &m.unit,
                group: &m.group,
                timestamp: &timestamp,
            })
            .collect();
        let body = HashMap::from([(self.config.collection.as_str(), records)]);

        let mut request = self.http.client().post(&self.config.url).json(&body);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();
        if status.is_success() {
            debug!(handler = %self.name, status = status.as_u16(), records = payload.len(), "Uploaded");
            Ok(())
        } else {
            Err(classify_status(status))
        }
    }
}

impl ProcessingStep for HttpStep {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "http_step_process",
        skip(self, payload),
        fields(handler = %self.name, source = %payload.source)
    )]
    async fn process(&mut self, payload: &EventPayload) -> Result<(), ProcessError> {
        match self.send(payload).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(handler = %self.name, kind = %e.kind(), error = %e, "Upload failed, rebuilding client");
                self.http.rebuild(&self.name);
                Err(e)
            }
        }
    }

    #[instrument(name = "http_step_close", skip(self))]
    async fn close(&mut self) -> Result<(), ProcessError> {
        debug!(handler = %self.name, "HttpStep closed");
        Ok(())
    }
}

fn build_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(timeout).build()
}

pub(super) fn classify_transport(e: reqwest::Error) -> ProcessError {
    if e.is_builder() {
        ProcessError::malformed_input(e.to_string())
    } else {
        ProcessError::connectivity(e.to_string())
    }
}

pub(super) fn classify_status(status: StatusCode) -> ProcessError {
    let message = format!("server responded {status}");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProcessError::authentication(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ProcessError::malformed_input(message)
        }
        _ => ProcessError::connectivity(message),
    }
}
