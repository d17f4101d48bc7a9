//! Pipeline orchestrator - input reader, dispatcher and shutdown.
//!
//! Payloads arrive as newline-delimited JSON (file or stdin). Each one is
//! fanned out to every configured handler. On EOF, timeout or a shutdown
//! signal the input is closed and the engines are drained, stopped and joined.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{EventPayload, ListenerBlueprint};
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::PipelineStats;
use crate::error::CliError;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The listener blueprint
    pub blueprint: ListenerBlueprint,

    /// Payload input file (None = stdin)
    pub input: Option<PathBuf>,

    /// Stop reading input after this long (None = no timeout)
    pub timeout: Option<Duration>,

    /// Bound on engine shutdown
    pub shutdown_timeout: Duration,

    /// Channel buffer size
    pub buffer_size: usize,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Counters kept by the input reader
#[derive(Debug, Default)]
struct ReadStats {
    lines: u64,
    payloads_read: u64,
    malformed_lines: u64,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until the input is exhausted, the timeout expires or `shutdown` resolves
    pub async fn run<S>(self, shutdown: S) -> Result<PipelineStats>
    where
        S: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        // Initialize Metrics (optional)
        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        // Setup Dispatcher
        info!("Setting up dispatcher...");
        let dispatcher = dispatcher::create_dispatcher(blueprint)
            .map_err(CliError::from)
            .context("Failed to create dispatcher")?;
        let active_handlers = dispatcher.len();

        let (payload_tx, payload_rx) = mpsc::channel::<EventPayload>(self.config.buffer_size.max(1));
        let dispatcher_handle = dispatcher.spawn(payload_rx);

        info!(active_handlers, "Dispatcher started");

        // Read input until EOF, timeout or signal
        let mut read_stats = ReadStats::default();
        let read_result = {
            let reading = read_input(self.config.input.as_deref(), &payload_tx, &mut read_stats);
            let bounded = async {
                match self.config.timeout {
                    Some(timeout) => match tokio::time::timeout(timeout, reading).await {
                        Ok(result) => result,
                        Err(_) => {
                            warn!(timeout_secs = timeout.as_secs(), "Input timed out");
                            Ok(())
                        }
                    },
                    None => reading.await,
                }
            };

            tokio::select! {
                result = bounded => result,
                _ = shutdown => {
                    warn!("Received shutdown signal, closing input...");
                    Ok(())
                }
            }
        };

        // Closing the channel makes the dispatcher drain, stop and join its engines
        drop(payload_tx);
        info!(
            payloads = read_stats.payloads_read,
            "Input closed, shutting down engines..."
        );

        let secs = self.config.shutdown_timeout.as_secs();
        let handlers = match tokio::time::timeout(self.config.shutdown_timeout, dispatcher_handle).await
        {
            Ok(Ok(Ok(metrics))) => metrics,
            Ok(Ok(Err(e))) => return Err(CliError::from(e).into()),
            Ok(Err(e)) => {
                return Err(CliError::DispatcherTask {
                    message: e.to_string(),
                }
                .into());
            }
            Err(_) => return Err(CliError::ShutdownTimeout { secs }.into()),
        };

        // Input errors are reported once the engines are down
        read_result.context("Failed to read payload input")?;

        let stats = PipelineStats {
            payloads_read: read_stats.payloads_read,
            malformed_lines: read_stats.malformed_lines,
            duration: start_time.elapsed(),
            handlers,
        };

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            lines = read_stats.lines,
            throughput = format!("{:.2}", stats.throughput()),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}

async fn read_input(
    path: Option<&Path>,
    tx: &mpsc::Sender<EventPayload>,
    stats: &mut ReadStats,
) -> Result<(), CliError> {
    match path {
        Some(path) => {
            info!(input = %path.display(), "Reading payloads from file");
            let file = File::open(path)
                .await
                .map_err(|e| CliError::input_open(path, e))?;
            read_payloads(BufReader::new(file), tx, stats).await
        }
        None => {
            info!("Reading payloads from stdin");
            read_payloads(BufReader::new(tokio::io::stdin()), tx, stats).await
        }
    }
}

/// Parse one payload per line and forward it; malformed lines are skipped
async fn read_payloads<R>(
    reader: R,
    tx: &mpsc::Sender<EventPayload>,
    stats: &mut ReadStats,
) -> Result<(), CliError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        stats.lines += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<EventPayload>(line) {
            Ok(payload) => {
                stats.payloads_read += 1;
                debug!(source = %payload.source, measurements = payload.len(), "Payload read");
                if tx.send(payload).await.is_err() {
                    warn!("Dispatcher channel closed");
                    break;
                }
            }
            Err(e) => {
                stats.malformed_lines += 1;
                warn!(line = stats.lines, error = %e, "Skipping malformed payload line");
            }
        }
    }

    Ok(())
}
