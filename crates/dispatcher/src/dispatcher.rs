//! Dispatcher - fan-out of payloads to every registered engine

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use contracts::{EngineConfig, EventPayload, HandlerConfig, ListenerBlueprint};

use crate::engine::DispatchEngine;
use crate::error::DispatchError;
use crate::handlers::create_engine;
use crate::metrics::MetricsSnapshot;

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Engine defaults shared by all handlers
    pub engine: EngineConfig,
    /// Handler configurations
    pub handlers: Vec<HandlerConfig>,
}

impl From<&ListenerBlueprint> for DispatcherConfig {
    fn from(blueprint: &ListenerBlueprint) -> Self {
        Self {
            engine: blueprint.engine.clone(),
            handlers: blueprint.handlers.clone(),
        }
    }
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    config: DispatcherConfig,
}

impl DispatcherBuilder {
    /// Create a new DispatcherBuilder
    pub fn new(config: DispatcherConfig) -> Self {
        Self { config }
    }

    /// Build one engine per handler. Engines are not started yet.
    #[instrument(
        name = "dispatcher_builder_build",
        skip(self),
        fields(handler_count = self.config.handlers.len())
    )]
    pub fn build(self) -> Result<Dispatcher, DispatchError> {
        let mut engines = Vec::with_capacity(self.config.handlers.len());
        for handler in &self.config.handlers {
            engines.push(create_engine(handler, &self.config.engine)?);
        }
        Ok(Dispatcher::with_engines(engines))
    }
}

/// Result of fanning one payload out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Engines that queued the payload
    pub accepted: usize,
    /// Engines that refused it (queue full or stopped)
    pub rejected: usize,
}

/// Fans every payload out to a set of dispatch engines
pub struct Dispatcher {
    engines: Vec<Arc<DispatchEngine>>,
}

impl Dispatcher {
    /// Create a dispatcher over ready-made engines (for testing / custom steps)
    pub fn with_engines(engines: Vec<DispatchEngine>) -> Self {
        Self {
            engines: engines.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn engines(&self) -> &[Arc<DispatchEngine>] {
        &self.engines
    }

    /// Look up an engine by handler name
    pub fn engine(&self, name: &str) -> Option<&Arc<DispatchEngine>> {
        self.engines.iter().find(|e| e.name() == name)
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Get metrics for all engines
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.engines
            .iter()
            .map(|e| (e.name().to_string(), e.metrics()))
            .collect()
    }

    /// Start every engine
    #[instrument(name = "dispatcher_start", skip(self), fields(engines = self.engines.len()))]
    pub fn start(&self) -> Result<(), DispatchError> {
        for engine in &self.engines {
            engine.start()?;
        }
        info!(engines = self.engines.len(), "Dispatcher started");
        Ok(())
    }

    /// Hand the payload to every engine.
    ///
    /// Engines are offered the payload concurrently, so one engine waiting on
    /// a full queue does not hold the payload back from the others. A refusal
    /// is logged by the engine and counted in the outcome.
    pub async fn dispatch(&self, payload: impl Into<Arc<EventPayload>>) -> DispatchOutcome {
        let payload = payload.into();
        let results = join_all(
            self.engines
                .iter()
                .map(|engine| engine.enqueue(Arc::clone(&payload))),
        )
        .await;

        let mut outcome = DispatchOutcome::default();
        for (engine, result) in self.engines.iter().zip(results) {
            match result {
                Ok(()) => outcome.accepted += 1,
                Err(e) => {
                    debug!(handler = %engine.name(), error = %e, "Payload not accepted");
                    outcome.rejected += 1;
                }
            }
        }
        outcome
    }

    /// Wait until every engine has processed everything queued so far
    #[instrument(name = "dispatcher_drain", skip(self))]
    pub async fn drain(&self) -> Result<(), DispatchError> {
        for engine in &self.engines {
            engine.drain().await?;
        }
        Ok(())
    }

    /// Stop all engines, then wait for every worker.
    ///
    /// Keeps going past individual failures and reports the first one.
    #[instrument(name = "dispatcher_shutdown", skip(self))]
    pub async fn shutdown(&self) -> Result<(), DispatchError> {
        let mut first_error = None;

        for engine in &self.engines {
            if let Err(e) = engine.stop() {
                warn!(handler = %engine.name(), error = %e, "Stop failed");
                first_error.get_or_insert(e);
            }
        }
        for engine in &self.engines {
            if let Err(e) = engine.join().await {
                warn!(handler = %engine.name(), error = %e, "Join failed");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("Dispatcher shutdown complete");
                Ok(())
            }
        }
    }

    /// Run the dispatcher main loop
    ///
    /// Starts the engines, consumes payloads from input and fans out to all
    /// engines. When the input channel is closed, shuts every engine down
    /// (queued payloads are still processed) and returns the final metrics.
    #[instrument(name = "dispatcher_run", skip(self, input_rx))]
    pub async fn run(
        self,
        mut input_rx: mpsc::Receiver<EventPayload>,
    ) -> Result<Vec<(String, MetricsSnapshot)>, DispatchError> {
        self.start()?;

        let mut payload_count: u64 = 0;

        while let Some(payload) = input_rx.recv().await {
            payload_count += 1;
            self.dispatch(payload).await;

            if payload_count.is_multiple_of(100) {
                debug!(payloads = payload_count, "Dispatcher progress");
            }
        }

        info!(
            payloads = payload_count,
            "Dispatcher input closed, shutting down"
        );

        self.shutdown().await?;
        Ok(self.metrics())
    }

    /// Spawn the dispatcher as a background task
    pub fn spawn(
        self,
        input_rx: mpsc::Receiver<EventPayload>,
    ) -> JoinHandle<Result<Vec<(String, MetricsSnapshot)>, DispatchError>> {
        tokio::spawn(async move { self.run(input_rx).await })
    }
}

/// Convenience function to create a dispatcher from a listener blueprint
#[instrument(name = "dispatcher_create", skip(blueprint))]
pub fn create_dispatcher(blueprint: &ListenerBlueprint) -> Result<Dispatcher, DispatchError> {
    DispatcherBuilder::new(DispatcherConfig::from(blueprint)).build()
}
