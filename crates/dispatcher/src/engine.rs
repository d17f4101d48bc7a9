//! DispatchEngine - one processing step behind a bounded queue and a dedicated worker task
//!
//! Lifecycle: `Created -> Running -> Stopping -> Stopped`. Payloads may be
//! enqueued while `Created`; nothing is processed until `start()`. `stop()`
//! closes the queue to producers; the worker finishes the payload in flight
//! (including its remaining retries) and everything already queued, then exits.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use contracts::{Backpressure, EngineConfig, EventPayload, ProcessingStep};
use observability::AttemptOutcome;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::DispatchError;
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::queue::{BoundedQueue, DrainError, PushError};
use crate::retry::RetryPolicy;

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

type PayloadQueue = BoundedQueue<Arc<EventPayload>>;
type Launcher = Box<dyn FnOnce(WorkerContext) -> JoinHandle<()> + Send>;

/// Everything the worker task shares with its engine
struct WorkerContext {
    name: String,
    queue: Arc<PayloadQueue>,
    retry: RetryPolicy,
    metrics: Arc<EngineMetrics>,
    state: Arc<watch::Sender<LifecycleState>>,
    stop: CancellationToken,
}

/// Asynchronous dispatch engine for a single processing step
pub struct DispatchEngine {
    name: String,
    config: EngineConfig,
    queue: Arc<PayloadQueue>,
    retry: RetryPolicy,
    metrics: Arc<EngineMetrics>,
    state: Arc<watch::Sender<LifecycleState>>,
    stop: CancellationToken,
    /// Moves the processing step into the worker; consumed by `start()`
    launcher: Mutex<Option<Launcher>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DispatchEngine {
    /// Create an engine for `step`. The worker is not spawned until [`start`](Self::start).
    ///
    /// # Errors
    /// `InvalidConfig` when the queue capacity or the retry budget is zero.
    pub fn new<P: ProcessingStep + Send + 'static>(
        step: P,
        config: EngineConfig,
    ) -> Result<Self, DispatchError> {
        let name = step.name().to_string();

        if config.queue_capacity == 0 {
            return Err(DispatchError::invalid_config(
                &name,
                "queue_capacity must be >= 1",
            ));
        }
        if config.retry_max == 0 {
            return Err(DispatchError::invalid_config(&name, "retry_max must be >= 1"));
        }

        let launcher: Launcher =
            Box::new(move |ctx: WorkerContext| tokio::spawn(engine_worker(step, ctx)));

        Ok(Self {
            queue: Arc::new(BoundedQueue::new(config.queue_capacity)),
            retry: RetryPolicy::from_config(&config),
            metrics: Arc::new(EngineMetrics::new()),
            state: Arc::new(watch::Sender::new(LifecycleState::Created)),
            stop: CancellationToken::new(),
            launcher: Mutex::new(Some(launcher)),
            worker: Mutex::new(None),
            name,
            config,
        })
    }

    /// Handler name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Payloads waiting in the queue (the one in flight excluded)
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Get metrics snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Spawn the worker on the current tokio runtime.
    ///
    /// # Errors
    /// - `AlreadyStarted` on any call after the first
    /// - `NoRuntime` outside a tokio runtime
    #[instrument(name = "dispatch_engine_start", skip(self), fields(handler = %self.name))]
    pub fn start(&self) -> Result<(), DispatchError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(DispatchError::NoRuntime {
                handler: self.name.clone(),
            });
        }

        let started = self.state.send_if_modified(|state| {
            if *state == LifecycleState::Created {
                *state = LifecycleState::Running;
                true
            } else {
                false
            }
        });
        let launcher = if started {
            self.launcher
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
        } else {
            None
        };
        let Some(launch) = launcher else {
            return Err(DispatchError::AlreadyStarted {
                handler: self.name.clone(),
            });
        };

        let handle = launch(WorkerContext {
            name: self.name.clone(),
            queue: Arc::clone(&self.queue),
            retry: self.retry,
            metrics: Arc::clone(&self.metrics),
            state: Arc::clone(&self.state),
            stop: self.stop.clone(),
        });
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        info!(
            handler = %self.name,
            queue_capacity = self.queue.capacity(),
            retry_max = self.retry.max_attempts(),
            pending = self.queue.len(),
            "Dispatch engine started"
        );
        Ok(())
    }

    /// Queue a payload, honoring the configured backpressure mode.
    ///
    /// With `Backpressure::Block` this waits for a free slot; a producer that is
    /// still waiting when `stop()` is called gets `EngineStopped`.
    ///
    /// # Errors
    /// - `QueueFull` (only with `Backpressure::Reject`)
    /// - `EngineStopped` once the engine is stopping or stopped
    pub async fn enqueue(&self, payload: impl Into<Arc<EventPayload>>) -> Result<(), DispatchError> {
        let payload = payload.into();
        let result = match self.config.backpressure {
            Backpressure::Block => self.queue.push(payload).await,
            Backpressure::Reject => self.queue.try_push(payload),
        };
        self.accepted(result)
    }

    /// Queue a payload without ever waiting.
    ///
    /// # Errors
    /// - `QueueFull` when the queue is at capacity
    /// - `EngineStopped` once the engine is stopping or stopped
    pub fn try_enqueue(&self, payload: impl Into<Arc<EventPayload>>) -> Result<(), DispatchError> {
        let result = self.queue.try_push(payload.into());
        self.accepted(result)
    }

    fn accepted(
        &self,
        result: Result<(), PushError<Arc<EventPayload>>>,
    ) -> Result<(), DispatchError> {
        match result {
            Ok(()) => {
                let len = self.queue.len();
                self.metrics.set_queue_len(len);
                observability::record_queue_depth(&self.name, len);
                Ok(())
            }
            Err(PushError::Full(payload)) => {
                self.metrics.inc_rejected_count();
                observability::record_payload_rejected(&self.name, "queue_full");
                warn!(
                    handler = %self.name,
                    source = %payload.source,
                    timestamp = %payload.timestamp_rfc3339(),
                    capacity = self.queue.capacity(),
                    "Queue full, payload rejected"
                );
                Err(DispatchError::QueueFull {
                    handler: self.name.clone(),
                    capacity: self.queue.capacity(),
                    source_id: payload.source.clone(),
                })
            }
            Err(PushError::Closed(payload)) => {
                self.metrics.inc_rejected_count();
                observability::record_payload_rejected(&self.name, "stopped");
                warn!(
                    handler = %self.name,
                    source = %payload.source,
                    timestamp = %payload.timestamp_rfc3339(),
                    "Engine stopped, payload rejected"
                );
                Err(DispatchError::EngineStopped {
                    handler: self.name.clone(),
                    source_id: payload.source.clone(),
                })
            }
        }
    }

    /// Wait until every queued and in-flight payload has been processed
    /// (delivered or dropped after retries). The worker keeps running.
    ///
    /// # Errors
    /// - `NotStarted` before `start()`, since nothing would ever consume the queue
    /// - `WorkerAborted` if the worker died with payloads still queued
    #[instrument(name = "dispatch_engine_drain", skip(self), fields(handler = %self.name))]
    pub async fn drain(&self) -> Result<(), DispatchError> {
        if self.state() == LifecycleState::Created {
            return Err(DispatchError::NotStarted {
                handler: self.name.clone(),
            });
        }

        self.queue.drain_wait().await.map_err(|e| match e {
            DrainError::Abandoned { pending } => DispatchError::WorkerAborted {
                handler: self.name.clone(),
                pending,
            },
        })?;

        debug!(handler = %self.name, "Dispatch engine drained");
        Ok(())
    }

    /// Ask the worker to finish outstanding work and exit.
    ///
    /// Pending retry delays are cut short, but the retry sequence of the
    /// payload in flight still runs to completion. Calling `stop()` again is a no-op.
    ///
    /// # Errors
    /// `NotStarted` before `start()`
    #[instrument(name = "dispatch_engine_stop", skip(self), fields(handler = %self.name))]
    pub fn stop(&self) -> Result<(), DispatchError> {
        let mut previous = LifecycleState::Created;
        self.state.send_if_modified(|state| {
            previous = *state;
            if *state == LifecycleState::Running {
                *state = LifecycleState::Stopping;
                true
            } else {
                false
            }
        });

        match previous {
            LifecycleState::Created => Err(DispatchError::NotStarted {
                handler: self.name.clone(),
            }),
            LifecycleState::Running => {
                self.queue.close();
                self.stop.cancel();
                info!(
                    handler = %self.name,
                    pending = self.queue.len(),
                    "Dispatch engine stopping"
                );
                Ok(())
            }
            LifecycleState::Stopping | LifecycleState::Stopped => {
                debug!(handler = %self.name, state = %previous, "Stop already requested");
                Ok(())
            }
        }
    }

    /// Wait until the worker has terminated. Safe to call repeatedly.
    ///
    /// # Errors
    /// - `NotStarted` before `start()`
    /// - `WorkerPanicked` if the worker task panicked
    #[instrument(name = "dispatch_engine_join", skip(self), fields(handler = %self.name))]
    pub async fn join(&self) -> Result<(), DispatchError> {
        if self.state() == LifecycleState::Created {
            return Err(DispatchError::NotStarted {
                handler: self.name.clone(),
            });
        }

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match handle {
            Some(handle) => {
                if let Err(e) = handle.await {
                    error!(handler = %self.name, error = ?e, "Worker task panicked");
                    return Err(DispatchError::WorkerPanicked {
                        handler: self.name.clone(),
                        message: e.to_string(),
                    });
                }
            }
            None => {
                // Another caller owns the handle; follow the state instead.
                let mut rx = self.state.subscribe();
                let _ = rx.wait_for(|state| *state == LifecycleState::Stopped).await;
            }
        }

        debug!(handler = %self.name, "Dispatch engine joined");
        Ok(())
    }

    /// `stop()` followed by `join()`
    pub async fn shutdown(&self) -> Result<(), DispatchError> {
        self.stop()?;
        self.join().await
    }
}

impl fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("queue", &self.queue)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Dropping the engine stops it: the detached worker drains what is queued,
/// closes the step and exits.
impl Drop for DispatchEngine {
    fn drop(&mut self) {
        let stopping = self.state.send_if_modified(|state| {
            if *state == LifecycleState::Running {
                *state = LifecycleState::Stopping;
                true
            } else {
                false
            }
        });
        self.queue.close();
        self.stop.cancel();
        if stopping {
            debug!(handler = %self.name, pending = self.queue.len(), "Dispatch engine dropped while running");
        }
    }
}

/// Marks the engine stopped and releases queue waiters when the worker exits,
/// including when it unwinds from a panicking step.
struct WorkerExitGuard {
    queue: Arc<PayloadQueue>,
    state: Arc<watch::Sender<LifecycleState>>,
}

impl Drop for WorkerExitGuard {
    fn drop(&mut self) {
        self.queue.detach_consumer();
        self.state.send_replace(LifecycleState::Stopped);
    }
}

/// Result of delivering one payload
#[derive(Debug)]
enum Delivery {
    Delivered { attempts: u32 },
    Dropped { attempts: u32 },
}

/// Worker task that consumes payloads and runs the processing step
#[instrument(name = "dispatch_worker_loop", skip(step, ctx), fields(handler = %ctx.name))]
async fn engine_worker<P: ProcessingStep>(mut step: P, ctx: WorkerContext) {
    let _exit = WorkerExitGuard {
        queue: Arc::clone(&ctx.queue),
        state: Arc::clone(&ctx.state),
    };

    debug!(handler = %ctx.name, "Dispatch worker started");

    while let Some(payload) = ctx.queue.pop().await {
        let len = ctx.queue.len();
        ctx.metrics.set_queue_len(len);
        observability::record_queue_depth(&ctx.name, len);

        match deliver(&mut step, &payload, &ctx).await {
            Delivery::Delivered { attempts } => {
                observability::record_payload_completed(&ctx.name, AttemptOutcome::Success, attempts);
            }
            Delivery::Dropped { attempts } => {
                observability::record_payload_completed(
                    &ctx.name,
                    AttemptOutcome::Exhausted,
                    attempts,
                );
            }
        }

        ctx.queue.task_done();
    }

    if let Err(e) = step.close().await {
        error!(handler = %ctx.name, error = %e, "Close failed on shutdown");
    }

    debug!(handler = %ctx.name, "Dispatch worker stopped");
}

/// Run the processing step on one payload until it succeeds or the retry budget is spent.
///
/// The same payload is resubmitted on every attempt; it never goes back through the queue.
#[instrument(
    name = "dispatch_deliver",
    skip(step, payload, ctx),
    fields(handler = %ctx.name, source = %payload.source)
)]
async fn deliver<P: ProcessingStep>(
    step: &mut P,
    payload: &EventPayload,
    ctx: &WorkerContext,
) -> Delivery {
    let mut attempt_count: u32 = 0;

    loop {
        let attempt = attempt_count + 1;
        ctx.metrics.inc_attempt_count();

        match step.process(payload).await {
            Ok(()) => {
                ctx.metrics.inc_success_count();
                observability::record_attempt(&ctx.name, AttemptOutcome::Success, "none");
                info!(
                    handler = %ctx.name,
                    source = %payload.source,
                    timestamp = %payload.timestamp_rfc3339(),
                    attempt,
                    "Payload processed"
                );
                return Delivery::Delivered { attempts: attempt };
            }
            Err(e) => {
                attempt_count += 1;

                if ctx.retry.should_retry(attempt_count) {
                    ctx.metrics.inc_retry_count();
                    observability::record_attempt(&ctx.name, AttemptOutcome::Retry, e.kind().as_str());
                    let delay = ctx.retry.delay_for(attempt_count);
                    warn!(
                        handler = %ctx.name,
                        source = %payload.source,
                        timestamp = %payload.timestamp_rfc3339(),
                        attempt,
                        max_attempts = ctx.retry.max_attempts(),
                        kind = %e.kind(),
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Processing failed, retrying"
                    );
                    retry_pause(ctx, delay).await;
                } else {
                    ctx.metrics.inc_exhausted_count();
                    observability::record_attempt(
                        &ctx.name,
                        AttemptOutcome::Exhausted,
                        e.kind().as_str(),
                    );
                    error!(
                        handler = %ctx.name,
                        source = %payload.source,
                        timestamp = %payload.timestamp_rfc3339(),
                        attempts = attempt_count,
                        kind = %e.kind(),
                        error = %e,
                        "Retries exhausted, payload dropped"
                    );
                    return Delivery::Dropped {
                        attempts: attempt_count,
                    };
                }
            }
        }
    }
}

/// Sleep between attempts; a stop request cuts the pause short.
async fn retry_pause(ctx: &WorkerContext, delay: Duration) {
    if ctx.stop.is_cancelled() || delay.is_zero() {
        return;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = ctx.stop.cancelled() => {
            debug!(handler = %ctx.name, "Retry delay cut short by stop request");
        }
    }
}
