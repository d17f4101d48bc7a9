//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
///
/// Per-payload processing failures never show up here; they are retried and
/// logged inside the worker. These errors report misuse of the engine
/// lifecycle or a payload the engine refused to accept.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Handler creation error
    #[error("failed to create handler: {0}")]
    HandlerCreation(#[from] contracts::ContractError),

    /// Engine settings that cannot work
    #[error("invalid engine config for '{handler}': {message}")]
    InvalidConfig { handler: String, message: String },

    /// `start()` called more than once
    #[error("engine '{handler}' already started")]
    AlreadyStarted { handler: String },

    /// Operation needs a running worker
    #[error("engine '{handler}' has not been started")]
    NotStarted { handler: String },

    /// `start()` called outside a tokio runtime
    #[error("engine '{handler}' must be started from within a tokio runtime")]
    NoRuntime { handler: String },

    /// Queue full - payload rejected
    #[error("queue full for handler '{handler}' (capacity {capacity}), payload from '{source_id}' rejected")]
    QueueFull {
        handler: String,
        capacity: usize,
        source_id: String,
    },

    /// Engine is stopping or stopped
    #[error("engine '{handler}' is stopped, payload from '{source_id}' rejected")]
    EngineStopped { handler: String, source_id: String },

    /// Worker went away while items were still queued
    #[error("worker of '{handler}' exited with {pending} payload(s) still queued")]
    WorkerAborted { handler: String, pending: usize },

    /// Worker task panicked
    #[error("worker of '{handler}' panicked: {message}")]
    WorkerPanicked { handler: String, message: String },
}

impl DispatchError {
    /// Create an invalid config error
    pub fn invalid_config(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            handler: handler.into(),
            message: message.into(),
        }
    }

    /// True when the payload was refused at enqueue time
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::QueueFull { .. } | Self::EngineStopped { .. })
    }
}
