//! # Dispatcher
//!
//! 异步事件分发模块。
//!
//! 负责：
//! - 有界队列 + 单 worker 的 `DispatchEngine`
//! - 失败重试（`RetryPolicy`），不阻塞生产者
//! - Fan-out 到多个 handler

pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod queue;
pub mod retry;

pub use contracts::{EventPayload, ProcessingStep};
pub use dispatcher::{
    DispatchOutcome, Dispatcher, DispatcherBuilder, DispatcherConfig, create_dispatcher,
};
pub use engine::{DispatchEngine, LifecycleState};
pub use error::DispatchError;
pub use handlers::{
    CommandStep, HttpStep, HttpStepConfig, LogStep, MessageTemplate, NotifyStep, NotifyStepConfig,
    create_engine,
};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use queue::{BoundedQueue, DrainError, PushError};
pub use retry::RetryPolicy;
