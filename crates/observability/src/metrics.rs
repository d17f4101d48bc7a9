//! 分发引擎指标收集模块
//!
//! 通过 `metrics` facade 记录每个 handler 的处理结果，
//! 安装 Prometheus recorder 后即可导出。未安装 recorder 时所有调用都是空操作。

use metrics::{counter, gauge, histogram};

/// 一次处理尝试的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// 处理成功
    Success,
    /// 失败，仍会重试
    Retry,
    /// 失败，重试次数耗尽，payload 被丢弃
    Exhausted,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Retry => "retry",
            Self::Exhausted => "exhausted",
        }
    }
}

/// 记录一次处理尝试
///
/// # Example
///
/// ```ignore
/// use observability::metrics::{record_attempt, AttemptOutcome};
///
/// record_attempt("uploader", AttemptOutcome::Retry, "connectivity");
/// ```
pub fn record_attempt(handler: &str, outcome: AttemptOutcome, kind: &'static str) {
    counter!(
        "event_listener_attempts_total",
        "handler" => handler.to_string(),
        "outcome" => outcome.as_str(),
        "kind" => kind
    )
    .increment(1);
}

/// 记录一个 payload 处理完成 (成功或丢弃) 所用的尝试次数
pub fn record_payload_completed(handler: &str, outcome: AttemptOutcome, attempts: u32) {
    counter!(
        "event_listener_payloads_total",
        "handler" => handler.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);

    histogram!(
        "event_listener_attempts_per_payload",
        "handler" => handler.to_string()
    )
    .record(attempts as f64);
}

/// 记录入队被拒绝 (队列满 / 引擎已停止)
pub fn record_payload_rejected(handler: &str, reason: &'static str) {
    counter!(
        "event_listener_rejected_total",
        "handler" => handler.to_string(),
        "reason" => reason
    )
    .increment(1);
}

/// 记录队列深度
pub fn record_queue_depth(handler: &str, depth: usize) {
    gauge!("event_listener_queue_depth", "handler" => handler.to_string()).set(depth as f64);
}
