//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 配置 -> Dispatcher -> handler 的端到端测试
//! - 重试 / 背压 / 生命周期场景

#[cfg(test)]
mod support {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use contracts::{EventPayload, Measurement, ProcessError, ProcessingStep};
    use tokio::time::Instant;

    /// One recorded `process` call
    #[derive(Debug, Clone)]
    pub struct Call {
        pub source: String,
        pub at: Instant,
    }

    /// Step that records every call and fails according to a script
    pub struct RecordingStep {
        name: String,
        calls: Arc<Mutex<Vec<Call>>>,
        script: VecDeque<bool>,
        always_fail: bool,
        work: Duration,
    }

    impl RecordingStep {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                calls: Arc::new(Mutex::new(Vec::new())),
                script: VecDeque::new(),
                always_fail: false,
                work: Duration::ZERO,
            }
        }

        /// Results of the first calls, `true` = success; later calls succeed
        pub fn scripted(mut self, script: &[bool]) -> Self {
            self.script = script.iter().copied().collect();
            self
        }

        pub fn failing(mut self) -> Self {
            self.always_fail = true;
            self
        }

        pub fn slow(mut self, work: Duration) -> Self {
            self.work = work;
            self
        }

        pub fn calls(&self) -> Arc<Mutex<Vec<Call>>> {
            Arc::clone(&self.calls)
        }
    }

    impl ProcessingStep for RecordingStep {
        fn name(&self) -> &str {
            &self.name
        }

        async fn process(&mut self, payload: &EventPayload) -> Result<(), ProcessError> {
            if !self.work.is_zero() {
                tokio::time::sleep(self.work).await;
            }
            self.calls.lock().unwrap().push(Call {
                source: payload.source.clone(),
                at: Instant::now(),
            });

            let ok = !self.always_fail && self.script.pop_front().unwrap_or(true);
            if ok {
                Ok(())
            } else {
                Err(ProcessError::connectivity("endpoint unreachable"))
            }
        }

        async fn close(&mut self) -> Result<(), ProcessError> {
            Ok(())
        }
    }

    pub fn sources(calls: &Arc<Mutex<Vec<Call>>>) -> Vec<String> {
        calls.lock().unwrap().iter().map(|c| c.source.clone()).collect()
    }

    pub fn payload(source: &str) -> EventPayload {
        let at = Utc.with_ymd_and_hms(2016, 5, 1, 12, 0, 0).unwrap();
        EventPayload::new(source, at)
            .with_measurement("Array Voltage", Measurement::new(53.41, "V", "Array"))
            .with_measurement("Battery Voltage", Measurement::new(12.6, "V", "Battery"))
    }
}

#[cfg(test)]
mod contract_tests {
    #[test]
    fn test_contracts_compile() {
        // 验证 contracts crate 可编译
        let _ = contracts::ConfigVersion::V1;
    }

    #[test]
    fn test_engine_defaults() {
        let config = contracts::EngineConfig::default();
        assert_eq!(config.queue_capacity, 5);
        assert_eq!(config.retry_max, 3);
        assert_eq!(config.retry_delay_ms, 1000);
        assert_eq!(config.backpressure, contracts::Backpressure::Block);
    }
}

#[cfg(test)]
mod scenario_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::{Backpressure, EngineConfig};
    use dispatcher::{DispatchEngine, DispatchError, Dispatcher, LifecycleState};

    use crate::support::{payload, sources, RecordingStep};

    fn engine_config(queue_capacity: usize, retry_delay_ms: u64) -> EngineConfig {
        EngineConfig {
            queue_capacity,
            retry_delay_ms,
            ..Default::default()
        }
    }

    /// q_max=5, three payloads, the first fails once: 4 calls, 1 retry, 3 successes
    #[tokio::test(start_paused = true)]
    async fn test_single_transient_failure() {
        let step = RecordingStep::new("uploader")
            .scripted(&[false, true])
            .slow(Duration::from_millis(10));
        let calls = step.calls();
        let engine = DispatchEngine::new(step, engine_config(5, 1000)).unwrap();
        engine.start().unwrap();

        for source in ["a", "b", "c"] {
            engine.enqueue(payload(source)).await.unwrap();
        }
        engine.drain().await.unwrap();

        assert_eq!(sources(&calls), ["a", "a", "b", "c"]);
        let metrics = engine.metrics();
        assert_eq!(metrics.attempt_count, 4);
        assert_eq!(metrics.retry_count, 1);
        assert_eq!(metrics.success_count, 3);

        engine.shutdown().await.unwrap();
        assert_eq!(engine.state(), LifecycleState::Stopped);
    }

    /// Delays grow by the backoff factor between attempts of one payload
    #[tokio::test(start_paused = true)]
    async fn test_retry_delays_follow_backoff() {
        let step = RecordingStep::new("uploader").failing();
        let calls = step.calls();
        let config = EngineConfig {
            backoff_factor: 2.0,
            ..engine_config(5, 1000)
        };
        let engine = DispatchEngine::new(step, config).unwrap();
        engine.start().unwrap();

        engine.enqueue(payload("a")).await.unwrap();
        engine.drain().await.unwrap();

        let calls = calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        let first_gap = calls[1].at - calls[0].at;
        let second_gap = calls[2].at - calls[1].at;
        assert!(first_gap >= Duration::from_secs(1) && first_gap < Duration::from_millis(1100));
        assert!(second_gap >= Duration::from_secs(2) && second_gap < Duration::from_millis(2100));
        assert_eq!(engine.metrics().exhausted_count, 1);

        engine.shutdown().await.unwrap();
    }

    /// Retry budget exhausted: exactly retry_max calls, the next payload still flows
    #[tokio::test(start_paused = true)]
    async fn test_exhausted_payload_does_not_block_queue() {
        let step = RecordingStep::new("uploader").scripted(&[false, false, false]);
        let calls = step.calls();
        let engine = DispatchEngine::new(step, engine_config(5, 1000)).unwrap();
        engine.start().unwrap();

        engine.enqueue(payload("doomed")).await.unwrap();
        engine.enqueue(payload("fine")).await.unwrap();
        engine.drain().await.unwrap();

        assert_eq!(sources(&calls), ["doomed", "doomed", "doomed", "fine"]);
        assert_eq!(engine.metrics().exhausted_count, 1);
        assert_eq!(engine.metrics().success_count, 1);

        engine.shutdown().await.unwrap();
    }

    /// The (q_max+1)-th enqueue waits for the worker to free a slot
    #[tokio::test(start_paused = true)]
    async fn test_producer_blocks_when_queue_full() {
        let step = RecordingStep::new("slow").slow(Duration::from_secs(1));
        let engine = Arc::new(DispatchEngine::new(step, engine_config(5, 1000)).unwrap());
        engine.start().unwrap();

        // First payload is picked up immediately, five more fill the queue
        engine.enqueue(payload("0")).await.unwrap();
        tokio::task::yield_now().await;
        for i in 1..=5 {
            engine.enqueue(payload(&i.to_string())).await.unwrap();
        }
        assert_eq!(engine.queue_len(), 5);

        let started = tokio::time::Instant::now();
        engine.enqueue(payload("6")).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(900));

        engine.drain().await.unwrap();
        assert_eq!(engine.metrics().success_count, 7);
        engine.shutdown().await.unwrap();
    }

    /// A failing handler neither delays nor starves its neighbours
    #[tokio::test(start_paused = true)]
    async fn test_fanout_isolates_failing_handler() {
        let healthy = RecordingStep::new("healthy");
        let broken = RecordingStep::new("broken").failing();
        let healthy_calls = healthy.calls();
        let broken_calls = broken.calls();

        let dispatcher = Dispatcher::with_engines(vec![
            DispatchEngine::new(healthy, engine_config(5, 1000)).unwrap(),
            DispatchEngine::new(broken, engine_config(5, 1000)).unwrap(),
        ]);
        dispatcher.start().unwrap();

        for source in ["a", "b"] {
            let outcome = dispatcher.dispatch(payload(source)).await;
            assert_eq!(outcome.accepted, 2);
        }

        dispatcher.engine("healthy").unwrap().drain().await.unwrap();
        assert_eq!(sources(&healthy_calls), ["a", "b"]);

        dispatcher.drain().await.unwrap();
        assert_eq!(broken_calls.lock().unwrap().len(), 6);

        dispatcher.shutdown().await.unwrap();
        let metrics = dispatcher.metrics();
        assert_eq!(metrics[0].1.success_count, 2);
        assert_eq!(metrics[1].1.exhausted_count, 2);
    }

    /// Reject mode: a full queue refuses instead of waiting
    #[tokio::test(start_paused = true)]
    async fn test_reject_backpressure() {
        let step = RecordingStep::new("slow").slow(Duration::from_secs(1));
        let config = EngineConfig {
            backpressure: Backpressure::Reject,
            ..engine_config(2, 1000)
        };
        let engine = DispatchEngine::new(step, config).unwrap();

        engine.enqueue(payload("1")).await.unwrap();
        engine.enqueue(payload("2")).await.unwrap();
        let err = engine.enqueue(payload("3")).await.unwrap_err();
        assert!(matches!(err, DispatchError::QueueFull { capacity: 2, .. }));

        engine.start().unwrap();
        engine.drain().await.unwrap();
        let metrics = engine.metrics();
        assert_eq!(metrics.success_count, 2);
        assert_eq!(metrics.rejected_count, 1);
        engine.shutdown().await.unwrap();
    }

    /// stop() cuts a pending retry delay short but still runs the remaining attempts
    #[tokio::test]
    async fn test_stop_during_retry_delay() {
        let step = RecordingStep::new("uploader").failing();
        let calls = step.calls();
        let engine = DispatchEngine::new(step, engine_config(5, 60_000)).unwrap();
        engine.start().unwrap();

        engine.enqueue(payload("a")).await.unwrap();
        engine.enqueue(payload("b")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        engine.stop().unwrap();
        assert!(matches!(
            engine.enqueue(payload("late")).await,
            Err(DispatchError::EngineStopped { .. })
        ));
        tokio::time::timeout(Duration::from_secs(2), engine.join())
            .await
            .expect("join must not wait out the retry delay")
            .unwrap();

        assert_eq!(sources(&calls), ["a", "a", "a", "b", "b", "b"]);
        assert_eq!(engine.state(), LifecycleState::Stopped);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::io::Write;

    use config_loader::ConfigLoader;
    use dispatcher::{create_dispatcher, LifecycleState};
    use tokio::sync::mpsc;

    use crate::support::payload;

    /// End-to-end test: config file -> ConfigLoader -> Dispatcher -> handlers
    #[tokio::test]
    async fn test_e2e_config_to_handlers() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("event-ran");

        let mut config = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            config,
            r#"
[engine]
queue_capacity = 4
retry_delay_ms = 10

[[handlers]]
name = "console"
handler_type = "log"

[[handlers]]
name = "notify"
handler_type = "command"
[handlers.params]
command = "touch {}"
"#,
            marker.display()
        )
        .unwrap();

        let blueprint = ConfigLoader::load_from_path(config.path()).unwrap();
        let dispatcher = create_dispatcher(&blueprint).unwrap();
        assert_eq!(dispatcher.len(), 2);

        let (tx, rx) = mpsc::channel(8);
        let handle = dispatcher.spawn(rx);
        for i in 0..3 {
            tx.send(payload(&format!("solar{i}"))).await.unwrap();
        }
        drop(tx);

        let metrics = handle.await.unwrap().unwrap();
        for (name, snapshot) in &metrics {
            assert_eq!(snapshot.success_count, 3, "handler {name}");
            assert_eq!(snapshot.exhausted_count, 0, "handler {name}");
        }
        assert!(marker.exists());
    }

    /// Command failures are retried and then dropped without affecting the log handler
    #[tokio::test]
    async fn test_e2e_failing_command_handler() {
        let blueprint = ConfigLoader::load_from_str(
            r#"
[engine]
retry_delay_ms = 5
retry_max = 2

[[handlers]]
name = "console"
handler_type = "log"

[[handlers]]
name = "broken"
handler_type = "command"
[handlers.params]
command = "false"
"#,
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();

        let dispatcher = create_dispatcher(&blueprint).unwrap();
        dispatcher.start().unwrap();
        dispatcher.dispatch(payload("solar")).await;
        dispatcher.drain().await.unwrap();
        dispatcher.shutdown().await.unwrap();

        let console = dispatcher.engine("console").unwrap();
        let broken = dispatcher.engine("broken").unwrap();
        assert_eq!(console.metrics().success_count, 1);
        assert_eq!(broken.metrics().attempt_count, 2);
        assert_eq!(broken.metrics().exhausted_count, 1);
        assert_eq!(broken.state(), LifecycleState::Stopped);
    }

    /// A notify handler whose label is missing from the payload fails every
    /// attempt as malformed input before anything is sent
    #[tokio::test]
    async fn test_e2e_notify_handler_with_unknown_label() {
        let blueprint = ConfigLoader::load_with_env(
            r#"
[engine]
retry_delay_ms = 5
retry_max = 2

[[handlers]]
name = "console"
handler_type = "log"

[[handlers]]
name = "announcer"
handler_type = "notify"
[handlers.params]
url = "${HOOK_URL}"
value_label = "Load Current"
"#,
            config_loader::ConfigFormat::Toml,
            |name| (name == "HOOK_URL").then(|| "http://127.0.0.1:9/hook".to_string()),
        )
        .unwrap();
        assert_eq!(blueprint.handlers[1].param("url"), Some("http://127.0.0.1:9/hook"));

        let dispatcher = create_dispatcher(&blueprint).unwrap();
        dispatcher.start().unwrap();
        let outcome = dispatcher.dispatch(payload("solar")).await;
        assert_eq!(outcome.accepted, 2);
        dispatcher.drain().await.unwrap();
        dispatcher.shutdown().await.unwrap();

        let announcer = dispatcher.engine("announcer").unwrap();
        assert_eq!(announcer.metrics().attempt_count, 2);
        assert_eq!(announcer.metrics().exhausted_count, 1);
        assert_eq!(dispatcher.engine("console").unwrap().metrics().success_count, 1);
    }
}
