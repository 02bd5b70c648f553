// End-to-end exercises of the core pipeline: ingress validation, wheel,
// dispatcher, and the durable-queue-backed crash/recovery contract. Wired
// directly from the component crates (rather than through `Coordinator`,
// which talks to a real Kafka broker) so these run against the in-memory
// queue double, matching spec §8's concrete scenarios.

use chronowheel_dispatch::{DispatchMetrics, Dispatcher, RetryConfig};
use chronowheel_queue::{DurableQueue, MemoryQueue};
use chronowheel_types::{Task, TaskId, TaskRecord};
use chronowheel_wheel::WheelConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn record_for(url: String, delay: chrono::Duration, max_attempts: u32) -> TaskRecord {
    TaskRecord {
        id: TaskId::new(),
        callback_url: url,
        payload: serde_json::json!({"hello": "world"}),
        scheduled_at: chrono::Utc::now() + delay,
        attempt: 1,
        max_attempts,
    }
}

#[tokio::test(start_paused = true)]
async fn zero_delay_success_fires_once_and_acks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/echo"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let queue: Arc<dyn DurableQueue> = Arc::new(MemoryQueue::new());
    let (emit_tx, emit_rx) = mpsc::channel(16);
    let (wheel, _wheel_join) = chronowheel_wheel::spawn(WheelConfig::default(), emit_tx);
    let metrics = Arc::new(DispatchMetrics::new());

    let record = record_for(format!("{}/echo", server.uri()), chrono::Duration::zero(), 5);
    let handle = queue.publish(record.clone()).await.unwrap();
    wheel
        .insert(Task { record, handle }, chrono::Utc::now())
        .await
        .unwrap();

    let dispatcher = Dispatcher::spawn(
        1,
        emit_rx,
        Arc::clone(&queue),
        wheel.clone(),
        RetryConfig::default(),
        Arc::clone(&metrics),
    );

    tokio::time::advance(chronowheel_wheel::DEFAULT_TICK_DURATION * 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snap = metrics.snapshot();
    assert_eq!(snap.succeeded_total, 1);
    assert_eq!(snap.failed_total, 0);
    assert_eq!(snap.retried_total, 0);

    wheel.shutdown().await;
    drop(dispatcher);
}

#[tokio::test(start_paused = true)]
async fn permanent_failure_abandons_after_a_single_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/reject"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let memory_queue = Arc::new(MemoryQueue::new());
    let queue: Arc<dyn DurableQueue> = Arc::clone(&memory_queue) as Arc<dyn DurableQueue>;
    let (emit_tx, emit_rx) = mpsc::channel(16);
    let (wheel, _wheel_join) = chronowheel_wheel::spawn(WheelConfig::default(), emit_tx);
    let metrics = Arc::new(DispatchMetrics::new());

    let record = record_for(format!("{}/reject", server.uri()), chrono::Duration::zero(), 5);
    let handle = queue.publish(record.clone()).await.unwrap();
    wheel
        .insert(Task { record, handle }, chrono::Utc::now())
        .await
        .unwrap();

    let dispatcher = Dispatcher::spawn(
        1,
        emit_rx,
        Arc::clone(&queue),
        wheel.clone(),
        RetryConfig::default(),
        Arc::clone(&metrics),
    );

    tokio::time::advance(chronowheel_wheel::DEFAULT_TICK_DURATION * 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snap = metrics.snapshot();
    assert_eq!(snap.failed_total, 1);
    assert_eq!(snap.retried_total, 0);
    assert_eq!(memory_queue.outstanding(), 0, "abandoned task must still be acked");

    wheel.shutdown().await;
    drop(dispatcher);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_exhaust_the_retry_budget_then_abandon() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let memory_queue = Arc::new(MemoryQueue::new());
    let queue: Arc<dyn DurableQueue> = Arc::clone(&memory_queue) as Arc<dyn DurableQueue>;
    let (emit_tx, emit_rx) = mpsc::channel(16);
    let (wheel, _wheel_join) = chronowheel_wheel::spawn(WheelConfig::default(), emit_tx);
    let metrics = Arc::new(DispatchMetrics::new());

    let max_attempts = 3;
    let record = record_for(
        format!("{}/flaky", server.uri()),
        chrono::Duration::zero(),
        max_attempts,
    );
    let handle = queue.publish(record.clone()).await.unwrap();
    wheel
        .insert(Task { record, handle }, chrono::Utc::now())
        .await
        .unwrap();

    let retry_config = RetryConfig {
        base_delay: Duration::from_millis(50),
        max_delay: Duration::from_secs(1),
        jitter_fraction: 0.0,
        max_attempts,
        per_attempt_timeout: Duration::from_secs(5),
    };
    let dispatcher = Dispatcher::spawn(
        1,
        emit_rx,
        Arc::clone(&queue),
        wheel.clone(),
        retry_config,
        Arc::clone(&metrics),
    );

    // Advance well past every attempt's backoff window.
    for _ in 0..20 {
        tokio::time::advance(Duration::from_millis(200)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let snap = metrics.snapshot();
    assert_eq!(snap.dispatched_total, max_attempts as u64);
    assert_eq!(snap.retried_total, (max_attempts - 1) as u64);
    assert_eq!(snap.failed_total, 1);
    assert_eq!(
        memory_queue.outstanding(),
        0,
        "exhausted task must be acked, not left outstanding"
    );

    wheel.shutdown().await;
    drop(dispatcher);
}

#[tokio::test(start_paused = true)]
async fn unacknowledged_tasks_survive_a_simulated_crash_and_restart() {
    // Simulate the crash: publish records to the durable queue but never
    // start a wheel or dispatcher against it, so nothing gets acked.
    let queue = Arc::new(MemoryQueue::new());
    let mut published_ids = Vec::new();
    for _ in 0..25 {
        let record = record_for(
            "https://example.com/hook".to_string(),
            chrono::Duration::zero(),
            5,
        );
        published_ids.push(record.id);
        queue.publish(record).await.unwrap();
    }
    assert_eq!(queue.outstanding(), 25);

    // "Restart": spin up a fresh wheel and recovery loader against the same
    // queue. Every unacknowledged record must reappear in the wheel with
    // its original attempt number.
    let (emit_tx, mut emit_rx) = mpsc::channel(64);
    let (wheel, _wheel_join) = chronowheel_wheel::spawn(WheelConfig::default(), emit_tx);
    let recovery = chronowheel_recovery::spawn(
        Arc::clone(&queue) as Arc<dyn DurableQueue>,
        wheel.clone(),
        "chronowheel-recovery-loader",
    )
    .await
    .unwrap();

    tokio::time::advance(chronowheel_wheel::DEFAULT_TICK_DURATION + Duration::from_millis(1)).await;

    let mut recovered = std::collections::HashSet::new();
    for _ in 0..25 {
        let task = tokio::time::timeout(Duration::from_secs(1), emit_rx.recv())
            .await
            .expect("recovered task should fire within one tick")
            .expect("emission channel should stay open");
        assert_eq!(task.record.attempt, 1);
        recovered.insert(task.record.id);
    }

    assert_eq!(recovered.len(), 25);
    for id in &published_ids {
        assert!(recovered.contains(id), "task {id} was not replayed after the simulated crash");
    }

    recovery.shutdown().await;
    wheel.shutdown().await;
}
