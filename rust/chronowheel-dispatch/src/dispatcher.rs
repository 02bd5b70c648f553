// Worker pool: pulls due tasks off the wheel's emission channel,
// performs the callback, classifies the response, and either
// acknowledges the durable queue or re-inserts the task for retry.

use crate::metrics::DispatchMetrics;
use crate::retry::{next_backoff, RetryConfig};
use chronowheel_queue::DurableQueue;
use chronowheel_types::{DispatchOutcome, Task};
use chronowheel_wheel::WheelHandle;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct Dispatcher {
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawn `worker_count` workers sharing one emission receiver. Each
    /// worker processes exactly one task at a time and never touches
    /// another worker's in-flight task.
    pub fn spawn(
        worker_count: usize,
        emit_rx: mpsc::Receiver<Task>,
        queue: Arc<dyn DurableQueue>,
        wheel: WheelHandle,
        retry_config: RetryConfig,
        metrics: Arc<DispatchMetrics>,
    ) -> Self {
        let emit_rx = Arc::new(Mutex::new(emit_rx));
        let client = Client::new();

        let workers = (0..worker_count.max(1))
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&emit_rx),
                    client.clone(),
                    Arc::clone(&queue),
                    wheel.clone(),
                    retry_config.clone(),
                    Arc::clone(&metrics),
                ))
            })
            .collect();

        Self { workers }
    }

    /// Wait for every worker to exit, bounded by `timeout`. Called once
    /// the emission channel has been closed (tick driver stopped), so
    /// workers drain their current attempt and then see the channel end.
    pub async fn join(self, timeout: Duration) {
        let all = futures::future::join_all(self.workers);
        if tokio::time::timeout(timeout, all).await.is_err() {
            warn!("dispatcher workers did not finish within shutdown timeout");
        }
    }
}

async fn run_worker(
    worker_id: usize,
    emit_rx: Arc<Mutex<mpsc::Receiver<Task>>>,
    client: Client,
    queue: Arc<dyn DurableQueue>,
    wheel: WheelHandle,
    retry_config: RetryConfig,
    metrics: Arc<DispatchMetrics>,
) {
    loop {
        let task = {
            let mut rx = emit_rx.lock().await;
            rx.recv().await
        };
        let Some(task) = task else {
            break;
        };

        metrics.record_attempt();
        let outcome = deliver(&client, &task, retry_config.per_attempt_timeout).await;

        match outcome {
            DispatchOutcome::Success => {
                metrics.record_success();
                ack(&queue, &task).await;
            }
            DispatchOutcome::Permanent => {
                warn!(worker_id, task_id = %task.record.id, "destination rejected callback, abandoning");
                metrics.record_abandoned();
                ack(&queue, &task).await;
            }
            DispatchOutcome::Transient if task.record.attempt >= task.record.max_attempts => {
                warn!(worker_id, task_id = %task.record.id, attempt = task.record.attempt, "retry budget exhausted, abandoning");
                metrics.record_abandoned();
                ack(&queue, &task).await;
            }
            DispatchOutcome::Transient => {
                let delay = next_backoff(&retry_config, task.record.attempt);
                let mut retry_task = task;
                retry_task.record = retry_task.record.next_attempt();
                retry_task.record.scheduled_at = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
                metrics.record_retried();
                info!(
                    worker_id,
                    task_id = %retry_task.record.id,
                    attempt = retry_task.record.attempt,
                    delay_ms = delay.as_millis() as u64,
                    "scheduling retry after transient failure"
                );
                if let Err(e) = wheel.insert(retry_task, Utc::now()).await {
                    warn!(worker_id, error = %e, "failed to re-insert retrying task into wheel");
                }
            }
        }
    }
    info!(worker_id, "dispatcher worker stopped");
}

async fn deliver(client: &Client, task: &Task, per_attempt_timeout: Duration) -> DispatchOutcome {
    let result = client
        .post(&task.record.callback_url)
        .timeout(per_attempt_timeout)
        .json(&task.record.payload)
        .send()
        .await;

    match result {
        Ok(response) => classify_status(response.status()),
        Err(e) if e.is_timeout() => {
            warn!(task_id = %task.record.id, "callback timed out");
            DispatchOutcome::Transient
        }
        Err(e) => {
            warn!(task_id = %task.record.id, error = %e, "callback network error");
            DispatchOutcome::Transient
        }
    }
}

fn classify_status(status: StatusCode) -> DispatchOutcome {
    if status.is_success() {
        DispatchOutcome::Success
    } else if status.is_client_error() {
        DispatchOutcome::Permanent
    } else {
        DispatchOutcome::Transient
    }
}

async fn ack(queue: &Arc<dyn DurableQueue>, task: &Task) {
    if let Err(e) = queue.ack(&task.handle).await {
        warn!(task_id = %task.record.id, error = %e, "failed to acknowledge durable queue record");
    }
}
