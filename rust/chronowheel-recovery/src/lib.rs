// chronowheel-recovery: the permanent bridge from the durable queue to the
// timing wheel.
//
// On startup this replays every record the durable queue still considers
// unacknowledged under a fixed consumer name — exactly the tasks that were
// `pending-in-wheel` or `retrying` when the process last stopped. It then
// keeps consuming for the rest of the process lifetime, because fresh
// ingress publishes arrive on the same subscription: there is no separate
// "startup mode", only one queue-to-wheel path that both new and replayed
// tasks take.

use chronowheel_queue::{Delivery, DurableQueue};
use chronowheel_types::{QueueError, Task};
use chronowheel_wheel::WheelHandle;
use chrono::Utc;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Handle to the running loader. Dropping this without calling
/// [`RecoveryHandle::shutdown`] leaves the loader running; the coordinator
/// is expected to call `shutdown` explicitly as part of its own teardown.
pub struct RecoveryHandle {
    join: JoinHandle<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl RecoveryHandle {
    /// Signal the loader to stop consuming and wait for it to exit. Safe to
    /// call even if the underlying subscription stream already ended on its
    /// own.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.join.await {
            warn!(error = %e, "recovery loader task panicked");
        }
    }
}

/// Subscribe under `consumer_name` and spawn the loader task. Returns once
/// the subscription is established, so the caller (the scheduler
/// coordinator) knows recovery has started before it opens the ingress
/// adapter to new traffic.
pub async fn spawn(
    queue: Arc<dyn DurableQueue>,
    wheel: WheelHandle,
    consumer_name: impl Into<String>,
) -> Result<RecoveryHandle, QueueError> {
    let consumer_name = consumer_name.into();
    let stream = queue.subscribe(&consumer_name).await?;
    info!(consumer_name, "recovery loader subscribed to durable queue");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let join = tokio::spawn(run(stream, wheel, shutdown_rx));
    Ok(RecoveryHandle {
        join,
        shutdown_tx: Some(shutdown_tx),
    })
}

async fn run(
    mut stream: BoxStream<'static, Delivery>,
    wheel: WheelHandle,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        let delivery = tokio::select! {
            biased;
            _ = &mut shutdown_rx => {
                debug!("recovery loader received shutdown signal");
                break;
            }
            delivery = stream.next() => delivery,
        };

        let Some(delivery) = delivery else {
            debug!("durable queue subscription ended, recovery loader stopping");
            break;
        };

        let (record, handle) = match delivery {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "skipping malformed or unreadable delivery");
                continue;
            }
        };

        let task_id = record.id;
        let task = Task { record, handle };
        let now = Utc::now();
        if let Err(e) = wheel.insert(task, now).await {
            warn!(%task_id, error = %e, "recovery loader could not re-insert task into wheel");
        }
    }
}
