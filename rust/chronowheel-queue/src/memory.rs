// In-process durable queue double: no broker, no persistence across
// process restarts, but the same at-least-once publish/subscribe/ack
// contract as the Kafka backend. Used by crate and integration tests
// that would otherwise need a running broker.

use crate::{Delivery, DurableQueue};
use async_trait::async_trait;
use chronowheel_types::{QueueError, QueueHandle, TaskRecord};
use futures::stream::{BoxStream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Default)]
pub struct MemoryQueue {
    next_offset: AtomicI64,
    records: Mutex<HashMap<i64, TaskRecord>>,
    acked: Mutex<HashSet<i64>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Delivery>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records published but not yet acknowledged.
    pub fn outstanding(&self) -> usize {
        let records = self.records.lock().expect("records mutex poisoned");
        let acked = self.acked.lock().expect("acked mutex poisoned");
        records.len() - acked.len()
    }
}

#[async_trait]
impl DurableQueue for MemoryQueue {
    async fn publish(&self, record: TaskRecord) -> Result<QueueHandle, QueueError> {
        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        let handle = QueueHandle {
            partition: 0,
            offset,
        };
        self.records
            .lock()
            .expect("records mutex poisoned")
            .insert(offset, record.clone());

        let mut subscribers = self.subscribers.lock().expect("subscribers mutex poisoned");
        subscribers.retain(|tx| tx.send(Ok((record.clone(), handle.clone()))).is_ok());

        Ok(handle)
    }

    async fn subscribe(
        &self,
        _consumer_name: &str,
    ) -> Result<BoxStream<'static, Delivery>, QueueError> {
        let (tx, rx) = mpsc::unbounded_channel();

        // Replay whatever is still unacked before handing off to live
        // publishes, mirroring redelivery after a crash.
        let records = self.records.lock().expect("records mutex poisoned");
        let acked = self.acked.lock().expect("acked mutex poisoned");
        let mut backlog: Vec<(i64, TaskRecord)> = records
            .iter()
            .filter(|(offset, _)| !acked.contains(offset))
            .map(|(offset, record)| (*offset, record.clone()))
            .collect();
        backlog.sort_by_key(|(offset, _)| *offset);
        drop(acked);
        drop(records);

        for (offset, record) in backlog {
            let handle = QueueHandle {
                partition: 0,
                offset,
            };
            let _ = tx.send(Ok((record, handle)));
        }

        self.subscribers
            .lock()
            .expect("subscribers mutex poisoned")
            .push(tx);

        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn ack(&self, handle: &QueueHandle) -> Result<(), QueueError> {
        self.acked
            .lock()
            .expect("acked mutex poisoned")
            .insert(handle.offset);
        Ok(())
    }
}
