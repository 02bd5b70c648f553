// Kafka-backed durable queue.
//
// Kafka commits a contiguous offset per partition, not a per-message
// ack; a task dispatched out of delivery order (e.g. a retry on an
// earlier offset outlives a later one that succeeds immediately) must
// not let the committed offset run ahead of work still in flight, or a
// crash would silently drop it. `PartitionTracker` keeps the set of
// delivered-but-unacked offsets per partition and only advances the
// commit point up to the lowest one still outstanding.

use crate::{Delivery, DurableQueue};
use async_trait::async_trait;
use chronowheel_types::{QueueError, QueueHandle, TaskRecord};
use futures::stream::{self, BoxStream, StreamExt};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use rdkafka::util::Timeout;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub bootstrap_servers: String,
    pub stream_name: String,
    pub publish_timeout: Duration,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            stream_name: "chronowheel-tasks".to_string(),
            publish_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Default)]
struct PartitionTracker {
    outstanding: BTreeSet<i64>,
    delivered_max: Option<i64>,
    committed: Option<i64>,
}

impl PartitionTracker {
    fn on_delivered(&mut self, offset: i64) {
        self.outstanding.insert(offset);
        self.delivered_max = Some(self.delivered_max.map_or(offset, |m| m.max(offset)));
    }

    /// Returns `Some(offset)` when the commit point should advance,
    /// where `offset` is the next offset to resume from on restart.
    fn on_acked(&mut self, offset: i64) -> Option<i64> {
        self.outstanding.remove(&offset);
        let next_commit = match self.outstanding.iter().next() {
            Some(lowest_outstanding) => *lowest_outstanding,
            None => self.delivered_max? + 1,
        };
        if self.committed.is_some_and(|c| c >= next_commit) {
            return None;
        }
        self.committed = Some(next_commit);
        Some(next_commit)
    }
}

pub struct KafkaQueue {
    producer: FutureProducer,
    consumer_base_config: ClientConfig,
    topic: String,
    publish_timeout: Duration,
    consumer: Mutex<Option<Arc<StreamConsumer>>>,
    trackers: Arc<Mutex<HashMap<i32, PartitionTracker>>>,
}

impl KafkaQueue {
    pub fn connect(config: KafkaConfig) -> Result<Self, QueueError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("message.timeout.ms", "10000")
            .create()
            .map_err(|e| QueueError::PublishFailed(e.to_string()))?;

        let mut consumer_base_config = ClientConfig::new();
        consumer_base_config
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "6000")
            .set("enable.auto.commit", "false");

        Ok(Self {
            producer,
            consumer_base_config,
            topic: config.stream_name,
            publish_timeout: config.publish_timeout,
            consumer: Mutex::new(None),
            trackers: Arc::new(Mutex::new(HashMap::new())),
        })
    }
}

#[async_trait]
impl DurableQueue for KafkaQueue {
    async fn publish(&self, record: TaskRecord) -> Result<QueueHandle, QueueError> {
        let key = record.id.to_string();
        let payload = serde_json::to_vec(&record)
            .map_err(|e| QueueError::PublishFailed(format!("serialize task record: {e}")))?;

        let send_result = self
            .producer
            .send(
                FutureRecord::to(&self.topic).key(&key).payload(&payload),
                Timeout::After(self.publish_timeout),
            )
            .await;

        match send_result {
            Ok((partition, offset)) => Ok(QueueHandle { partition, offset }),
            Err((e, _owned_message)) => {
                error!(error = %e, task_id = %record.id, "publish to durable queue failed");
                Err(QueueError::PublishFailed(e.to_string()))
            }
        }
    }

    async fn subscribe(
        &self,
        consumer_name: &str,
    ) -> Result<BoxStream<'static, Delivery>, QueueError> {
        let mut config = self.consumer_base_config.clone();
        config.set("group.id", consumer_name);

        let consumer: StreamConsumer = config
            .create()
            .map_err(|e| QueueError::SubscribeFailed(e.to_string()))?;
        consumer
            .subscribe(&[self.topic.as_str()])
            .map_err(|e| QueueError::SubscribeFailed(e.to_string()))?;

        debug!(consumer_name, topic = %self.topic, "subscribed to durable queue");

        let consumer = Arc::new(consumer);
        *self.consumer.lock().expect("consumer mutex poisoned") = Some(Arc::clone(&consumer));
        let trackers = Arc::clone(&self.trackers);

        let stream = stream::unfold((consumer, trackers), |(consumer, trackers)| async move {
            loop {
                match consumer.recv().await {
                    Ok(message) => {
                        let partition = message.partition();
                        let offset = message.offset();
                        let payload = match message.payload() {
                            Some(p) => p,
                            None => {
                                warn!(partition, offset, "tombstone record, skipping");
                                continue;
                            }
                        };
                        let record: TaskRecord = match serde_json::from_slice(payload) {
                            Ok(r) => r,
                            Err(e) => {
                                let err = QueueError::SubscribeFailed(format!(
                                    "malformed record at partition {partition} offset {offset}: {e}"
                                ));
                                return Some((Err(err), (consumer, trackers)));
                            }
                        };
                        trackers
                            .lock()
                            .expect("tracker mutex poisoned")
                            .entry(partition)
                            .or_default()
                            .on_delivered(offset);
                        let handle = QueueHandle { partition, offset };
                        return Some((Ok((record, handle)), (consumer, trackers)));
                    }
                    Err(e) => {
                        return Some((
                            Err(QueueError::SubscribeFailed(e.to_string())),
                            (consumer, trackers),
                        ));
                    }
                }
            }
        });

        Ok(stream.boxed())
    }

    async fn ack(&self, handle: &QueueHandle) -> Result<(), QueueError> {
        let mut trackers = self.trackers.lock().expect("tracker mutex poisoned");
        let tracker = trackers.entry(handle.partition).or_default();

        let Some(next_commit) = tracker.on_acked(handle.offset) else {
            return Ok(());
        };
        drop(trackers);

        let consumer_guard = self.consumer.lock().expect("consumer mutex poisoned");
        let Some(consumer) = consumer_guard.as_ref() else {
            // No live subscription (e.g. a standalone publish-only client, or
            // tests against the in-memory double); nothing to commit.
            return Ok(());
        };

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&self.topic, handle.partition, Offset::Offset(next_commit))
            .map_err(|e| QueueError::AckFailed(e.to_string()))?;
        consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| QueueError::AckFailed(e.to_string()))
    }
}
