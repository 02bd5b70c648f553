// chronowheel-queue: durable append-and-acknowledge queue client.
//
// `DurableQueue` is the boundary between the scheduler and whatever
// persistent, replicated log backs it. The only implementation shipped
// here is Kafka-backed, plus an in-memory double for tests that don't
// want a broker.

pub mod kafka;
pub mod memory;

pub use kafka::{KafkaConfig, KafkaQueue};
pub use memory::MemoryQueue;

use async_trait::async_trait;
use chronowheel_types::{QueueError, QueueHandle, TaskRecord};
use futures::stream::BoxStream;

/// A single delivery from the durable queue: the deserialized record
/// and the handle needed to later ack it.
pub type Delivery = Result<(TaskRecord, QueueHandle), QueueError>;

/// Append-and-acknowledge interface to a persistent message stream.
///
/// Implementations must provide at-least-once delivery and per-record
/// durability: `publish` does not return until the record is durable,
/// and any record delivered by `subscribe` but never `ack`'d is
/// redelivered after a restart.
#[async_trait]
pub trait DurableQueue: Send + Sync {
    /// Append `record` to the log. Blocks until durable. Returns a
    /// handle usable for a later `ack`.
    async fn publish(&self, record: TaskRecord) -> Result<QueueHandle, QueueError>;

    /// Attach a durable, named consumer with explicit-ack semantics.
    /// The returned stream yields every record not yet acknowledged
    /// under `consumer_name`, including ones from before a crash.
    async fn subscribe(
        &self,
        consumer_name: &str,
    ) -> Result<BoxStream<'static, Delivery>, QueueError>;

    /// Mark a record permanently processed. After this returns, the
    /// record will not be redelivered under the consumer that
    /// received it.
    async fn ack(&self, handle: &QueueHandle) -> Result<(), QueueError>;
}
