// chronowheel-types: shared task record, identifier, and error types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier handed back to clients when a task is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TaskId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// The durable, wire-serializable half of a scheduled task. This is what
/// crosses the durable queue: callback target, payload, and retry
/// bookkeeping. It carries no reference to where it lives in the queue;
/// that is `QueueHandle`'s job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub callback_url: String,
    pub payload: serde_json::Value,
    pub scheduled_at: DateTime<Utc>,
    pub attempt: u32,
    pub max_attempts: u32,
}

impl TaskRecord {
    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    pub fn next_attempt(&self) -> Self {
        let mut record = self.clone();
        record.attempt += 1;
        record
    }
}

/// Opaque reference to a task's position in the durable queue, needed to
/// acknowledge or redeliver it. Concrete backends fill in the fields;
/// callers outside `chronowheel-queue` only ever move this around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueHandle {
    pub partition: i32,
    pub offset: i64,
}

/// A task in flight inside the scheduler: the durable record plus the
/// handle needed to ack it once dispatch finishes.
#[derive(Debug, Clone)]
pub struct Task {
    pub record: TaskRecord,
    pub handle: QueueHandle,
}

impl Task {
    pub fn id(&self) -> TaskId {
        self.record.id
    }
}

/// Lifecycle states a task passes through on its way from ingress to
/// acknowledgment. Not persisted on the wire; derived from which
/// component currently owns the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    PendingInWheel,
    Dispatching,
    Retrying,
    Acknowledged,
    Abandoned,
}

/// Classification of a dispatch attempt's outcome: whether to retry,
/// how long to wait, and whether to ack the durable queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success,
    Permanent,
    Transient,
}

impl DispatchOutcome {
    pub fn is_retryable(self) -> bool {
        matches!(self, DispatchOutcome::Transient)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    #[error("callback_url must be http:// or https://: {0}")]
    InvalidCallbackUrl(String),

    #[error("delay_ms must be non-negative")]
    NegativeDelay,

    #[error("delay_ms {0} exceeds the wheel's maximum span of {1}ms")]
    DelayTooLarge(u64, u64),

    #[error("payload exceeds maximum size of {0} bytes")]
    PayloadTooLarge(usize),

    #[error("queue publish failed: {0}")]
    QueueUnavailable(#[from] QueueError),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum QueueError {
    #[error("publish failed: {0}")]
    PublishFailed(String),

    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),

    #[error("ack failed: {0}")]
    AckFailed(String),

    #[error("queue client not connected")]
    NotConnected,
}

#[derive(Debug, thiserror::Error)]
pub enum WheelError {
    #[error("delay of {0:?} exceeds wheel span of {1:?}")]
    TooFarInFuture(std::time::Duration, std::time::Duration),

    #[error("wheel tick driver is no longer running")]
    Closed,
}
