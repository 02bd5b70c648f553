use chronowheel_dispatch::DispatchMetrics;
use chronowheel_queue::DurableQueue;
use chronowheel_wheel::WheelHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Shared ingress state. The ingress adapter publishes to the durable
/// queue directly and never inserts into the wheel itself (§4.5); the
/// wheel handle here is read-only, used only for the `pending` stat and
/// the max-delay validation bound.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<dyn DurableQueue>,
    pub wheel: WheelHandle,
    pub metrics: Arc<DispatchMetrics>,
    pub max_attempts: u32,
    pub max_payload_bytes: usize,
    pub accepting: Arc<AtomicBool>,
}
