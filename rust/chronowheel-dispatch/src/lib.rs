// chronowheel-dispatch: delivers due tasks and applies the retry policy.

pub mod dispatcher;
pub mod metrics;
pub mod retry;

pub use dispatcher::Dispatcher;
pub use metrics::{DispatchMetrics, MetricsSnapshot};
pub use retry::RetryConfig;
