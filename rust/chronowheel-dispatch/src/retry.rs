// Backoff schedule for a transient dispatch failure: full jitter over
// `base_delay * 2^(attempt-1)`, capped at `max_delay`.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_fraction: f64,
    pub max_attempts: u32,
    pub per_attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30 * 60),
            jitter_fraction: 1.0,
            max_attempts: 5,
            per_attempt_timeout: Duration::from_secs(30),
        }
    }
}

/// Delay before the next attempt, given the attempt number that just
/// failed (1-indexed, matching `TaskRecord::attempt`).
pub fn next_backoff(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(32);
    let unjittered = config
        .base_delay
        .saturating_mul(1u32.checked_shl(exponent).unwrap_or(u32::MAX));
    let capped = unjittered.min(config.max_delay);

    let jitter_span = config.base_delay.mul_f64(config.jitter_fraction.clamp(0.0, 1.0));
    let jitter = if jitter_span.is_zero() {
        Duration::ZERO
    } else {
        rand::thread_rng().gen_range(Duration::ZERO..=jitter_span)
    };
    capped + jitter
}
