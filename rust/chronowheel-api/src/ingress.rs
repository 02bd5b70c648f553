// Ingress adapter (§4.5): validate an "add delayed task" request, assign
// identity, and publish to the durable queue. The wheel is never touched
// here — insertion happens only via the recovery loader's subscription
// (§4.4), so fresh and replayed tasks take the exact same path into the
// wheel.

use crate::routes::DelayRequest;
use crate::state::AppState;
use chronowheel_types::{IngressError, TaskId, TaskRecord};
use chrono::{DateTime, Utc};
use std::time::Duration;

pub async fn submit_delayed_task(
    state: &AppState,
    request: DelayRequest,
) -> Result<(TaskId, DateTime<Utc>), IngressError> {
    validate_callback_url(&request.callback_url)?;

    if request.delay_seconds < 0.0 || !request.delay_seconds.is_finite() {
        return Err(IngressError::NegativeDelay);
    }
    let delay = Duration::try_from_secs_f64(request.delay_seconds).unwrap_or(Duration::MAX);

    let max_span = state.wheel.max_span();
    if delay >= max_span {
        return Err(IngressError::DelayTooLarge(
            delay.as_millis().min(u64::MAX as u128) as u64,
            max_span.as_millis() as u64,
        ));
    }

    let payload_bytes = serde_json::to_vec(&request.payload)
        .map(|bytes| bytes.len())
        .unwrap_or(usize::MAX);
    if payload_bytes > state.max_payload_bytes {
        return Err(IngressError::PayloadTooLarge(state.max_payload_bytes));
    }

    let id = TaskId::new();
    let scheduled_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
    let record = TaskRecord {
        id,
        callback_url: request.callback_url,
        payload: request.payload,
        scheduled_at,
        attempt: 1,
        max_attempts: state.max_attempts,
    };

    state.queue.publish(record).await?;
    Ok((id, scheduled_at))
}

/// Structural validation only: scheme plus a non-empty host. No network
/// round trip — "syntactically valid" per spec §4.5, not "reachable".
fn validate_callback_url(url: &str) -> Result<(), IngressError> {
    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));

    match without_scheme {
        Some(rest) if !rest.is_empty() && !rest.starts_with('/') && !rest.starts_with(':') => {
            Ok(())
        }
        _ => Err(IngressError::InvalidCallbackUrl(url.to_string())),
    }
}
