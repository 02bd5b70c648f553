// Environment variable overrides.
//
// Format: CHRONOWHEEL_<SECTION>_<KEY>, e.g.
//   CHRONOWHEEL_WHEEL_TICK_DURATION_MS=50
//   CHRONOWHEEL_DISPATCH_WORKER_COUNT=16
//   CHRONOWHEEL_QUEUE_BOOTSTRAP_SERVERS=broker-1:9092,broker-2:9092

use crate::schema::{ConfigError, SchedulerConfig};
use std::env;

const PREFIX: &str = "CHRONOWHEEL_";

pub fn apply_env_overrides(config: &mut SchedulerConfig) -> Result<(), ConfigError> {
    for (key, value) in env::vars() {
        let Some(rest) = key.strip_prefix(PREFIX) else {
            continue;
        };
        apply_one(config, rest, &value)?;
    }
    Ok(())
}

fn apply_one(config: &mut SchedulerConfig, key: &str, value: &str) -> Result<(), ConfigError> {
    let parse_u64 = |v: &str| -> Result<u64, ConfigError> {
        v.parse()
            .map_err(|_| ConfigError::Validation(format!("invalid integer: {value}")))
    };
    let parse_usize = |v: &str| -> Result<usize, ConfigError> {
        v.parse()
            .map_err(|_| ConfigError::Validation(format!("invalid integer: {value}")))
    };
    let parse_u32 = |v: &str| -> Result<u32, ConfigError> {
        v.parse()
            .map_err(|_| ConfigError::Validation(format!("invalid integer: {value}")))
    };
    let parse_f64 = |v: &str| -> Result<f64, ConfigError> {
        v.parse()
            .map_err(|_| ConfigError::Validation(format!("invalid float: {value}")))
    };

    match key {
        "WHEEL_TICK_DURATION_MS" => config.wheel.tick_duration_ms = parse_u64(value)?,
        "WHEEL_SLOT_COUNTS" => {
            let parts: Vec<usize> = value
                .split(',')
                .map(|s| s.trim().parse())
                .collect::<Result<_, _>>()
                .map_err(|_| ConfigError::Validation(format!("invalid slot_counts: {value}")))?;
            let counts: [usize; 4] = parts.try_into().map_err(|_| {
                ConfigError::Validation("slot_counts must have exactly 4 entries".to_string())
            })?;
            config.wheel.slot_counts = counts;
        }
        "DISPATCH_WORKER_COUNT" => config.dispatch.worker_count = parse_usize(value)?,
        "DISPATCH_PER_ATTEMPT_TIMEOUT_SECS" => {
            config.dispatch.per_attempt_timeout_secs = parse_u64(value)?
        }
        "DISPATCH_MAX_ATTEMPTS" => config.dispatch.max_attempts = parse_u32(value)?,
        "DISPATCH_BASE_DELAY_MS" => config.dispatch.base_delay_ms = parse_u64(value)?,
        "DISPATCH_MAX_DELAY_SECS" => config.dispatch.max_delay_secs = parse_u64(value)?,
        "DISPATCH_JITTER_FRACTION" => config.dispatch.jitter_fraction = parse_f64(value)?,
        "DISPATCH_SHUTDOWN_TIMEOUT_SECS" => {
            config.dispatch.shutdown_timeout_secs = parse_u64(value)?
        }
        "QUEUE_BOOTSTRAP_SERVERS" => config.queue.bootstrap_servers = value.to_string(),
        "QUEUE_STREAM_NAME" => config.queue.stream_name = value.to_string(),
        "QUEUE_CONSUMER_NAME" => config.queue.consumer_name = value.to_string(),
        "QUEUE_PUBLISH_TIMEOUT_SECS" => config.queue.publish_timeout_secs = parse_u64(value)?,
        "HTTP_BIND_ADDR" => config.http.bind_addr = value.to_string(),
        "HTTP_MAX_PAYLOAD_BYTES" => config.http.max_payload_bytes = parse_usize(value)?,
        _ => {}
    }
    Ok(())
}
