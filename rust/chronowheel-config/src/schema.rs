// Configuration schema and defaults.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub wheel: WheelSection,
    #[serde(default)]
    pub dispatch: DispatchSection,
    #[serde(default)]
    pub queue: QueueSection,
    #[serde(default)]
    pub http: HttpSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WheelSection {
    #[serde(default = "default_tick_duration_ms")]
    pub tick_duration_ms: u64,
    #[serde(default = "default_slot_counts")]
    pub slot_counts: [usize; 4],
}

fn default_tick_duration_ms() -> u64 {
    100
}

fn default_slot_counts() -> [usize; 4] {
    [600, 60, 24, 7]
}

impl Default for WheelSection {
    fn default() -> Self {
        Self {
            tick_duration_ms: default_tick_duration_ms(),
            slot_counts: default_slot_counts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSection {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_per_attempt_timeout_secs")]
    pub per_attempt_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    #[serde(default = "default_jitter_fraction")]
    pub jitter_fraction: f64,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_worker_count() -> usize {
    8
}

fn default_per_attempt_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_secs() -> u64 {
    30 * 60
}

fn default_jitter_fraction() -> f64 {
    1.0
}

fn default_shutdown_timeout_secs() -> u64 {
    35
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            per_attempt_timeout_secs: default_per_attempt_timeout_secs(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
            jitter_fraction: default_jitter_fraction(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSection {
    #[serde(default = "default_bootstrap_servers")]
    pub bootstrap_servers: String,
    #[serde(default = "default_stream_name")]
    pub stream_name: String,
    #[serde(default = "default_consumer_name")]
    pub consumer_name: String,
    #[serde(default = "default_publish_timeout_secs")]
    pub publish_timeout_secs: u64,
}

fn default_bootstrap_servers() -> String {
    "localhost:9092".to_string()
}

fn default_stream_name() -> String {
    "chronowheel-tasks".to_string()
}

fn default_consumer_name() -> String {
    "chronowheel-recovery-loader".to_string()
}

fn default_publish_timeout_secs() -> u64 {
    10
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            bootstrap_servers: default_bootstrap_servers(),
            stream_name: default_stream_name(),
            consumer_name: default_consumer_name(),
            publish_timeout_secs: default_publish_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSection {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_payload_bytes() -> usize {
    256 * 1024
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            wheel: WheelSection::default(),
            dispatch: DispatchSection::default(),
            queue: QueueSection::default(),
            http: HttpSection::default(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("config file read failed: {0}")]
    Io(String),
    #[error("config file parse failed: {0}")]
    Parse(String),
    #[error("invalid configuration: {0}")]
    Validation(String),
}
