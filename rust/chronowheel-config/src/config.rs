// Configuration loading: env > file > defaults.

use crate::env::apply_env_overrides;
use crate::schema::{ConfigError, SchedulerConfig};
use std::path::PathBuf;

/// Load configuration: start from defaults, layer in a TOML file if one
/// exists at `CHRONOWHEEL_CONFIG_PATH` (or the platform default path),
/// then apply environment variable overrides, then validate.
pub fn load_config() -> Result<SchedulerConfig, ConfigError> {
    let config_path = config_file_path();

    let mut config = if config_path.exists() {
        load_from_file(&config_path)?
    } else {
        SchedulerConfig::default()
    };

    apply_env_overrides(&mut config)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn load_from_file(path: &PathBuf) -> Result<SchedulerConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
    toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = std::env::var("CHRONOWHEEL_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    PathBuf::from("chronowheel.toml")
}

pub fn validate_config(config: &SchedulerConfig) -> Result<(), ConfigError> {
    if config.wheel.tick_duration_ms == 0 {
        return Err(ConfigError::Validation(
            "wheel.tick_duration_ms must be greater than zero".to_string(),
        ));
    }
    if config.wheel.slot_counts.iter().any(|&count| count == 0) {
        return Err(ConfigError::Validation(
            "wheel.slot_counts entries must all be greater than zero".to_string(),
        ));
    }
    if config.dispatch.worker_count == 0 {
        return Err(ConfigError::Validation(
            "dispatch.worker_count must be greater than zero".to_string(),
        ));
    }
    if config.dispatch.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "dispatch.max_attempts must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
