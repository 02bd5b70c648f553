// chronowheel-config: TOML configuration with environment overrides.
//
// Loading hierarchy: environment variables > config file > defaults.

pub mod config;
pub mod env;
pub mod schema;

pub use config::load_config;
pub use schema::{
    ConfigError, DispatchSection, HttpSection, QueueSection, SchedulerConfig, WheelSection,
};
