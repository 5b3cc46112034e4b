//! Application configuration.

pub mod app_config;
pub mod args;
pub mod storage;

pub use app_config::{
    AppConfig, CdnConfig, DEFAULT_TELEMETRY_ENDPOINT, DiscoveryConfig, FallbackConfig,
    InterceptConfig, LogLevel, TelemetryConfig,
};
pub use args::{CliArgs, Command};
pub use storage::{ConfigError, StorageManager, save_toml_atomic};
