//! Infrastructure layer with external service adapters.

/// CDN existence checks.
pub mod cdn;
/// Application configuration.
pub mod config;
/// Page runtime and scripted pages.
pub mod page;
/// Settings persistence.
pub mod settings_store;
/// Telemetry transports.
pub mod telemetry;

pub use cdn::HttpCdnProbe;
pub use config::{AppConfig, CliArgs, Command, LogLevel, StorageManager};
pub use page::{PageRunReport, PageRuntime, PageScript, ScriptedPage};
pub use settings_store::{MemorySettingsStore, TomlSettingsStore};
pub use telemetry::{HttpTelemetryTransport, LogTelemetryTransport};
