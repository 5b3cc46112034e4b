//! Domain error types.

mod settings_error;
mod telemetry_error;
mod transcode_error;

pub use settings_error::SettingsError;
pub use telemetry_error::TelemetryError;
pub use transcode_error::TranscodeError;
