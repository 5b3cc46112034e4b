mod page_port;
mod probe_port;
mod settings_port;
mod telemetry_port;

pub use page_port::PagePort;
pub use probe_port::CdnProbePort;
pub use settings_port::SettingsStorePort;
pub use telemetry_port::TelemetryTransportPort;
