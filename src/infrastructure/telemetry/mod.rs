//! Telemetry transports.

pub mod http_transport;
pub mod log_transport;

pub use http_transport::HttpTelemetryTransport;
pub use log_transport::LogTelemetryTransport;
