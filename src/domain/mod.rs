//! Domain layer with core entities, errors, and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{ElementId, ImageAnnotation, LogEntry, PageEvent, Settings, TelemetryStatus};
pub use errors::{SettingsError, TelemetryError, TranscodeError};
pub use ports::{CdnProbePort, PagePort, SettingsStorePort, TelemetryTransportPort};
