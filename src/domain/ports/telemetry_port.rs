//! Port definition for telemetry delivery.

use async_trait::async_trait;

use crate::domain::entities::LogEntry;
use crate::domain::errors::TelemetryError;

/// Port for shipping telemetry entries to the log server.
#[async_trait]
pub trait TelemetryTransportPort: Send + Sync {
    /// Sends one entry and waits for the server's answer.
    async fn send(&self, entry: &LogEntry) -> Result<(), TelemetryError>;

    /// Fire-and-forget send used while the page is closing.
    fn beacon(&self, entry: &LogEntry);
}
