//! Transport that writes entries to the local log instead of the network.

use async_trait::async_trait;
use tracing::info;

use crate::domain::entities::LogEntry;
use crate::domain::errors::TelemetryError;
use crate::domain::ports::TelemetryTransportPort;

/// Logs every entry at info level. Used for dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTelemetryTransport;

impl LogTelemetryTransport {
    fn emit(entry: &LogEntry, via: &'static str) {
        info!(
            via,
            level = ?entry.level,
            status = %entry.status,
            domain = %entry.domain,
            file = %entry.original_filename,
            "{}",
            entry.message
        );
    }
}

#[async_trait]
impl TelemetryTransportPort for LogTelemetryTransport {
    async fn send(&self, entry: &LogEntry) -> Result<(), TelemetryError> {
        Self::emit(entry, "send");
        Ok(())
    }

    fn beacon(&self, entry: &LogEntry) {
        Self::emit(entry, "beacon");
    }
}
