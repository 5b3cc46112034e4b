//! Telemetry delivery error types.

use thiserror::Error;

/// Telemetry delivery error variants.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum TelemetryError {
    #[error("network error while sending telemetry: {message}")]
    Network { message: String },

    #[error("telemetry endpoint rejected entry with HTTP {status}")]
    Rejected { status: u16 },

    #[error("failed to build telemetry client: {message}")]
    Client { message: String },
}

impl TelemetryError {
    /// Creates network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates client construction error.
    #[must_use]
    pub fn client(message: impl Into<String>) -> Self {
        Self::Client {
            message: message.into(),
        }
    }
}
