//! Log server HTTP client.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::entities::LogEntry;
use crate::domain::errors::TelemetryError;
use crate::domain::ports::TelemetryTransportPort;

const USER_AGENT: &str = concat!("webp-redirect/", env!("CARGO_PKG_VERSION"));

/// Posts telemetry entries as JSON to the log server.
#[derive(Debug, Clone)]
pub struct HttpTelemetryTransport {
    client: Client,
    endpoint: String,
}

impl HttpTelemetryTransport {
    /// Creates a transport for `endpoint`.
    ///
    /// # Errors
    /// Returns error if HTTP client creation fails.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TelemetryError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| TelemetryError::client(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Returns the endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TelemetryTransportPort for HttpTelemetryTransport {
    async fn send(&self, entry: &LogEntry) -> Result<(), TelemetryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(entry)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TelemetryError::network("request timed out")
                } else if e.is_connect() {
                    TelemetryError::network("failed to connect to log server")
                } else {
                    TelemetryError::network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::Rejected {
                status: status.as_u16(),
            });
        }

        debug!(status = %entry.status, "Telemetry entry delivered");
        Ok(())
    }

    fn beacon(&self, entry: &LogEntry) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(status = %entry.status, "No runtime for beacon, entry lost");
            return;
        };

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let entry = entry.clone();
        handle.spawn(async move {
            if let Err(e) = client.post(&endpoint).json(&entry).send().await {
                debug!(error = %e, "Beacon failed");
            }
        });
    }
}
