//! CDN existence check over HTTP.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, trace};

use crate::domain::ports::CdnProbePort;

/// Sends `HEAD` requests; any 2xx answer means the object exists.
#[derive(Debug, Clone)]
pub struct HttpCdnProbe {
    client: Client,
}

impl HttpCdnProbe {
    /// Creates a probe.
    ///
    /// # Errors
    /// Returns error if HTTP client creation fails.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl CdnProbePort for HttpCdnProbe {
    async fn exists(&self, url: &str) -> bool {
        match self
            .client
            .head(url)
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .await
        {
            Ok(response) => {
                trace!(url = %url, status = %response.status(), "CDN probe answered");
                response.status().is_success()
            }
            Err(e) => {
                debug!(url = %url, error = %e, "CDN probe failed");
                false
            }
        }
    }
}
