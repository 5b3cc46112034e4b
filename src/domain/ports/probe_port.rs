//! Port definition for CDN existence checks.

use async_trait::async_trait;

/// Asks whether a CDN object exists before a request is redirected to it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CdnProbePort: Send + Sync {
    /// Returns true when `url` answers with a success status.
    /// Any transport error counts as absent.
    async fn exists(&self, url: &str) -> bool;
}
