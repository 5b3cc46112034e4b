//! Redirect decision for outgoing image requests.

use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::transcoder::{TranscoderConfig, UrlTranscoder};
use crate::domain::ports::CdnProbePort;

/// Kind of resource a request fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    /// Image.
    Image,
    /// Top-level document.
    MainFrame,
    /// Frame document.
    SubFrame,
    /// Stylesheet.
    Stylesheet,
    /// Script.
    Script,
    /// Font.
    Font,
    /// XHR or fetch.
    XmlHttpRequest,
    /// Audio or video.
    Media,
    /// Anything else.
    Other,
}

impl FromStr for ResourceType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "image" | "imageset" => Self::Image,
            "main_frame" => Self::MainFrame,
            "sub_frame" => Self::SubFrame,
            "stylesheet" => Self::Stylesheet,
            "script" => Self::Script,
            "font" => Self::Font,
            "xmlhttprequest" | "xhr" | "fetch" => Self::XmlHttpRequest,
            "media" => Self::Media,
            _ => Self::Other,
        })
    }
}

/// What to do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterceptDecision {
    /// Let the request through unchanged.
    Allow,
    /// Send the request to this URL instead.
    Redirect(String),
}

/// Decides whether image requests go to the CDN.
///
/// Outlives every page, so its transcoder's cache is never filled.
pub struct RequestInterceptor {
    transcoder: RwLock<UrlTranscoder>,
    probe: Option<Arc<dyn CdnProbePort>>,
}

impl std::fmt::Debug for RequestInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestInterceptor")
            .field("verify_cdn", &self.probe.is_some())
            .finish_non_exhaustive()
    }
}

impl RequestInterceptor {
    /// Creates an interceptor. With a probe, redirects only go to CDN
    /// objects that exist.
    #[must_use]
    pub fn new(config: TranscoderConfig, probe: Option<Arc<dyn CdnProbePort>>) -> Self {
        Self {
            transcoder: RwLock::new(UrlTranscoder::new(config)),
            probe,
        }
    }

    /// Switches redirection on or off.
    pub fn set_enabled(&self, enabled: bool) {
        self.transcoder.write().set_enabled(enabled);
    }

    /// Returns true if redirection is on.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.transcoder.read().is_enabled()
    }

    /// Decides what happens to a request for `url`.
    pub async fn decide(&self, url: &str, resource_type: ResourceType) -> InterceptDecision {
        if resource_type != ResourceType::Image {
            return InterceptDecision::Allow;
        }

        let cdn_url = {
            let transcoder = self.transcoder.read();
            if transcoder.is_cdn_url(url) {
                trace!(url = %url, "Already on CDN");
                return InterceptDecision::Allow;
            }
            transcoder.cdn_url_for(url)
        };
        let Some(cdn_url) = cdn_url else {
            return InterceptDecision::Allow;
        };

        if let Some(probe) = &self.probe {
            if !probe.exists(&cdn_url).await {
                debug!(url = %url, cdn = %cdn_url, "CDN copy missing, keeping original");
                return InterceptDecision::Allow;
            }
        }

        debug!(url = %url, cdn = %cdn_url, "Redirecting to CDN");
        InterceptDecision::Redirect(cdn_url)
    }
}
