//! User settings and the extension message protocol.

use serde::{Deserialize, Serialize};

/// Sites the engine stays away from unless the user says otherwise.
pub const DEFAULT_EXCLUDED_DOMAINS: &[&str] = &[
    "instagram.com",
    "www.instagram.com",
    "facebook.com",
    "www.facebook.com",
    "m.facebook.com",
    "twitter.com",
    "www.twitter.com",
    "x.com",
    "www.x.com",
    "tiktok.com",
    "www.tiktok.com",
    "pinterest.com",
    "www.pinterest.com",
    "linkedin.com",
    "www.linkedin.com",
    "snapchat.com",
    "www.snapchat.com",
];

/// Persisted user settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Master switch.
    #[serde(default = "default_true")]
    pub is_enabled: bool,

    /// Hosts (and their subdomains) where the engine is inert.
    #[serde(default = "default_excluded_domains")]
    pub excluded_domains: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_excluded_domains() -> Vec<String> {
    DEFAULT_EXCLUDED_DOMAINS
        .iter()
        .map(ToString::to_string)
        .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            is_enabled: true,
            excluded_domains: default_excluded_domains(),
        }
    }
}

impl Settings {
    /// Returns true if `host` equals or is a subdomain of an excluded entry.
    #[must_use]
    pub fn is_excluded_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.excluded_domains.iter().any(|domain| {
            let domain = domain.trim().to_ascii_lowercase();
            !domain.is_empty()
                && (host == domain
                    || host
                        .strip_suffix(domain.as_str())
                        .is_some_and(|rest| rest.ends_with('.')))
        })
    }
}

/// Messages exchanged between the popup, background and page contexts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ExtensionMessage {
    /// Popup toggled the master switch.
    #[serde(rename_all = "camelCase")]
    ToggleExtension {
        /// New state.
        is_enabled: bool,
    },
    /// Background relays the switch to a page.
    #[serde(rename_all = "camelCase")]
    UpdateExtensionState {
        /// New state.
        is_enabled: bool,
    },
    /// Replaces the excluded domain list.
    #[serde(rename_all = "camelCase")]
    UpdateExcludedDomains {
        /// New list.
        excluded_domains: Vec<String>,
    },
    /// Popup asks for the current switch state.
    GetExtensionState,
}

/// Reply to [`ExtensionMessage::GetExtensionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionStateResponse {
    /// Current state.
    pub is_enabled: bool,
}
