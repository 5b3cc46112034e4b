//! Telemetry entry types.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Outcome reported for an image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum TelemetryStatus {
    /// The CDN copy loaded.
    CdnLoadSuccess,
    /// The CDN copy failed on first load.
    CdnLoadFailed,
    /// The CDN copy does not exist.
    CdnNotFound,
    /// A fallback candidate is being tried (one-based).
    FallbackAttempt(u32),
    /// A fallback candidate loaded.
    FallbackSuccess,
    /// A specific fallback candidate failed (one-based).
    FallbackFailedUrl(u32),
    /// Every fallback attempt failed.
    FallbackFailedAll,
    /// No fallback candidate could be built.
    ReconstructionFailed,
}

impl TelemetryStatus {
    /// Returns the severity the entry is filed under.
    #[must_use]
    pub const fn level(&self) -> EntryLevel {
        match self {
            Self::CdnLoadSuccess | Self::FallbackSuccess => EntryLevel::Success,
            Self::CdnNotFound | Self::CdnLoadFailed | Self::FallbackFailedUrl(_) => {
                EntryLevel::Warn
            }
            Self::FallbackFailedAll | Self::ReconstructionFailed => EntryLevel::Error,
            Self::FallbackAttempt(_) => EntryLevel::Info,
        }
    }
}

impl std::fmt::Display for TelemetryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CdnLoadSuccess => write!(f, "cdn_load_success"),
            Self::CdnLoadFailed => write!(f, "cdn_load_failed"),
            Self::CdnNotFound => write!(f, "cdn_not_found"),
            Self::FallbackAttempt(n) => write!(f, "fallback_attempt_{n}"),
            Self::FallbackSuccess => write!(f, "fallback_success"),
            Self::FallbackFailedUrl(n) => write!(f, "fallback_failed_url_{n}"),
            Self::FallbackFailedAll => write!(f, "fallback_failed_all"),
            Self::ReconstructionFailed => write!(f, "reconstruction_failed"),
        }
    }
}

impl FromStr for TelemetryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let numbered = |prefix: &str| {
            s.strip_prefix(prefix)
                .and_then(|n| n.parse::<u32>().ok())
        };

        match s {
            "cdn_load_success" => Ok(Self::CdnLoadSuccess),
            "cdn_load_failed" => Ok(Self::CdnLoadFailed),
            "cdn_not_found" => Ok(Self::CdnNotFound),
            "fallback_success" => Ok(Self::FallbackSuccess),
            "fallback_failed_all" => Ok(Self::FallbackFailedAll),
            "reconstruction_failed" => Ok(Self::ReconstructionFailed),
            _ => numbered("fallback_attempt_")
                .map(Self::FallbackAttempt)
                .or_else(|| numbered("fallback_failed_url_").map(Self::FallbackFailedUrl))
                .ok_or_else(|| format!("unknown telemetry status: {s}")),
        }
    }
}

impl From<TelemetryStatus> for String {
    fn from(status: TelemetryStatus) -> Self {
        status.to_string()
    }
}

impl TryFrom<String> for TelemetryStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Severity of a telemetry entry as understood by the log server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryLevel {
    /// Informational.
    Info,
    /// Image ended up displayed.
    Success,
    /// Recoverable problem.
    Warn,
    /// Unrecoverable problem.
    Error,
}

/// Structured pieces of an image URL.
///
/// Unparseable URLs produce all-empty details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlDetails {
    /// Hostname.
    pub domain: String,
    /// Last path segment.
    pub original_filename: String,
    /// Filename without its last extension.
    pub filename_base: String,
    /// Path only.
    pub origin_url: String,
    /// `?query`, or empty.
    pub original_path_query: String,
}

impl UrlDetails {
    /// Parses details out of a URL string.
    #[must_use]
    pub fn parse(url: &str) -> Self {
        Url::parse(url)
            .map(|parsed| Self::from_url(&parsed))
            .unwrap_or_default()
    }

    /// Extracts details from an already parsed URL.
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        let path = url.path();
        let filename = path.rsplit('/').next().unwrap_or_default();

        // A leading dot is part of the name, not an extension.
        let filename_base = match filename.rfind('.') {
            Some(idx) if idx > 0 => &filename[..idx],
            _ => filename,
        };

        let original_path_query = match url.query() {
            Some(q) if !q.is_empty() => format!("?{q}"),
            _ => String::new(),
        };

        Self {
            domain: url.host_str().unwrap_or_default().to_string(),
            original_filename: filename.to_string(),
            filename_base: filename_base.to_string(),
            origin_url: path.to_string(),
            original_path_query,
        }
    }
}

/// One telemetry record as sent to the log server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Severity derived from `status`.
    pub level: EntryLevel,
    /// Human readable summary.
    pub message: String,
    /// Path of the image.
    pub origin_url: String,
    /// Image host, or the page host when unknown.
    pub domain: String,
    /// Image filename.
    pub original_filename: String,
    /// Image filename without extension.
    pub filename_base: String,
    /// Image query string.
    pub original_path_query: String,
    /// Time the entry was built.
    pub timestamp: DateTime<Utc>,
    /// Reported outcome.
    pub status: TelemetryStatus,
}
