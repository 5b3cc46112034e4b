//! Application configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::application::services::discovery::DiscoveryTimings;
use crate::application::services::retry_machine::{DEFAULT_MAX_RETRY_COUNT, RetryPolicy};
use crate::application::services::telemetry_reporter::{DEFAULT_BATCH_SIZE, ReporterConfig};
use crate::application::services::transcoder::{
    DEFAULT_ASSUMED_BASE_PATH, DEFAULT_ASSUMED_EXTENSIONS, DEFAULT_CDN_HOST,
    DEFAULT_CDN_PATH_PREFIX, TranscoderConfig,
};
use crate::application::services::SessionConfig;

pub(crate) const APP_NAME: &str = "webp-redirect";
pub(crate) const APP_QUALIFIER: &str = "kr";
pub(crate) const APP_ORGANIZATION: &str = "ecarbon";

/// Default log server endpoint.
pub const DEFAULT_TELEMETRY_ENDPOINT: &str = "https://log.greenee.kr/log";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path. Logs go to stderr when unset.
    #[serde(skip)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// CDN location.
    #[serde(default)]
    pub cdn: CdnConfig,

    /// Fallback behaviour.
    #[serde(default)]
    pub fallback: FallbackConfig,

    /// Discovery timings.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Telemetry delivery.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Request interception.
    #[serde(default)]
    pub intercept: InterceptConfig,
}

/// CDN configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdnConfig {
    /// Host serving the WebP copies.
    #[serde(default = "default_cdn_host")]
    pub host: String,

    /// Bucket path under the host.
    #[serde(default = "default_cdn_path_prefix")]
    pub path_prefix: String,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            host: default_cdn_host(),
            path_prefix: default_cdn_path_prefix(),
        }
    }
}

/// Fallback configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Path assumed in front of filenames when rebuilding originals.
    #[serde(default = "default_assumed_base_path")]
    pub assumed_base_path: String,

    /// Extensions tried when rebuilding originals, in order.
    #[serde(default = "default_assumed_extensions")]
    pub assumed_extensions: Vec<String>,

    /// Fallback attempts per image.
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: u32,

    /// Base path per original host, overriding `assumed_base_path`.
    #[serde(default)]
    pub site_overrides: HashMap<String, String>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            assumed_base_path: default_assumed_base_path(),
            assumed_extensions: default_assumed_extensions(),
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
            site_overrides: HashMap::new(),
        }
    }
}

/// Discovery timings in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Extra sweeps after document ready.
    #[serde(default = "default_initial_rescan_ms")]
    pub initial_rescan_ms: Vec<u64>,

    /// Delay before the sweep that follows mutations and AJAX completion.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Scroll throttle.
    #[serde(default = "default_scroll_throttle_ms")]
    pub scroll_throttle_ms: u64,

    /// Background sweep period.
    #[serde(default = "default_periodic_interval_ms")]
    pub periodic_interval_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            initial_rescan_ms: default_initial_rescan_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            scroll_throttle_ms: default_scroll_throttle_ms(),
            periodic_interval_ms: default_periodic_interval_ms(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Send telemetry at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log server endpoint.
    #[serde(default = "default_telemetry_endpoint")]
    pub endpoint: String,

    /// Queue length that triggers a flush.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Seconds between background flushes.
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_telemetry_endpoint(),
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval_secs: default_flush_interval_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Request interception configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptConfig {
    /// Check that the CDN copy exists before redirecting.
    #[serde(default = "default_true")]
    pub verify_cdn: bool,

    /// Existence check timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            verify_cdn: true,
            probe_timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cdn_host() -> String {
    DEFAULT_CDN_HOST.to_string()
}

fn default_cdn_path_prefix() -> String {
    DEFAULT_CDN_PATH_PREFIX.to_string()
}

fn default_assumed_base_path() -> String {
    DEFAULT_ASSUMED_BASE_PATH.to_string()
}

fn default_assumed_extensions() -> Vec<String> {
    DEFAULT_ASSUMED_EXTENSIONS
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_max_retry_count() -> u32 {
    DEFAULT_MAX_RETRY_COUNT
}

fn default_initial_rescan_ms() -> Vec<u64> {
    vec![500, 1500]
}

fn default_settle_delay_ms() -> u64 {
    100
}

fn default_scroll_throttle_ms() -> u64 {
    200
}

fn default_periodic_interval_ms() -> u64 {
    2000
}

fn default_telemetry_endpoint() -> String {
    DEFAULT_TELEMETRY_ENDPOINT.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_flush_interval_secs() -> u64 {
    60
}

fn default_timeout_secs() -> u64 {
    10
}

use super::args::CliArgs;

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(cdn_host) = &args.cdn_host {
            self.cdn.host.clone_from(cdn_host);
        }
        if let Some(max_retry_count) = args.max_retry_count {
            self.fallback.max_retry_count = max_retry_count;
        }
        if let Some(telemetry) = args.telemetry {
            self.telemetry.enabled = telemetry;
        }
        if let Some(endpoint) = &args.telemetry_endpoint {
            self.telemetry.endpoint.clone_from(endpoint);
        }
        if let Some(verify_cdn) = args.verify_cdn {
            self.intercept.verify_cdn = verify_cdn;
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Returns effective config path.
    #[must_use]
    pub fn effective_config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(Self::default_config_path)
    }

    /// Returns the transcoder settings.
    #[must_use]
    pub fn transcoder_config(&self) -> TranscoderConfig {
        TranscoderConfig {
            cdn_host: self.cdn.host.clone(),
            cdn_path_prefix: self.cdn.path_prefix.clone(),
            assumed_base_path: self.fallback.assumed_base_path.clone(),
            assumed_extensions: self.fallback.assumed_extensions.clone(),
            base_path_overrides: self.fallback.site_overrides.clone(),
        }
    }

    /// Returns the discovery timings.
    #[must_use]
    pub fn discovery_timings(&self) -> DiscoveryTimings {
        DiscoveryTimings {
            initial_rescans: self
                .discovery
                .initial_rescan_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            settle_delay: Duration::from_millis(self.discovery.settle_delay_ms),
            scroll_throttle: Duration::from_millis(self.discovery.scroll_throttle_ms),
            periodic_interval: Duration::from_millis(self.discovery.periodic_interval_ms),
        }
    }

    /// Returns the retry budget.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retry_count: self.fallback.max_retry_count,
        }
    }

    /// Returns the reporter settings.
    #[must_use]
    pub fn reporter_config(&self) -> ReporterConfig {
        ReporterConfig {
            enabled: self.telemetry.enabled,
            batch_size: self.telemetry.batch_size.max(1),
            flush_interval: Duration::from_secs(self.telemetry.flush_interval_secs.max(1)),
        }
    }

    /// Returns everything a page session needs.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            transcoder: self.transcoder_config(),
            timings: self.discovery_timings(),
            retry: self.retry_policy(),
        }
    }
}
