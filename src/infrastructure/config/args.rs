use super::app_config::LogLevel;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "webp-redirect",
    version,
    about = "Rewrites image URLs to CDN-hosted WebP copies, with fallback to the originals",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log file path. Logs go to stderr when unset.
    #[arg(long, value_name = "PATH", global = true)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    /// CDN host serving the WebP copies.
    #[arg(long, global = true)]
    pub cdn_host: Option<String>,

    /// Fallback attempts per image.
    #[arg(long, global = true)]
    pub max_retry_count: Option<u32>,

    /// Send telemetry.
    #[arg(long, global = true)]
    pub telemetry: Option<bool>,

    /// Telemetry endpoint.
    #[arg(long, value_name = "URL", global = true)]
    pub telemetry_endpoint: Option<String>,

    /// Check CDN objects exist before redirecting.
    #[arg(long, global = true)]
    pub verify_cdn: Option<bool>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the CDN URL for each original image URL.
    Rewrite {
        /// Original image URLs.
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Print the fallback candidates for each CDN URL.
    Reconstruct {
        /// CDN URLs that failed to load.
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Decide whether a request would be redirected.
    Intercept {
        /// Requested URL.
        url: String,

        /// Resource type of the request.
        #[arg(long, default_value = "image")]
        resource_type: String,
    },

    /// Apply an extension message (JSON) to the stored settings.
    Message {
        /// Message, e.g. `{"action":"toggleExtension","isEnabled":false}`.
        json: String,
    },

    /// Show the stored settings.
    Settings,

    /// Run a page session against a recorded page script.
    Replay {
        /// Page script (JSON).
        #[arg(value_name = "PATH")]
        script: PathBuf,

        /// Log telemetry locally instead of sending it.
        #[arg(long)]
        dry_run: bool,
    },
}
