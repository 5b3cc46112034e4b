//! Application layer: the rewriting engine and its services.

/// Engine services.
pub mod services;

pub use services::{
    InterceptDecision, PageSession, RequestInterceptor, SessionConfig, SettingsService,
    TelemetryReporter, UrlTranscoder,
};
