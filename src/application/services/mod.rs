pub mod discovery;
pub mod mapping_cache;
pub mod page_session;
pub mod request_interceptor;
pub mod retry_machine;
pub mod settings_service;
pub mod telemetry_reporter;
pub mod transcoder;

pub use discovery::{DiscoveryEngine, DiscoveryTimings, MutationPlan, SweepReason, SweepSchedule};
pub use mapping_cache::{MappingCache, MappingStats};
pub use page_session::{PageSession, SessionConfig};
pub use request_interceptor::{InterceptDecision, RequestInterceptor, ResourceType};
pub use retry_machine::{LoadTransition, RetryPolicy, RetryStateMachine, RetryTransition};
pub use settings_service::{MessageOutcome, SettingsService};
pub use telemetry_reporter::{FlushReport, RecordOutcome, ReporterConfig, TelemetryReporter};
pub use transcoder::{TranscoderConfig, UrlTranscoder};
