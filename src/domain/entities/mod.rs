//! Domain entity definitions.

mod image;
mod page_event;
mod settings;
mod telemetry;

pub use image::{ElementId, ImageAnnotation, LoadObserver, RetryPhase};
pub use page_event::{DomMutation, PageEvent, Visibility, WatchedAttribute};
pub use settings::{DEFAULT_EXCLUDED_DOMAINS, ExtensionMessage, ExtensionStateResponse, Settings};
pub use telemetry::{EntryLevel, LogEntry, TelemetryStatus, UrlDetails};
