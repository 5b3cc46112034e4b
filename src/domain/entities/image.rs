//! Per-element annotation state tracked by a page session.

use serde::{Deserialize, Serialize};

/// Opaque identity of an image element, assigned by the page adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub u64);

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "img#{}", self.0)
    }
}

/// One-shot observer waiting for the element's next load outcome.
///
/// Fires at most once and is removed when it does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadObserver {
    /// Waits for the rewritten CDN source to load. Success only.
    CdnLoad {
        /// The CDN URL assigned to the element.
        cdn_url: String,
        /// The source captured before rewriting.
        original_url: String,
    },
    /// Waits for a fallback candidate to load or fail.
    Fallback {
        /// The URL whose failure started this attempt.
        failed_url: String,
        /// The candidate assigned to the element.
        candidate: String,
        /// One-based attempt number.
        attempt: u32,
    },
}

impl LoadObserver {
    /// Returns the URL this observer is waiting on.
    #[must_use]
    pub fn watched_url(&self) -> &str {
        match self {
            Self::CdnLoad { cdn_url, .. } => cdn_url,
            Self::Fallback { candidate, .. } => candidate,
        }
    }
}

/// Where an element stands in its fallback lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPhase {
    /// No fallback running; more attempts are allowed.
    Idle,
    /// A fallback candidate is loading.
    InProgress,
    /// Terminal: budget spent or no candidate could be built.
    Exhausted,
}

/// State attached to an image element once the engine has seen it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageAnnotation {
    /// Set once the source has been handled; prevents reprocessing.
    pub processed: bool,
    /// Source captured before rewriting.
    pub original_src: Option<String>,
    /// Guards against overlapping retry transitions.
    pub fallback_in_progress: bool,
    /// Fallback attempts already made.
    pub retry_count: u32,
    /// Fallback candidates computed for the current failure episode.
    pub candidate_urls: Option<Vec<String>>,
    /// Set once a terminal outcome has been reported.
    pub reported: bool,
    /// Pending one-shot load observer.
    pub observer: Option<LoadObserver>,
}

impl ImageAnnotation {
    /// Creates an empty annotation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives the retry phase for the given budget.
    #[must_use]
    pub const fn phase(&self, max_retry_count: u32) -> RetryPhase {
        if self.fallback_in_progress {
            RetryPhase::InProgress
        } else if self.reported || self.retry_count >= max_retry_count {
            RetryPhase::Exhausted
        } else {
            RetryPhase::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_annotation_is_idle() {
        let annotation = ImageAnnotation::new();
        assert!(!annotation.processed);
        assert_eq!(annotation.phase(2), RetryPhase::Idle);
    }

    #[test]
    fn test_phase_transitions() {
        let mut annotation = ImageAnnotation::new();
        annotation.fallback_in_progress = true;
        assert_eq!(annotation.phase(2), RetryPhase::InProgress);

        annotation.fallback_in_progress = false;
        annotation.retry_count = 2;
        assert_eq!(annotation.phase(2), RetryPhase::Exhausted);
    }

    #[test]
    fn test_observer_watched_url() {
        let observer = LoadObserver::Fallback {
            failed_url: "https://cdn/a.webp".to_string(),
            candidate: "https://a.com/a.png".to_string(),
            attempt: 1,
        };
        assert_eq!(observer.watched_url(), "https://a.com/a.png");
    }
}
