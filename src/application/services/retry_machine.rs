//! Per-image fallback walk after a load error.

use tracing::{debug, info, warn};

use super::telemetry_reporter::TelemetryReporter;
use super::transcoder::UrlTranscoder;
use crate::domain::entities::{ImageAnnotation, LoadObserver, TelemetryStatus};

/// Fallback attempts allowed per image.
pub const DEFAULT_MAX_RETRY_COUNT: u32 = 2;

/// Retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fallback attempts allowed per image.
    pub max_retry_count: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
        }
    }
}

/// What the page should do after a load error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryTransition {
    /// A fallback is already running; nothing to do.
    Ignored,
    /// Assign `url` to the element.
    Attempt {
        /// Candidate to load.
        url: String,
        /// One-based attempt number.
        attempt: u32,
    },
    /// Budget spent. The element keeps its last source.
    Exhausted,
    /// No candidate could be built.
    Unrecoverable,
}

/// What a load event resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTransition {
    /// The CDN copy loaded.
    CdnLoaded,
    /// A fallback candidate loaded.
    FallbackSucceeded,
    /// Nobody was waiting for this load.
    Ignored,
}

/// Drives [`ImageAnnotation`] through its fallback lifecycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryStateMachine {
    policy: RetryPolicy,
}

impl RetryStateMachine {
    /// Creates a machine with the given budget.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Returns the budget.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Handles a load error for the element whose current source is `failed_url`.
    pub fn on_error(
        &self,
        annotation: &mut ImageAnnotation,
        failed_url: &str,
        transcoder: &UrlTranscoder,
        reporter: &TelemetryReporter,
    ) -> RetryTransition {
        // The pending observer fires on the element's next outcome, whatever its URL.
        if let Some(LoadObserver::Fallback {
            failed_url: started_by,
            candidate,
            attempt,
        }) = annotation.observer.take()
        {
            if candidate == failed_url {
                debug!(url = %candidate, attempt, "Fallback candidate failed");
                reporter.record(
                    &started_by,
                    Some(&candidate),
                    TelemetryStatus::FallbackFailedUrl(attempt),
                );
            } else {
                debug!(expected = %candidate, url = %failed_url, attempt, "Source changed during fallback");
            }
            annotation.fallback_in_progress = false;
        }

        if annotation.fallback_in_progress {
            return RetryTransition::Ignored;
        }
        annotation.fallback_in_progress = true;

        let original = annotation.original_src.clone();
        let retry_count = annotation.retry_count;

        if retry_count >= self.policy.max_retry_count {
            if !annotation.reported {
                warn!(url = %failed_url, "All fallback attempts failed");
                annotation.reported = true;
                reporter.record(
                    failed_url,
                    original.as_deref(),
                    TelemetryStatus::FallbackFailedAll,
                );
            }
            annotation.fallback_in_progress = false;
            return RetryTransition::Exhausted;
        }

        let candidates = self.candidates(annotation, failed_url, transcoder);

        if retry_count == 0 && transcoder.is_cdn_url(failed_url) {
            reporter.record(failed_url, original.as_deref(), TelemetryStatus::CdnLoadFailed);
        }

        if candidates.is_empty() {
            if !annotation.reported {
                warn!(url = %failed_url, "Cannot rebuild original URL");
                annotation.reported = true;
                reporter.record(
                    failed_url,
                    original.as_deref(),
                    TelemetryStatus::ReconstructionFailed,
                );
            }
            annotation.fallback_in_progress = false;
            return RetryTransition::Unrecoverable;
        }

        let index = usize::try_from(retry_count).unwrap_or(usize::MAX);
        let next = candidates.get(index).unwrap_or(&candidates[0]).clone();
        let attempt = retry_count + 1;
        annotation.candidate_urls = Some(candidates);

        info!(
            failed = %failed_url,
            next = %next,
            attempt,
            max = self.policy.max_retry_count,
            "Trying fallback"
        );
        reporter.record(
            failed_url,
            Some(&next),
            TelemetryStatus::FallbackAttempt(attempt),
        );

        annotation.retry_count = attempt;
        annotation.observer = Some(LoadObserver::Fallback {
            failed_url: failed_url.to_string(),
            candidate: next.clone(),
            attempt,
        });

        RetryTransition::Attempt { url: next, attempt }
    }

    /// Handles a successful load of `loaded_url`.
    ///
    /// Any load detaches the pending observer. Only a load of the watched
    /// URL is reported.
    pub fn on_load(
        &self,
        annotation: &mut ImageAnnotation,
        loaded_url: &str,
        reporter: &TelemetryReporter,
    ) -> LoadTransition {
        let Some(observer) = annotation.observer.take() else {
            return LoadTransition::Ignored;
        };
        if observer.watched_url() != loaded_url {
            debug!(expected = %observer.watched_url(), url = %loaded_url, "Observer detached by unrelated load");
            if matches!(observer, LoadObserver::Fallback { .. }) {
                annotation.fallback_in_progress = false;
            }
            return LoadTransition::Ignored;
        }

        match observer {
            LoadObserver::CdnLoad {
                cdn_url,
                original_url,
            } => {
                reporter.record(
                    &cdn_url,
                    Some(&original_url),
                    TelemetryStatus::CdnLoadSuccess,
                );
                LoadTransition::CdnLoaded
            }
            LoadObserver::Fallback {
                failed_url,
                candidate,
                ..
            } => {
                info!(url = %candidate, "Fallback succeeded");
                annotation.fallback_in_progress = false;
                reporter.record(
                    &failed_url,
                    Some(&candidate),
                    TelemetryStatus::FallbackSuccess,
                );
                LoadTransition::FallbackSucceeded
            }
        }
    }

    /// Picks the first non-empty candidate source, dropping CDN URLs.
    fn candidates(
        &self,
        annotation: &ImageAnnotation,
        failed_url: &str,
        transcoder: &UrlTranscoder,
    ) -> Vec<String> {
        let usable = |urls: Vec<String>| -> Vec<String> {
            urls.into_iter()
                .filter(|url| !transcoder.is_cdn_url(url))
                .collect()
        };

        let recorded = usable(annotation.original_src.iter().cloned().collect());
        if !recorded.is_empty() {
            return recorded;
        }

        let cached = usable(
            transcoder
                .cache()
                .lookup(failed_url)
                .map(ToString::to_string)
                .into_iter()
                .collect(),
        );
        if !cached.is_empty() {
            return cached;
        }

        let previous = usable(annotation.candidate_urls.clone().unwrap_or_default());
        if !previous.is_empty() {
            return previous;
        }

        usable(transcoder.reconstruct_original(failed_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::RetryPhase;
    use crate::domain::ports::mocks::MockTelemetryTransport;
    use crate::application::services::telemetry_reporter::ReporterConfig;
    use std::sync::Arc;

    const CDN_URL: &str =
        "https://storage.cloud.google.com/cdn.ecarbon.kr/img.example.com/photo.webp";

    fn reporter() -> TelemetryReporter {
        TelemetryReporter::new(
            ReporterConfig::default(),
            "https://page.example.com/",
            Arc::new(MockTelemetryTransport::new()),
        )
    }

    fn statuses(reporter: &TelemetryReporter) -> Vec<String> {
        reporter
            .pending_entries()
            .iter()
            .map(|e| e.status.to_string())
            .collect()
    }

    #[test]
    fn test_reconstructed_walk_then_exhausted() {
        let machine = RetryStateMachine::default();
        let transcoder = UrlTranscoder::default();
        let reporter = reporter();
        let mut annotation = ImageAnnotation::new();

        let first = machine.on_error(&mut annotation, CDN_URL, &transcoder, &reporter);
        assert_eq!(
            first,
            RetryTransition::Attempt {
                url: "https://img.example.com/photo.png".to_string(),
                attempt: 1
            }
        );
        assert_eq!(annotation.phase(2), RetryPhase::InProgress);

        let second = machine.on_error(
            &mut annotation,
            "https://img.example.com/photo.png",
            &transcoder,
            &reporter,
        );
        assert_eq!(
            second,
            RetryTransition::Attempt {
                url: "https://img.example.com/photo.jpg".to_string(),
                attempt: 2
            }
        );

        let third = machine.on_error(
            &mut annotation,
            "https://img.example.com/photo.jpg",
            &transcoder,
            &reporter,
        );
        assert_eq!(third, RetryTransition::Exhausted);
        assert!(annotation.reported);
        assert_eq!(annotation.phase(2), RetryPhase::Exhausted);

        assert_eq!(
            statuses(&reporter),
            vec![
                "cdn_load_failed",
                "fallback_attempt_1",
                "fallback_failed_url_1",
                "fallback_attempt_2",
                "fallback_failed_url_2",
                "fallback_failed_all",
            ]
        );
    }

    #[test]
    fn test_exhausted_reports_once() {
        let machine = RetryStateMachine::default();
        let transcoder = UrlTranscoder::default();
        let reporter = reporter();
        let mut annotation = ImageAnnotation {
            retry_count: 2,
            ..ImageAnnotation::new()
        };

        assert_eq!(
            machine.on_error(&mut annotation, "https://a.com/x.png", &transcoder, &reporter),
            RetryTransition::Exhausted
        );
        assert_eq!(
            machine.on_error(&mut annotation, "https://a.com/x.png", &transcoder, &reporter),
            RetryTransition::Exhausted
        );
        assert_eq!(statuses(&reporter), vec!["fallback_failed_all"]);
    }

    #[test]
    fn test_duplicate_error_while_in_progress_is_ignored() {
        let machine = RetryStateMachine::default();
        let transcoder = UrlTranscoder::default();
        let reporter = reporter();
        let mut annotation = ImageAnnotation::new();

        machine.on_error(&mut annotation, CDN_URL, &transcoder, &reporter);
        let again = machine.on_error(&mut annotation, CDN_URL, &transcoder, &reporter);

        assert_eq!(again, RetryTransition::Ignored);
        assert_eq!(annotation.retry_count, 1);
    }

    #[test]
    fn test_single_candidate_wraps() {
        let machine = RetryStateMachine::default();
        let mut transcoder = UrlTranscoder::default();
        let reporter = reporter();
        let original = "https://a.com/p/x.jpg";
        let cdn = transcoder.to_cdn_url(original).unwrap();
        let mut annotation = ImageAnnotation {
            processed: true,
            original_src: Some(original.to_string()),
            ..ImageAnnotation::new()
        };

        let first = machine.on_error(&mut annotation, &cdn, &transcoder, &reporter);
        let second = machine.on_error(&mut annotation, original, &transcoder, &reporter);

        assert_eq!(
            first,
            RetryTransition::Attempt {
                url: original.to_string(),
                attempt: 1
            }
        );
        assert_eq!(
            second,
            RetryTransition::Attempt {
                url: original.to_string(),
                attempt: 2
            }
        );
    }

    #[test]
    fn test_unrecoverable_when_nothing_rebuilds() {
        let machine = RetryStateMachine::default();
        let transcoder = UrlTranscoder::default();
        let reporter = reporter();
        let mut annotation = ImageAnnotation::new();

        let result = machine.on_error(
            &mut annotation,
            "https://elsewhere.com/broken.webp",
            &transcoder,
            &reporter,
        );

        assert_eq!(result, RetryTransition::Unrecoverable);
        assert!(!annotation.fallback_in_progress);
        assert_eq!(statuses(&reporter), vec!["reconstruction_failed"]);
    }

    #[test]
    fn test_cdn_candidates_are_never_offered() {
        let machine = RetryStateMachine::default();
        let transcoder = UrlTranscoder::default();
        let reporter = reporter();
        let mut annotation = ImageAnnotation {
            original_src: Some(CDN_URL.to_string()),
            ..ImageAnnotation::new()
        };

        let result = machine.on_error(&mut annotation, CDN_URL, &transcoder, &reporter);

        match result {
            RetryTransition::Attempt { url, .. } => {
                assert!(!transcoder.is_cdn_url(&url));
                assert_eq!(url, "https://img.example.com/photo.png");
            }
            other => panic!("expected attempt, got {other:?}"),
        }
    }

    #[test]
    fn test_load_resolves_observers() {
        let machine = RetryStateMachine::default();
        let transcoder = UrlTranscoder::default();
        let reporter = reporter();
        let mut annotation = ImageAnnotation {
            observer: Some(LoadObserver::CdnLoad {
                cdn_url: CDN_URL.to_string(),
                original_url: "https://img.example.com/photo.jpg".to_string(),
            }),
            ..ImageAnnotation::new()
        };

        assert_eq!(
            machine.on_load(&mut annotation, CDN_URL, &reporter),
            LoadTransition::CdnLoaded
        );
        assert_eq!(
            machine.on_load(&mut annotation, CDN_URL, &reporter),
            LoadTransition::Ignored
        );

        let mut failing = ImageAnnotation::new();
        if let RetryTransition::Attempt { url, .. } =
            machine.on_error(&mut failing, CDN_URL, &transcoder, &reporter)
        {
            assert_eq!(
                machine.on_load(&mut failing, &url, &reporter),
                LoadTransition::FallbackSucceeded
            );
        }
        assert!(!failing.fallback_in_progress);
        assert!(statuses(&reporter).contains(&"fallback_success".to_string()));
        assert!(statuses(&reporter).contains(&"cdn_load_success".to_string()));
    }

    #[test]
    fn test_source_swap_during_fallback_does_not_stick() {
        let machine = RetryStateMachine::default();
        let transcoder = UrlTranscoder::default();
        let reporter = reporter();
        let mut annotation = ImageAnnotation::new();
        let swapped = "https://img.example.com/other.jpg";

        machine.on_error(&mut annotation, CDN_URL, &transcoder, &reporter);
        assert!(annotation.fallback_in_progress);

        let second = machine.on_error(&mut annotation, swapped, &transcoder, &reporter);
        assert!(matches!(second, RetryTransition::Attempt { attempt: 2, .. }));

        let third = machine.on_error(&mut annotation, swapped, &transcoder, &reporter);
        assert_eq!(third, RetryTransition::Exhausted);
        assert!(!annotation.fallback_in_progress);
        assert!(annotation.reported);

        for _ in 0..3 {
            machine.on_error(&mut annotation, swapped, &transcoder, &reporter);
        }
        assert_eq!(
            statuses(&reporter),
            vec![
                "cdn_load_failed",
                "fallback_attempt_1",
                "fallback_attempt_2",
                "fallback_failed_all",
            ]
        );
    }

    #[test]
    fn test_unrelated_load_detaches_observer() {
        let machine = RetryStateMachine::default();
        let transcoder = UrlTranscoder::default();
        let reporter = reporter();
        let mut annotation = ImageAnnotation::new();

        machine.on_error(&mut annotation, CDN_URL, &transcoder, &reporter);
        assert_eq!(
            machine.on_load(&mut annotation, "https://img.example.com/other.jpg", &reporter),
            LoadTransition::Ignored
        );

        assert!(annotation.observer.is_none());
        assert!(!annotation.fallback_in_progress);
        assert!(!statuses(&reporter).contains(&"fallback_success".to_string()));
    }
}
