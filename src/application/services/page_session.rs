//! Coordination of one page's images, schedule and telemetry.

use std::collections::HashMap;

use tokio::time::Instant;
use tracing::{debug, info, trace};

use super::discovery::{DiscoveryEngine, DiscoveryTimings, SweepReason};
use super::retry_machine::{RetryPolicy, RetryStateMachine, RetryTransition};
use super::telemetry_reporter::TelemetryReporter;
use super::transcoder::{TranscoderConfig, UrlTranscoder, is_inert_source};
use crate::domain::entities::{
    ElementId, ExtensionMessage, ImageAnnotation, LoadObserver, PageEvent, Settings,
};
use crate::domain::ports::PagePort;

/// Engine configuration for one page.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// URL transcoding.
    pub transcoder: TranscoderConfig,
    /// Discovery triggers.
    pub timings: DiscoveryTimings,
    /// Fallback budget.
    pub retry: RetryPolicy,
}

/// The engine bound to one page.
///
/// Owns the mapping cache, the annotation side table and the sweep schedule.
/// An excluded host makes the whole session inert.
#[derive(Debug)]
pub struct PageSession {
    transcoder: UrlTranscoder,
    reporter: TelemetryReporter,
    discovery: DiscoveryEngine,
    retry: RetryStateMachine,
    annotations: HashMap<ElementId, ImageAnnotation>,
    inert: bool,
}

impl PageSession {
    /// Creates a session for a page on `hostname`.
    #[must_use]
    pub fn new(
        config: SessionConfig,
        settings: &Settings,
        hostname: &str,
        reporter: TelemetryReporter,
    ) -> Self {
        let inert = settings.is_excluded_host(hostname);
        if inert {
            info!(host = %hostname, "Host is excluded, session inert");
        }

        let mut transcoder = UrlTranscoder::new(config.transcoder);
        transcoder.set_enabled(settings.is_enabled);

        Self {
            transcoder,
            reporter,
            discovery: DiscoveryEngine::new(config.timings),
            retry: RetryStateMachine::new(config.retry),
            annotations: HashMap::new(),
            inert,
        }
    }

    /// Returns true if the page's host is excluded.
    #[must_use]
    pub const fn is_inert(&self) -> bool {
        self.inert
    }

    /// Returns true if rewriting is on.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.transcoder.is_enabled()
    }

    /// Switches rewriting on or off. Already rewritten images are left alone.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.transcoder.set_enabled(enabled);
    }

    /// Returns the annotation of an image the engine has seen.
    #[must_use]
    pub fn annotation(&self, id: ElementId) -> Option<&ImageAnnotation> {
        self.annotations.get(&id)
    }

    /// Returns the transcoder.
    #[must_use]
    pub const fn transcoder(&self) -> &UrlTranscoder {
        &self.transcoder
    }

    /// Returns the telemetry reporter.
    #[must_use]
    pub const fn reporter(&self) -> &TelemetryReporter {
        &self.reporter
    }

    /// Returns the discovery engine.
    #[must_use]
    pub const fn discovery(&self) -> &DiscoveryEngine {
        &self.discovery
    }

    fn is_active(&self) -> bool {
        !self.inert && self.transcoder.is_enabled()
    }

    fn is_processed(&self, id: ElementId) -> bool {
        self.annotations.get(&id).is_some_and(|a| a.processed)
    }

    /// Processes every unprocessed image with a usable source.
    ///
    /// Returns the number of images rewritten.
    pub fn sweep(&mut self, page: &mut dyn PagePort, reason: SweepReason) -> usize {
        if !self.is_active() {
            return 0;
        }

        let mut rewritten = 0;
        for id in page.images() {
            if self.is_processed(id) {
                continue;
            }
            if self.process_image(page, id) {
                rewritten += 1;
            }
        }

        if rewritten > 0 {
            debug!(?reason, rewritten, "Sweep rewrote images");
        } else {
            trace!(?reason, "Sweep found nothing new");
        }
        rewritten
    }

    /// Rewrites one image to its CDN URL.
    ///
    /// Returns true if the source was replaced.
    pub fn process_image(&mut self, page: &mut dyn PagePort, id: ElementId) -> bool {
        if !self.is_active() || self.is_processed(id) {
            return false;
        }

        let Some(src) = page.source(id) else {
            return false;
        };
        if is_inert_source(&src) {
            return false;
        }

        let annotation = self.annotations.entry(id).or_default();

        if self.transcoder.is_cdn_url(&src) {
            annotation.processed = true;
            return false;
        }

        let Some(cdn_url) = self.transcoder.to_cdn_url(&src) else {
            annotation.processed = true;
            return false;
        };

        trace!(%id, original = %src, cdn = %cdn_url, "Rewriting image");
        annotation.processed = true;
        annotation.original_src = Some(src.clone());
        annotation.observer = Some(LoadObserver::CdnLoad {
            cdn_url: cdn_url.clone(),
            original_url: src,
        });
        page.set_source(id, &cdn_url);
        true
    }

    /// Reacts to one page event.
    ///
    /// Returns the number of source assignments made.
    pub fn handle_event(&mut self, page: &mut dyn PagePort, event: PageEvent, now: Instant) -> usize {
        if self.inert {
            return 0;
        }

        match event {
            PageEvent::DocumentReady => {
                self.discovery.on_document_ready(now);
                self.sweep(page, SweepReason::DocumentReady)
            }
            PageEvent::Mutations(mutations) => {
                let annotations = &self.annotations;
                let plan = self.discovery.on_mutations(&mutations, now, |id| {
                    annotations.get(&id).is_some_and(|a| a.processed)
                });

                for id in &plan.removed {
                    self.annotations.remove(id);
                }
                plan.process_now
                    .into_iter()
                    .filter(|id| self.process_image(page, *id))
                    .count()
            }
            PageEvent::Scroll => {
                self.discovery.on_scroll(now);
                0
            }
            PageEvent::WindowLoad => self.sweep(page, SweepReason::WindowLoad),
            PageEvent::AjaxComplete => {
                self.discovery.on_ajax_complete(now);
                0
            }
            PageEvent::VisibilityChanged(visibility) => {
                if self.discovery.on_visibility(visibility) {
                    self.sweep(page, SweepReason::Visible)
                } else {
                    0
                }
            }
            PageEvent::ImageLoaded { id, url } => {
                if let Some(annotation) = self.annotations.get_mut(&id) {
                    self.retry.on_load(annotation, &url, &self.reporter);
                }
                0
            }
            PageEvent::ImageFailed { id, url } => self.on_image_failed(page, id, &url),
            PageEvent::Message(message) => self.apply_message(page, &message),
            PageEvent::Unload => {
                self.reporter.flush_on_unload();
                0
            }
        }
    }

    fn on_image_failed(&mut self, page: &mut dyn PagePort, id: ElementId, url: &str) -> usize {
        let touched = self
            .annotations
            .get(&id)
            .is_some_and(|a| a.original_src.is_some() || a.observer.is_some());

        // Images the engine never rewrote fail on their own.
        if !touched && !self.transcoder.is_cdn_url(url) {
            trace!(%id, url = %url, "Ignoring error on untouched image");
            return 0;
        }

        let annotation = self.annotations.entry(id).or_default();
        let transition = self
            .retry
            .on_error(annotation, url, &self.transcoder, &self.reporter);
        trace!(
            %id,
            url = %url,
            phase = ?annotation.phase(self.retry.policy().max_retry_count),
            "Load error handled"
        );

        match transition {
            RetryTransition::Attempt { url: next, .. } => {
                page.set_source(id, &next);
                1
            }
            RetryTransition::Ignored
            | RetryTransition::Exhausted
            | RetryTransition::Unrecoverable => 0,
        }
    }

    fn apply_message(&mut self, page: &mut dyn PagePort, message: &ExtensionMessage) -> usize {
        match message {
            ExtensionMessage::ToggleExtension { is_enabled }
            | ExtensionMessage::UpdateExtensionState { is_enabled } => {
                let was_enabled = self.is_enabled();
                self.set_enabled(*is_enabled);
                if *is_enabled && !was_enabled {
                    self.sweep(page, SweepReason::Enabled)
                } else {
                    0
                }
            }
            ExtensionMessage::UpdateExcludedDomains { .. } | ExtensionMessage::GetExtensionState => {
                0
            }
        }
    }

    /// Runs one sweep if any scheduled sweep is due.
    pub fn run_due_sweeps(&mut self, page: &mut dyn PagePort, now: Instant) -> usize {
        match self.discovery.due(now).first() {
            Some(reason) => self.sweep(page, *reason),
            None => 0,
        }
    }

    /// Earliest scheduled sweep.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.discovery.next_deadline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::telemetry_reporter::ReporterConfig;
    use crate::domain::entities::{DomMutation, Visibility, WatchedAttribute};
    use crate::domain::ports::mocks::{MockPage, MockTelemetryTransport};
    use std::sync::Arc;
    use std::time::Duration;

    const PAGE_URL: &str = "https://shop.example.com/list";
    const ORIGINAL: &str = "https://img.example.com/a/b/photo.jpg";
    const CDN_URL: &str =
        "https://storage.cloud.google.com/cdn.ecarbon.kr/img.example.com/photo.webp";

    fn session_with(settings: &Settings, host: &str) -> (PageSession, Arc<MockTelemetryTransport>) {
        let transport = Arc::new(MockTelemetryTransport::new());
        let reporter = TelemetryReporter::new(ReporterConfig::default(), PAGE_URL, transport.clone());
        let session = PageSession::new(SessionConfig::default(), settings, host, reporter);
        (session, transport)
    }

    fn session() -> PageSession {
        session_with(&Settings::default(), "shop.example.com").0
    }

    fn statuses(session: &PageSession) -> Vec<String> {
        session
            .reporter()
            .pending_entries()
            .iter()
            .map(|e| e.status.to_string())
            .collect()
    }

    #[test]
    fn test_sweep_rewrites_once() {
        let mut page = MockPage::new(PAGE_URL).with_image(1, ORIGINAL);
        let mut session = session();

        assert_eq!(session.sweep(&mut page, SweepReason::DocumentReady), 1);
        assert_eq!(session.sweep(&mut page, SweepReason::Periodic), 0);

        assert_eq!(page.assignments_for(1), vec![CDN_URL]);
        let annotation = session.annotation(ElementId(1)).unwrap();
        assert!(annotation.processed);
        assert_eq!(annotation.original_src.as_deref(), Some(ORIGINAL));
    }

    #[test]
    fn test_unusable_sources_are_not_marked() {
        let mut page = MockPage::new(PAGE_URL)
            .with_image(1, "")
            .with_image(2, "data:image/png;base64,AAAA");
        let mut session = session();

        session.sweep(&mut page, SweepReason::Periodic);

        assert!(page.assignments.is_empty());
        assert!(session.annotation(ElementId(1)).is_none());
        assert!(session.annotation(ElementId(2)).is_none());
    }

    #[test]
    fn test_non_matching_and_cdn_sources_are_marked_only() {
        let mut page = MockPage::new(PAGE_URL)
            .with_image(1, "https://a.com/anim.gif")
            .with_image(2, CDN_URL);
        let mut session = session();

        assert_eq!(session.sweep(&mut page, SweepReason::Periodic), 0);
        assert!(page.assignments.is_empty());
        assert!(session.annotation(ElementId(1)).unwrap().processed);
        assert!(session.annotation(ElementId(2)).unwrap().processed);
    }

    #[test]
    fn test_excluded_host_is_inert() {
        let mut page = MockPage::new("https://www.instagram.com/p/1").with_image(1, ORIGINAL);
        let (mut session, _) = session_with(&Settings::default(), "www.instagram.com");

        assert!(session.is_inert());
        let now = Instant::now();
        session.handle_event(&mut page, PageEvent::DocumentReady, now);
        session.handle_event(
            &mut page,
            PageEvent::ImageFailed {
                id: ElementId(1),
                url: CDN_URL.to_string(),
            },
            now,
        );

        assert!(page.assignments.is_empty());
        assert_eq!(session.reporter().pending(), 0);
    }

    #[test]
    fn test_disabled_then_enabled() {
        let settings = Settings {
            is_enabled: false,
            ..Settings::default()
        };
        let mut page = MockPage::new(PAGE_URL).with_image(1, ORIGINAL);
        let (mut session, _) = session_with(&settings, "shop.example.com");
        let now = Instant::now();

        session.handle_event(&mut page, PageEvent::DocumentReady, now);
        assert!(page.assignments.is_empty());
        assert!(session.annotation(ElementId(1)).is_none());

        let rewritten = session.handle_event(
            &mut page,
            PageEvent::Message(ExtensionMessage::UpdateExtensionState { is_enabled: true }),
            now,
        );
        assert_eq!(rewritten, 1);
        assert_eq!(page.assignments_for(1), vec![CDN_URL]);
    }

    #[test]
    fn test_cdn_failure_falls_back_to_original() {
        let mut page = MockPage::new(PAGE_URL).with_image(1, ORIGINAL);
        let mut session = session();
        let now = Instant::now();

        session.handle_event(&mut page, PageEvent::DocumentReady, now);
        session.handle_event(
            &mut page,
            PageEvent::ImageFailed {
                id: ElementId(1),
                url: CDN_URL.to_string(),
            },
            now,
        );
        session.handle_event(
            &mut page,
            PageEvent::ImageLoaded {
                id: ElementId(1),
                url: ORIGINAL.to_string(),
            },
            now,
        );

        assert_eq!(page.assignments_for(1), vec![CDN_URL, ORIGINAL]);
        assert_eq!(
            statuses(&session),
            vec!["cdn_load_failed", "fallback_attempt_1", "fallback_success"]
        );
        assert!(!session.annotation(ElementId(1)).unwrap().fallback_in_progress);
    }

    #[test]
    fn test_cdn_success_is_reported() {
        let mut page = MockPage::new(PAGE_URL).with_image(1, ORIGINAL);
        let mut session = session();
        let now = Instant::now();

        session.handle_event(&mut page, PageEvent::DocumentReady, now);
        session.handle_event(
            &mut page,
            PageEvent::ImageLoaded {
                id: ElementId(1),
                url: CDN_URL.to_string(),
            },
            now,
        );

        assert_eq!(statuses(&session), vec!["cdn_load_success"]);
    }

    #[test]
    fn test_untouched_image_errors_are_ignored() {
        let mut page = MockPage::new(PAGE_URL).with_image(1, "https://a.com/missing.gif");
        let mut session = session();

        let assigned = session.handle_event(
            &mut page,
            PageEvent::ImageFailed {
                id: ElementId(1),
                url: "https://a.com/missing.gif".to_string(),
            },
            Instant::now(),
        );

        assert_eq!(assigned, 0);
        assert_eq!(session.reporter().pending(), 0);
    }

    #[test]
    fn test_mutations_process_and_forget() {
        let mut page = MockPage::new(PAGE_URL);
        let mut session = session();
        let now = Instant::now();

        page.add_image(7, ORIGINAL);
        let rewritten = session.handle_event(
            &mut page,
            PageEvent::Mutations(vec![DomMutation::Added(vec![ElementId(7)])]),
            now,
        );
        assert_eq!(rewritten, 1);
        assert!(session.next_deadline().is_some());

        session.handle_event(
            &mut page,
            PageEvent::Mutations(vec![DomMutation::Removed(vec![ElementId(7)])]),
            now,
        );
        assert!(session.annotation(ElementId(7)).is_none());
    }

    #[test]
    fn test_scheduled_sweep_finds_late_images() {
        let mut page = MockPage::new(PAGE_URL);
        let mut session = session();
        let t0 = Instant::now();

        session.handle_event(&mut page, PageEvent::DocumentReady, t0);
        page.add_image(3, "https://img.example.com/late.png");

        assert_eq!(session.run_due_sweeps(&mut page, t0 + Duration::from_millis(100)), 0);
        assert_eq!(session.run_due_sweeps(&mut page, t0 + Duration::from_millis(500)), 1);
        assert_eq!(page.assignments.len(), 1);
    }

    #[test]
    fn test_visibility_sweep() {
        let mut page = MockPage::new(PAGE_URL).with_image(1, ORIGINAL);
        let mut session = session();
        let now = Instant::now();

        assert_eq!(
            session.handle_event(&mut page, PageEvent::VisibilityChanged(Visibility::Hidden), now),
            0
        );
        assert_eq!(
            session.handle_event(&mut page, PageEvent::VisibilityChanged(Visibility::Visible), now),
            1
        );
    }

    #[test]
    fn test_unload_beacons_pending_telemetry() {
        let mut page = MockPage::new(PAGE_URL).with_image(1, ORIGINAL);
        let (mut session, transport) = session_with(&Settings::default(), "shop.example.com");
        let now = Instant::now();

        session.handle_event(&mut page, PageEvent::DocumentReady, now);
        session.handle_event(
            &mut page,
            PageEvent::ImageLoaded {
                id: ElementId(1),
                url: CDN_URL.to_string(),
            },
            now,
        );
        session.handle_event(&mut page, PageEvent::Unload, now);

        assert_eq!(session.reporter().pending(), 0);
        assert_eq!(transport.beacons.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_source_swap_mid_fallback_still_exhausts() {
        let mut page = MockPage::new(PAGE_URL).with_image(1, ORIGINAL);
        let mut session = session();
        let now = Instant::now();
        let swapped = "https://img.example.com/other.jpg";
        let failed = |url: &str| PageEvent::ImageFailed {
            id: ElementId(1),
            url: url.to_string(),
        };

        session.handle_event(&mut page, PageEvent::DocumentReady, now);
        session.handle_event(&mut page, failed(CDN_URL), now);
        page.set_source(ElementId(1), swapped);
        for _ in 0..5 {
            session.handle_event(&mut page, failed(swapped), now);
        }

        let annotation = session.annotation(ElementId(1)).unwrap();
        assert!(!annotation.fallback_in_progress);
        assert!(annotation.reported);
        assert_eq!(annotation.retry_count, 2);
        assert_eq!(
            statuses(&session),
            vec![
                "cdn_load_failed",
                "fallback_attempt_1",
                "fallback_attempt_2",
                "fallback_failed_all",
            ]
        );
    }

    #[test]
    fn test_element_seen_by_every_trigger_is_rewritten_once() {
        let mut page = MockPage::new(PAGE_URL);
        let mut session = session();
        let t0 = Instant::now();
        let settled = t0 + session.discovery().timings().settle_delay;

        page.add_image(9, ORIGINAL);
        let added = session.handle_event(
            &mut page,
            PageEvent::Mutations(vec![
                DomMutation::Added(vec![ElementId(9)]),
                DomMutation::AttributeChanged {
                    id: ElementId(9),
                    attribute: WatchedAttribute::Src,
                },
            ]),
            t0,
        );
        let due = session.run_due_sweeps(&mut page, settled);
        let loaded = session.handle_event(&mut page, PageEvent::WindowLoad, settled);
        let changed = session.handle_event(
            &mut page,
            PageEvent::Mutations(vec![DomMutation::AttributeChanged {
                id: ElementId(9),
                attribute: WatchedAttribute::Src,
            }]),
            settled,
        );

        assert_eq!((added, due, loaded, changed), (1, 0, 0, 0));
        assert_eq!(page.assignments_for(9), vec![CDN_URL]);
    }
}
