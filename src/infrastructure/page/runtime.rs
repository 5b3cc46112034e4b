//! Async driver for one page session.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tracing::{debug, info, warn};

use crate::application::services::{
    PageSession, RequestInterceptor, SettingsService, SweepReason,
};
use crate::domain::entities::{ExtensionMessage, ExtensionStateResponse, PageEvent};
use crate::domain::ports::PagePort;

/// Idle wait used when no sweep is scheduled.
const IDLE_WAIT: Duration = Duration::from_secs(3600);

/// What a finished run hands back.
#[derive(Debug)]
pub struct PageRunReport<P> {
    /// The page, with every source assignment applied.
    pub page: P,
    /// The session, holding the final annotations.
    pub session: PageSession,
    /// Replies to `getExtensionState` messages, in order.
    pub responses: Vec<ExtensionStateResponse>,
    /// Events consumed from the feed.
    pub events: usize,
}

/// Feeds a page's change stream and timers into a [`PageSession`].
///
/// Runs on the page's own task; the page need not be `Send`.
pub struct PageRuntime<P> {
    page: P,
    session: PageSession,
    settings: Option<Arc<SettingsService>>,
    interceptor: Option<Arc<RequestInterceptor>>,
    responses: Vec<ExtensionStateResponse>,
}

impl<P: PagePort> PageRuntime<P> {
    /// Creates a runtime for `page`.
    pub fn new(page: P, session: PageSession) -> Self {
        Self {
            page,
            session,
            settings: None,
            interceptor: None,
            responses: Vec::new(),
        }
    }

    /// Persists extension messages through `service`.
    #[must_use]
    pub fn with_settings(mut self, service: Arc<SettingsService>) -> Self {
        self.settings = Some(service);
        self
    }

    /// Keeps `interceptor` in step with the master switch.
    #[must_use]
    pub fn with_interceptor(mut self, interceptor: Arc<RequestInterceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    /// Runs until the feed yields [`PageEvent::Unload`] or ends.
    ///
    /// Pending telemetry is sent and awaited on the way out, so nothing is
    /// left running when the caller's runtime shuts down.
    pub async fn run<S>(mut self, mut events: S) -> PageRunReport<P>
    where
        S: Stream<Item = PageEvent> + Unpin,
    {
        let periodic_every = self.session.discovery().timings().periodic_interval;
        let flush_every = self.session.reporter().config().flush_interval;
        let start = Instant::now();

        let mut periodic = interval_at(start + periodic_every, periodic_every);
        periodic.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut flush = interval_at(start + flush_every, flush_every);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(url = %self.page.page_url(), inert = self.session.is_inert(), "Page session started");
        let mut consumed = 0;

        loop {
            let deadline = self.session.next_deadline();

            tokio::select! {
                event = events.next() => {
                    match event {
                        Some(PageEvent::Unload) | None => {
                            if event.is_some() {
                                consumed += 1;
                            }
                            self.close().await;
                            break;
                        }
                        Some(PageEvent::Message(message)) => {
                            consumed += 1;
                            self.on_message(message).await;
                        }
                        Some(event) => {
                            consumed += 1;
                            self.session.handle_event(&mut self.page, event, Instant::now());
                        }
                    }
                }
                _ = periodic.tick() => {
                    self.session.sweep(&mut self.page, SweepReason::Periodic);
                }
                _ = flush.tick() => {
                    self.session.reporter().request_flush();
                }
                () = sleep_until(deadline.unwrap_or_else(|| Instant::now() + IDLE_WAIT)), if deadline.is_some() => {
                    self.session.run_due_sweeps(&mut self.page, Instant::now());
                }
            }
        }

        info!(events = consumed, "Page session ended");
        PageRunReport {
            page: self.page,
            session: self.session,
            responses: self.responses,
            events: consumed,
        }
    }

    /// Delivers queued telemetry, then unloads the page.
    ///
    /// Only entries that still fail to send are left for the unload beacon.
    async fn close(&mut self) {
        let report = self.session.reporter().drain().await;
        debug!(sent = report.sent, left = report.requeued, "Telemetry drained before unload");
        self.session
            .handle_event(&mut self.page, PageEvent::Unload, Instant::now());
    }

    async fn on_message(&mut self, message: ExtensionMessage) {
        debug!(?message, "Extension message");
        self.session
            .handle_event(&mut self.page, PageEvent::Message(message.clone()), Instant::now());

        let Some(service) = &self.settings else {
            if message == ExtensionMessage::GetExtensionState {
                self.responses.push(ExtensionStateResponse {
                    is_enabled: self.session.is_enabled(),
                });
            }
            return;
        };

        match service.handle(&message).await {
            Ok(outcome) => {
                if let (Some(enabled), Some(interceptor)) = (outcome.enabled, &self.interceptor) {
                    interceptor.set_enabled(enabled);
                }
                if let Some(response) = outcome.response {
                    self.responses.push(response);
                }
            }
            Err(e) => warn!(error = %e, "Failed to apply extension message"),
        }
    }
}
