//! Deduplicated, batched telemetry for image outcomes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::domain::entities::{LogEntry, TelemetryStatus, UrlDetails};
use crate::domain::ports::TelemetryTransportPort;

/// Entries queued before a flush is triggered.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Time between background flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// Send attempts after which an entry is given up on.
pub const MAX_SEND_ATTEMPTS: u32 = 5;

/// Reporter configuration.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// When false, `record` is a no-op.
    pub enabled: bool,
    /// Queue length that triggers a flush.
    pub batch_size: usize,
    /// Period of the background flush.
    pub flush_interval: Duration,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

/// Result of [`TelemetryReporter::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Entry queued.
    Queued,
    /// Same `(cdn_url, status)` already recorded this page life.
    Duplicate,
    /// Telemetry is switched off.
    Disabled,
}

/// Result of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Entries the server accepted.
    pub sent: usize,
    /// Entries pushed back for the next flush.
    pub requeued: usize,
    /// Entries that failed [`MAX_SEND_ATTEMPTS`] times.
    pub dropped: usize,
}

#[derive(Debug, Clone)]
struct QueuedEntry {
    entry: LogEntry,
    attempts: u32,
}

struct ReporterInner {
    config: ReporterConfig,
    page_url: String,
    page_host: String,
    transport: Arc<dyn TelemetryTransportPort>,
    queue: Mutex<Vec<QueuedEntry>>,
    seen: Mutex<HashSet<(String, TelemetryStatus)>>,
    flush_lock: tokio::sync::Mutex<()>,
}

/// Per-page telemetry queue. Cloning shares the queue.
#[derive(Clone)]
pub struct TelemetryReporter {
    inner: Arc<ReporterInner>,
}

impl std::fmt::Debug for TelemetryReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryReporter")
            .field("config", &self.inner.config)
            .field("page_url", &self.inner.page_url)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl TelemetryReporter {
    /// Creates a reporter for the page at `page_url`.
    #[must_use]
    pub fn new(
        config: ReporterConfig,
        page_url: impl Into<String>,
        transport: Arc<dyn TelemetryTransportPort>,
    ) -> Self {
        let page_url = page_url.into();
        let page_host = UrlDetails::parse(&page_url).domain;

        Self {
            inner: Arc::new(ReporterInner {
                config,
                page_url,
                page_host,
                transport,
                queue: Mutex::new(Vec::new()),
                seen: Mutex::new(HashSet::new()),
                flush_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ReporterConfig {
        &self.inner.config
    }

    /// Number of queued entries.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Snapshot of the queued entries.
    #[must_use]
    pub fn pending_entries(&self) -> Vec<LogEntry> {
        self.inner
            .queue
            .lock()
            .iter()
            .map(|queued| queued.entry.clone())
            .collect()
    }

    /// Records an outcome for the image whose CDN URL is `cdn_url`.
    ///
    /// Each `(cdn_url, status)` pair is queued at most once. Reaching the
    /// batch size schedules a flush on the current runtime.
    pub fn record(
        &self,
        cdn_url: &str,
        original_url: Option<&str>,
        status: TelemetryStatus,
    ) -> RecordOutcome {
        if !self.inner.config.enabled {
            return RecordOutcome::Disabled;
        }

        let key = (cdn_url.to_string(), status.clone());
        if !self.inner.seen.lock().insert(key) {
            trace!(cdn_url = %cdn_url, status = %status, "Duplicate telemetry skipped");
            return RecordOutcome::Duplicate;
        }

        let entry = self.build_entry(cdn_url, original_url, status);
        debug!(status = %entry.status, domain = %entry.domain, "Telemetry queued");

        let queued = {
            let mut queue = self.inner.queue.lock();
            queue.push(QueuedEntry { entry, attempts: 0 });
            queue.len()
        };

        if queued >= self.inner.config.batch_size {
            self.request_flush();
        }

        RecordOutcome::Queued
    }

    fn build_entry(
        &self,
        cdn_url: &str,
        original_url: Option<&str>,
        status: TelemetryStatus,
    ) -> LogEntry {
        let cdn = UrlDetails::parse(cdn_url);
        let original = match original_url {
            Some(url) => UrlDetails::parse(url),
            None => UrlDetails {
                domain: self.inner.page_host.clone(),
                ..UrlDetails::default()
            },
        };

        let or_cdn = |own: String, fallback: String| if own.is_empty() { fallback } else { own };
        let shown = original_url.unwrap_or("unknown");
        let page = &self.inner.page_url;

        let message = match status {
            TelemetryStatus::CdnNotFound => {
                format!("CDN image not found. Original: {shown}. Page: {page}")
            }
            TelemetryStatus::CdnLoadSuccess => {
                format!("CDN WebP image loaded successfully. Original: {shown}. Page: {page}")
            }
            TelemetryStatus::FallbackSuccess => {
                format!("Fallback successful. Original: {shown}. Page: {page}")
            }
            ref other => format!("Image event: {other}. Original: {shown}. Page: {page}"),
        };

        LogEntry {
            level: status.level(),
            message,
            origin_url: or_cdn(original.origin_url, cdn.origin_url),
            domain: or_cdn(original.domain, cdn.domain),
            original_filename: or_cdn(original.original_filename, cdn.original_filename),
            filename_base: or_cdn(original.filename_base, cdn.filename_base),
            original_path_query: or_cdn(original.original_path_query, cdn.original_path_query),
            timestamp: Utc::now(),
            status,
        }
    }

    /// Spawns a flush on the current runtime, if there is one.
    pub fn request_flush(&self) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let reporter = self.clone();
                handle.spawn(async move {
                    reporter.flush().await;
                });
            }
            Err(_) => {
                debug!("No runtime for threshold flush; waiting for the timer");
            }
        }
    }

    /// Sends every queued entry.
    ///
    /// Entries that fail go back to the front of the queue until they have
    /// failed [`MAX_SEND_ATTEMPTS`] times. Returns immediately if another
    /// flush is running.
    pub async fn flush(&self) -> FlushReport {
        let Ok(_guard) = self.inner.flush_lock.try_lock() else {
            trace!("Flush already running");
            return FlushReport::default();
        };
        self.send_queued().await
    }

    /// Waits for a running flush to finish, then sends what is left.
    pub async fn drain(&self) -> FlushReport {
        let _guard = self.inner.flush_lock.lock().await;
        self.send_queued().await
    }

    async fn send_queued(&self) -> FlushReport {
        let batch = std::mem::take(&mut *self.inner.queue.lock());
        let mut report = FlushReport::default();
        if batch.is_empty() {
            return report;
        }

        let mut failed = Vec::new();
        for mut queued in batch {
            match self.inner.transport.send(&queued.entry).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    queued.attempts += 1;
                    if queued.attempts >= MAX_SEND_ATTEMPTS {
                        warn!(
                            error = %e,
                            status = %queued.entry.status,
                            attempts = queued.attempts,
                            "Telemetry entry dropped"
                        );
                        report.dropped += 1;
                    } else {
                        warn!(error = %e, status = %queued.entry.status, "Telemetry send failed, will retry");
                        failed.push(queued);
                    }
                }
            }
        }

        report.requeued = failed.len();
        if !failed.is_empty() {
            let mut queue = self.inner.queue.lock();
            failed.append(&mut queue);
            *queue = failed;
        }

        info!(
            sent = report.sent,
            requeued = report.requeued,
            dropped = report.dropped,
            "Telemetry flushed"
        );
        report
    }

    /// Drains the queue through the transport's fire-and-forget path.
    ///
    /// Returns the number of entries handed off.
    pub fn flush_on_unload(&self) -> usize {
        let batch = std::mem::take(&mut *self.inner.queue.lock());
        for queued in &batch {
            self.inner.transport.beacon(&queued.entry);
        }
        if !batch.is_empty() {
            debug!(count = batch.len(), "Telemetry beaconed on unload");
        }
        batch.len()
    }
}
