//! Image discovery triggers and the delayed-sweep schedule.

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::domain::entities::{DomMutation, ElementId, Visibility, WatchedAttribute};

/// Timing knobs for discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryTimings {
    /// Extra sweeps after document ready, relative to it.
    pub initial_rescans: Vec<Duration>,
    /// Delay before the sweep that follows mutations or AJAX completion.
    pub settle_delay: Duration,
    /// Delay between the first scroll of a burst and its sweep.
    pub scroll_throttle: Duration,
    /// Period of the background sweep.
    pub periodic_interval: Duration,
}

impl Default for DiscoveryTimings {
    fn default() -> Self {
        Self {
            initial_rescans: vec![Duration::from_millis(500), Duration::from_millis(1500)],
            settle_delay: Duration::from_millis(100),
            scroll_throttle: Duration::from_millis(200),
            periodic_interval: Duration::from_millis(2000),
        }
    }
}

/// Why a sweep ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepReason {
    /// DOM content became ready.
    DocumentReady,
    /// Follow-up sweep after document ready.
    InitialRescan,
    /// Settle sweep after mutations.
    Mutation,
    /// Throttled scroll sweep.
    Scroll,
    /// Background timer.
    Periodic,
    /// Window `load`.
    WindowLoad,
    /// Settle sweep after an AJAX request completed.
    AjaxComplete,
    /// Tab became visible.
    Visible,
    /// Rewriting was switched back on.
    Enabled,
}

/// Pending delayed sweeps.
#[derive(Debug, Default)]
pub struct SweepSchedule {
    pending: Vec<(Instant, SweepReason)>,
    scroll_pending: bool,
}

impl SweepSchedule {
    /// Schedules a sweep at `at`.
    pub fn schedule(&mut self, at: Instant, reason: SweepReason) {
        trace!(?reason, "Sweep scheduled");
        self.pending.push((at, reason));
    }

    /// Schedules a scroll sweep unless one is already pending.
    ///
    /// Returns true if a sweep was scheduled.
    pub fn schedule_scroll(&mut self, at: Instant) -> bool {
        if self.scroll_pending {
            return false;
        }
        self.scroll_pending = true;
        self.schedule(at, SweepReason::Scroll);
        true
    }

    /// Earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|(at, _)| *at).min()
    }

    /// Removes and returns every sweep due at `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<SweepReason> {
        let mut due: Vec<(Instant, SweepReason)> = Vec::new();
        self.pending.retain(|&(at, reason)| {
            if at <= now {
                due.push((at, reason));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(at, _)| *at);

        if due.iter().any(|(_, r)| *r == SweepReason::Scroll) {
            self.scroll_pending = false;
        }
        due.into_iter().map(|(_, reason)| reason).collect()
    }

    /// Number of pending sweeps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// What a batch of mutations asks of the session.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MutationPlan {
    /// Images to process right away.
    pub process_now: Vec<ElementId>,
    /// Images that left the document.
    pub removed: Vec<ElementId>,
}

/// Turns page triggers into immediate work and delayed sweeps.
#[derive(Debug, Default)]
pub struct DiscoveryEngine {
    timings: DiscoveryTimings,
    schedule: SweepSchedule,
}

impl DiscoveryEngine {
    /// Creates an engine with an empty schedule.
    #[must_use]
    pub fn new(timings: DiscoveryTimings) -> Self {
        Self {
            timings,
            schedule: SweepSchedule::default(),
        }
    }

    /// Returns the timings.
    #[must_use]
    pub const fn timings(&self) -> &DiscoveryTimings {
        &self.timings
    }

    /// Schedules the follow-up sweeps. The caller sweeps immediately.
    pub fn on_document_ready(&mut self, now: Instant) {
        for delay in &self.timings.initial_rescans {
            self.schedule.schedule(now + *delay, SweepReason::InitialRescan);
        }
    }

    /// Sorts a mutation batch into immediate work.
    ///
    /// Added images and `src` changes on unprocessed images are processed now.
    /// Every relevant mutation also schedules a settle sweep.
    pub fn on_mutations(
        &mut self,
        mutations: &[DomMutation],
        now: Instant,
        is_processed: impl Fn(ElementId) -> bool,
    ) -> MutationPlan {
        let mut plan = MutationPlan::default();
        let mut relevant = false;

        for mutation in mutations {
            match mutation {
                DomMutation::Added(ids) => {
                    relevant |= !ids.is_empty();
                    plan.process_now.extend(ids.iter().copied());
                }
                DomMutation::AttributeChanged { id, attribute } => {
                    relevant = true;
                    if *attribute == WatchedAttribute::Src && !is_processed(*id) {
                        plan.process_now.push(*id);
                    }
                }
                DomMutation::Removed(ids) => plan.removed.extend(ids.iter().copied()),
            }
        }

        if relevant {
            self.schedule
                .schedule(now + self.timings.settle_delay, SweepReason::Mutation);
        }
        plan
    }

    /// Handles a scroll event. Returns true if it scheduled a sweep.
    pub fn on_scroll(&mut self, now: Instant) -> bool {
        self.schedule
            .schedule_scroll(now + self.timings.scroll_throttle)
    }

    /// Schedules the settle sweep after an AJAX request.
    pub fn on_ajax_complete(&mut self, now: Instant) {
        self.schedule
            .schedule(now + self.timings.settle_delay, SweepReason::AjaxComplete);
    }

    /// Returns true if the change calls for an immediate sweep.
    #[must_use]
    pub fn on_visibility(&self, visibility: Visibility) -> bool {
        visibility == Visibility::Visible
    }

    /// Removes and returns the sweeps due at `now`.
    pub fn due(&mut self, now: Instant) -> Vec<SweepReason> {
        self.schedule.take_due(now)
    }

    /// Earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.schedule.next_deadline()
    }

    /// Returns the pending schedule.
    #[must_use]
    pub const fn schedule(&self) -> &SweepSchedule {
        &self.schedule
    }
}
