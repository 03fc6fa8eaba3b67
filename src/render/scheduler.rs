//! Decides the single moment at which a page snapshot is taken.
//!
//! Time is passed in explicitly, so the state machine is driven the same way by
//! the async wait loop and by tests using synthetic instants.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Which timer ended the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FireReason {
    /// The page stayed quiescent for the whole quiet period.
    Quiet,
    /// The hard ceiling elapsed first.
    Ceiling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTiming {
    pub quiet_period: Duration,
    pub ceiling: Duration,
}

impl Default for RenderTiming {
    fn default() -> Self {
        Self {
            quiet_period: crate::config::DEFAULT_QUIET_PERIOD,
            ceiling: crate::config::DEFAULT_RENDER_CEILING,
        }
    }
}

#[derive(Debug)]
pub struct RenderScheduler {
    timing: RenderTiming,
    quiet_deadline: Option<Instant>,
    ceiling_deadline: Option<Instant>,
    fired: Option<FireReason>,
}

impl RenderScheduler {
    pub fn new(timing: RenderTiming) -> Self {
        Self {
            timing,
            quiet_deadline: None,
            ceiling_deadline: None,
            fired: None,
        }
    }

    pub fn timing(&self) -> RenderTiming {
        self.timing
    }

    /// Arm the ceiling timer. A second call does not move it.
    pub fn start(&mut self, now: Instant) {
        if self.fired.is_none() && self.ceiling_deadline.is_none() {
            self.ceiling_deadline = Some(now + self.timing.ceiling);
        }
    }

    pub fn is_started(&self) -> bool {
        self.ceiling_deadline.is_some() || self.fired.is_some()
    }

    /// (Re)arm the quiet timer, replacing any pending one.
    pub fn quiescent(&mut self, now: Instant) {
        if self.fired.is_none() {
            debug!(
                quiet_ms = self.timing.quiet_period.as_millis() as u64,
                "page quiescent, quiet timer armed"
            );
            self.quiet_deadline = Some(now + self.timing.quiet_period);
        }
    }

    /// A new resource is loading; the pending quiet period no longer applies.
    pub fn cancel_quiet(&mut self) {
        self.quiet_deadline = None;
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.quiet_deadline, self.ceiling_deadline) {
            (Some(quiet), Some(ceiling)) => Some(quiet.min(ceiling)),
            (quiet, ceiling) => quiet.or(ceiling),
        }
    }

    /// Fire whichever timer has elapsed at `now`; the earlier deadline wins.
    pub fn poll(&mut self, now: Instant) -> Option<FireReason> {
        let quiet = self.quiet_deadline.filter(|deadline| *deadline <= now);
        let ceiling = self.ceiling_deadline.filter(|deadline| *deadline <= now);
        let reason = match (quiet, ceiling) {
            (Some(quiet), Some(ceiling)) if ceiling < quiet => FireReason::Ceiling,
            (Some(_), _) => FireReason::Quiet,
            (None, Some(_)) => FireReason::Ceiling,
            (None, None) => return None,
        };
        self.fire(reason)
    }

    /// One-shot latch: returns the reason the first time, `None` afterwards.
    /// Both timers are cleared when it trips.
    pub fn fire(&mut self, reason: FireReason) -> Option<FireReason> {
        if self.fired.is_some() {
            return None;
        }
        self.quiet_deadline = None;
        self.ceiling_deadline = None;
        self.fired = Some(reason);
        debug!(?reason, "render fired");
        Some(reason)
    }

    pub fn fired(&self) -> Option<FireReason> {
        self.fired
    }
}
