//! Render-completion detection.
//!
//! - [`tracker`] - counts in-flight subresource requests
//! - [`scheduler`] - quiet-period and ceiling timers behind a one-shot latch
//!
//! [`RenderWatch`] ties the two together for one page load: it consumes the
//! page's event stream and resolves exactly once, either when the page has been
//! quiet for the quiet period, when the ceiling elapses, or when the main
//! document itself fails to load.

mod scheduler;
mod tracker;

pub use scheduler::{FireReason, RenderScheduler, RenderTiming};
pub use tracker::{FailedResource, ResourceTracker, TrackerSignal};

use futures::{Stream, StreamExt};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::browser::PageEvent;
use crate::request::same_document;

/// How the wait for a page ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Fired(FireReason),
    /// The main document failed while subresources were being tracked.
    DocumentFailed { error: String },
}

#[derive(Debug)]
pub struct RenderWatch {
    document_url: String,
    tracker: ResourceTracker,
    scheduler: RenderScheduler,
    script_errors: Vec<String>,
    opened_at: Option<Instant>,
}

impl RenderWatch {
    pub fn new(document_url: impl Into<String>, timing: RenderTiming) -> Self {
        Self {
            document_url: document_url.into(),
            tracker: ResourceTracker::new(),
            scheduler: RenderScheduler::new(timing),
            script_errors: Vec::new(),
            opened_at: None,
        }
    }

    /// Arm the ceiling. A page with nothing outstanding is already quiescent,
    /// so the quiet timer is armed as well.
    pub fn start(&mut self, now: Instant) {
        self.opened_at.get_or_insert(now);
        self.scheduler.start(now);
        if self.tracker.is_quiescent() {
            self.scheduler.quiescent(now);
        }
    }

    pub fn opened_at(&self) -> Option<Instant> {
        self.opened_at
    }

    pub fn outstanding(&self) -> usize {
        self.tracker.outstanding()
    }

    pub fn script_errors(&self) -> &[String] {
        &self.script_errors
    }

    pub fn into_script_errors(self) -> Vec<String> {
        self.script_errors
    }

    /// Feed one page event. Returns an outcome only when the event ends the wait.
    pub fn apply(&mut self, event: &PageEvent, now: Instant) -> Option<RenderOutcome> {
        if self.scheduler.fired().is_some() {
            return None;
        }
        let signal = match event {
            PageEvent::RequestStarted { id, url } => self.tracker.on_resource_started(id, url),
            PageEvent::ResponseReceived { id, stage } => {
                self.tracker.on_resource_finished(id, *stage)
            }
            PageEvent::RequestFailed { id, error } => {
                let failed = self.tracker.on_resource_failed(id);
                if let Some(url) = failed.url.as_deref() {
                    if same_document(url, &self.document_url) {
                        warn!(url, error = %error, "main document failed to load");
                        return Some(RenderOutcome::DocumentFailed {
                            error: error.clone(),
                        });
                    }
                    debug!(url, error = %error, "resource failed to load");
                }
                failed.signal
            }
            PageEvent::ScriptError { message } => {
                warn!(message = %message, "page script error");
                self.script_errors.push(message.clone());
                TrackerSignal::Unchanged
            }
        };

        match signal {
            TrackerSignal::Busy => self.scheduler.cancel_quiet(),
            TrackerSignal::Quiescent if self.scheduler.is_started() => {
                self.scheduler.quiescent(now)
            }
            TrackerSignal::Quiescent | TrackerSignal::Unchanged => {}
        }
        self.poll(now)
    }

    /// Fire any elapsed timer.
    pub fn poll(&mut self, now: Instant) -> Option<RenderOutcome> {
        self.scheduler.poll(now).map(RenderOutcome::Fired)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    pub fn fired(&self) -> Option<FireReason> {
        self.scheduler.fired()
    }

    /// Wait on `events` until the page is done enough to harvest.
    ///
    /// Starts the watch if it was not started. Timers are checked before each
    /// event, so an elapsed deadline always wins over a later event. If the
    /// stream ends early the remaining timers still run to completion.
    pub async fn run<S>(&mut self, events: &mut S) -> RenderOutcome
    where
        S: Stream<Item = PageEvent> + Unpin,
    {
        if self.opened_at.is_none() {
            self.start(Instant::now());
        }
        let mut stream_open = true;
        loop {
            if let Some(outcome) = self.poll(Instant::now()) {
                return outcome;
            }
            let Some(deadline) = self.next_deadline() else {
                // Unreachable once started: the ceiling stays armed until fired.
                return RenderOutcome::Fired(FireReason::Ceiling);
            };

            tokio::select! {
                biased;
                _ = sleep_until(deadline) => {}
                event = events.next(), if stream_open => match event {
                    Some(event) => {
                        if let Some(outcome) = self.apply(&event, Instant::now()) {
                            return outcome;
                        }
                    }
                    None => stream_open = false,
                },
            }
        }
    }
}
