//! Counts in-flight subresource requests of one page load.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::browser::ResponseStage;

/// What a tracker mutation means for the render scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerSignal {
    /// A new request is in flight; the page is not settled.
    Busy,
    /// The last outstanding request completed.
    Quiescent,
    /// Nothing changed that the scheduler cares about.
    Unchanged,
}

/// Outcome of a failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedResource {
    pub signal: TrackerSignal,
    /// URL of the failed request, when its start was seen.
    pub url: Option<String>,
}

/// Request ids are tracked individually so that a completion for an unknown
/// or already-completed id never moves the count. Completions that overtake
/// their own start are remembered and cancel that start when it arrives.
#[derive(Debug, Default)]
pub struct ResourceTracker {
    in_flight: HashMap<String, String>,
    settled_early: HashSet<String>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outstanding(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_quiescent(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub fn on_resource_started(&mut self, id: &str, url: &str) -> TrackerSignal {
        if self.settled_early.remove(id) {
            debug!(id, url, "resource completed before its start was delivered");
            return TrackerSignal::Unchanged;
        }
        if self.in_flight.insert(id.to_string(), url.to_string()).is_some() {
            return TrackerSignal::Unchanged;
        }
        debug!(id, url, outstanding = self.outstanding(), "resource requested");
        TrackerSignal::Busy
    }

    /// Only the terminal stage of a response counts as a completion.
    pub fn on_resource_finished(&mut self, id: &str, stage: ResponseStage) -> TrackerSignal {
        if stage != ResponseStage::End {
            return TrackerSignal::Unchanged;
        }
        self.complete(id).0
    }

    /// A failed load still completes its request so the count cannot leak upward.
    pub fn on_resource_failed(&mut self, id: &str) -> FailedResource {
        let (signal, url) = self.complete(id);
        FailedResource { signal, url }
    }

    fn complete(&mut self, id: &str) -> (TrackerSignal, Option<String>) {
        match self.in_flight.remove(id) {
            Some(url) => {
                debug!(id, outstanding = self.outstanding(), "resource completed");
                let signal = if self.in_flight.is_empty() {
                    TrackerSignal::Quiescent
                } else {
                    TrackerSignal::Unchanged
                };
                (signal, Some(url))
            }
            None => {
                self.settled_early.insert(id.to_string());
                (TrackerSignal::Unchanged, None)
            }
        }
    }
}
