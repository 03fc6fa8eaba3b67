//! Idle watchdog: tears the server down when no request arrived for a whole period.
//!
//! The state machine is driven by explicit events (`request_received`,
//! `request_completed`, `tick`) and knows nothing about clocks beyond the
//! timestamps it is handed, so the reset-vs-expire race is decided in one place.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleState {
    /// No request since the last tick.
    Idle,
    /// A request arrived since the last tick, or one is still in flight.
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Expire,
}

#[derive(Debug)]
pub struct IdleWatchdog {
    state: IdleState,
    in_flight: usize,
    last_activity_at: Instant,
}

impl IdleWatchdog {
    pub fn new(now: Instant) -> Self {
        Self {
            state: IdleState::Idle,
            in_flight: 0,
            last_activity_at: now,
        }
    }

    pub fn state(&self) -> IdleState {
        self.state
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn last_activity_at(&self) -> Instant {
        self.last_activity_at
    }

    pub fn request_received(&mut self, now: Instant) {
        self.state = IdleState::Active;
        self.in_flight += 1;
        self.last_activity_at = now;
    }

    pub fn request_completed(&mut self, now: Instant) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.last_activity_at = now;
    }

    /// Periodic check. Expires only if nothing arrived since the previous tick
    /// and nothing is in flight; otherwise clears the activity flag.
    pub fn tick(&mut self) -> TickOutcome {
        match self.state {
            IdleState::Idle if self.in_flight == 0 => TickOutcome::Expire,
            _ => {
                if self.in_flight == 0 {
                    self.state = IdleState::Idle;
                }
                TickOutcome::Continue
            }
        }
    }
}

pub type SharedWatchdog = Arc<Mutex<IdleWatchdog>>;

pub fn shared(now: Instant) -> SharedWatchdog {
    Arc::new(Mutex::new(IdleWatchdog::new(now)))
}

/// Tick every `period` until expiry or until `shutdown` is cancelled elsewhere.
/// On expiry the token is cancelled. Returns whether this watchdog expired.
pub async fn run_idle_watchdog(
    watchdog: SharedWatchdog,
    period: Duration,
    shutdown: CancellationToken,
) -> bool {
    let mut ticks = interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return false,
            _ = ticks.tick() => {
                let outcome = watchdog
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .tick();
                match outcome {
                    TickOutcome::Continue => {
                        debug!("activity since last idle check, watchdog reset")
                    }
                    TickOutcome::Expire => {
                        info!(idle_secs = period.as_secs(), "idle timeout");
                        shutdown.cancel();
                        return true;
                    }
                }
            }
        }
    }
}
