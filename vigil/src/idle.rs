//! Idle-detection state machine.
//!
//! Tracks the time of the last user-interaction signal and decides when to
//! demote the local presence to Unavailable and when to restore Online.
//! The machine is pure (clock injected) so transitions are testable without
//! timers; [`crate::client::HubClient`] drives it from activity signals and
//! a recurring check task.

use std::time::{Duration, Instant};

use vigil_proto::presence::PresenceState;

/// Local activity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// User interaction seen within the idle threshold.
    Active,
    /// No interaction for longer than the idle threshold.
    Idle,
}

/// Decides presence transitions from user activity.
#[derive(Debug)]
pub struct IdleDetector {
    threshold: Duration,
    last_activity: Instant,
    state: Activity,
}

impl IdleDetector {
    /// Creates a detector that demotes after `threshold` of inactivity,
    /// starting Active as of `now`.
    #[must_use]
    pub const fn new(threshold: Duration, now: Instant) -> Self {
        Self {
            threshold,
            last_activity: now,
            state: Activity::Active,
        }
    }

    /// Current activity state.
    #[must_use]
    pub const fn state(&self) -> Activity {
        self.state
    }

    /// Records a user-interaction signal (pointer move, key press, click).
    ///
    /// Returns `true` only on an Idle→Active transition, which is the one
    /// case where the caller should publish Online immediately. Repeated
    /// activity while already Active must not cause redundant publishes.
    pub fn record_activity(&mut self, now: Instant) -> bool {
        self.last_activity = now;
        if self.state == Activity::Idle {
            self.state = Activity::Active;
            return true;
        }
        false
    }

    /// Periodic check, run once per check interval.
    ///
    /// Past the threshold, transitions to Idle exactly once and asks the
    /// caller to publish Unavailable. While active, if the cached
    /// self-presence has diverged from Online (hub restart, dropped
    /// broadcast), asks for an Online republish — the steady-state
    /// self-healing exception to publish-on-transition-only.
    pub fn poll(&mut self, now: Instant, self_state: PresenceState) -> Option<PresenceState> {
        if now.duration_since(self.last_activity) > self.threshold {
            if self.state == Activity::Active {
                self.state = Activity::Idle;
                return Some(PresenceState::Unavailable);
            }
            None
        } else {
            if self.state == Activity::Idle {
                self.state = Activity::Active;
            }
            if self_state == PresenceState::Online {
                None
            } else {
                Some(PresenceState::Online)
            }
        }
    }
}
