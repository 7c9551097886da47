//! Deadline-based countdown timer.
//!
//! The timer stores an absolute deadline instead of decrementing a counter
//! on a tick, so remaining time is correct regardless of how often anyone
//! reads it. All methods take an explicit `now` so the store can pass a
//! single instant per mutation and tests can use synthetic clocks.

use tokio::time::Instant;

/// Default session length in seconds (10 minutes).
pub const DEFAULT_TIMER_SECONDS: u64 = 600;

/// Countdown timer state: `(duration_seconds, running, deadline)`.
///
/// Invariant: `deadline` is `Some` iff `running` is true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerEngine {
    duration_seconds: u64,
    running: bool,
    deadline: Option<Instant>,
}

impl Default for TimerEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerEngine {
    /// A stopped timer at the default duration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            duration_seconds: DEFAULT_TIMER_SECONDS,
            running: false,
            deadline: None,
        }
    }

    /// Start (or restart) the countdown from the current duration.
    pub fn start(&mut self, now: Instant) {
        self.deadline = Some(now + std::time::Duration::from_secs(self.duration_seconds));
        self.running = true;
    }

    /// Stop the countdown, folding the remaining time back into the
    /// duration so a later `start` resumes where it left off.
    pub fn stop(&mut self, now: Instant) {
        if self.running {
            self.duration_seconds = self.remaining(now);
        }
        self.deadline = None;
        self.running = false;
    }

    /// Restore the default duration, stopped.
    pub fn reset(&mut self) {
        self.duration_seconds = DEFAULT_TIMER_SECONDS;
        self.running = false;
        self.deadline = None;
    }

    /// Set the duration. A running timer is re-anchored so viewers see
    /// the new value counting down immediately.
    pub fn set_duration(&mut self, seconds: u64, now: Instant) {
        self.duration_seconds = seconds;
        if self.running {
            self.deadline = Some(now + std::time::Duration::from_secs(seconds));
        }
    }

    /// Remaining seconds. Side-effect-free; saturates at zero.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> u64 {
        match self.deadline {
            Some(deadline) => deadline.saturating_duration_since(now).as_secs(),
            None => self.duration_seconds,
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }
}
