//! Inactivity detection.

use std::time::Duration;

/// Kinds of user interaction that count as activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivitySignal {
    PointerDown,
    PointerMove,
    KeyPress,
    Scroll,
    TouchStart,
    Click,
}

/// Every signal the idle timers listen for.
pub const ACTIVITY_SIGNALS: [ActivitySignal; 6] = [
    ActivitySignal::PointerDown,
    ActivitySignal::PointerMove,
    ActivitySignal::KeyPress,
    ActivitySignal::Scroll,
    ActivitySignal::TouchStart,
    ActivitySignal::Click,
];

/// A single re-arming inactivity deadline.
///
/// The monitor never reads a clock itself. Callers pass the current time and
/// ask [`ActivityMonitor::fire_due`] whether the deadline has passed; after
/// firing it schedules the next cycle one `timeout` later.
#[derive(Debug, Clone)]
pub struct ActivityMonitor {
    timeout: Duration,
    deadline: Option<Duration>,
}

impl ActivityMonitor {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Starts a scheduling cycle expiring `timeout` after `now`.
    pub fn arm(&mut self, now: Duration) {
        self.deadline = Some(now + self.timeout);
    }

    /// Pushes the pending expiry back to `now + timeout`. Does nothing while disarmed.
    pub fn reset(&mut self, now: Duration) {
        if self.deadline.is_some() {
            self.arm(now);
        }
    }

    /// Cancels the pending expiry.
    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Returns the deadline that fired, if it is due at `now`, and re-arms.
    ///
    /// Fires at most once per call even when several cycles were missed.
    pub fn fire_due(&mut self, now: Duration) -> Option<Duration> {
        let deadline = self.deadline.filter(|deadline| *deadline <= now)?;
        self.deadline = Some(deadline + self.timeout);
        Some(deadline)
    }
}
