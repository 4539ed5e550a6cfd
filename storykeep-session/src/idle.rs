//! Idle warning and automatic logout.
//!
//! [`SessionTimer`] composes two [`ActivityMonitor`]s anchored to the same
//! activity stream. The warning monitor opens a countdown; the logout monitor
//! ends the session outright. Both run off caller-supplied time.

use shared::config::IdleConfig;
use std::time::Duration;

use crate::activity::ActivityMonitor;

/// Inactivity before the warning is shown.
pub const WARN_AFTER: Duration = Duration::from_secs(25 * 60);

/// Inactivity before the session is ended.
pub const LOGOUT_AFTER: Duration = Duration::from_secs(30 * 60);

/// Length of the countdown shown with the warning.
pub const WARNING_DURATION_SECONDS: u32 = 300;

const TICK: Duration = Duration::from_secs(1);

/// What the host shows for the idle warning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdleState {
    pub warning_visible: bool,
    pub countdown_seconds: u32,
}

impl IdleState {
    /// Countdown rendered as `M:SS`.
    #[must_use]
    pub fn countdown_label(&self) -> String {
        format_countdown(self.countdown_seconds)
    }
}

/// Formats seconds as `M:SS`.
#[must_use]
pub fn format_countdown(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Why the session was ended by the idle subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutCause {
    IdleThreshold,
    CountdownExpired,
    UserRequested,
}

impl LogoutCause {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IdleThreshold => "idle_threshold",
            Self::CountdownExpired => "countdown_expired",
            Self::UserRequested => "user_requested",
        }
    }
}

/// Signals produced while polling the timer. `at` is the deadline that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleEvent {
    WarningShown {
        countdown_seconds: u32,
        at: Duration,
    },
    CountdownTick {
        countdown_seconds: u32,
        at: Duration,
    },
    AutoLogout {
        cause: LogoutCause,
        at: Duration,
    },
}

#[derive(Debug, Clone, Copy)]
enum Due {
    Warn(Duration),
    Tick(Duration),
    Logout(Duration),
}

impl Due {
    fn at(self) -> Duration {
        match self {
            Self::Warn(at) | Self::Tick(at) | Self::Logout(at) => at,
        }
    }
}

/// Idle warning then logout, driven by [`SessionTimer::poll`].
#[derive(Debug, Clone)]
pub struct SessionTimer {
    warn: ActivityMonitor,
    logout: ActivityMonitor,
    countdown_from: u32,
    next_tick: Option<Duration>,
    state: IdleState,
}

impl Default for SessionTimer {
    fn default() -> Self {
        Self::with_thresholds(WARN_AFTER, LOGOUT_AFTER, WARNING_DURATION_SECONDS)
    }
}

impl SessionTimer {
    #[must_use]
    pub fn new(config: &IdleConfig) -> Self {
        Self::with_thresholds(
            config.warn_after(),
            config.logout_after(),
            config.warning_countdown_secs,
        )
    }

    #[must_use]
    pub fn with_thresholds(warn_after: Duration, logout_after: Duration, countdown: u32) -> Self {
        Self {
            warn: ActivityMonitor::new(warn_after),
            logout: ActivityMonitor::new(logout_after),
            countdown_from: countdown,
            next_tick: None,
            state: IdleState::default(),
        }
    }

    /// Starts both monitors at `now`. A no-op unless `authenticated`.
    pub fn arm(&mut self, now: Duration, authenticated: bool) {
        if !authenticated {
            return;
        }
        self.state = IdleState::default();
        self.next_tick = None;
        self.warn.arm(now);
        self.logout.arm(now);
    }

    /// Cancels every pending deadline and hides the warning.
    pub fn disarm(&mut self) {
        self.warn.disarm();
        self.logout.disarm();
        self.next_tick = None;
        self.state = IdleState::default();
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.logout.is_armed()
    }

    #[must_use]
    pub fn state(&self) -> IdleState {
        self.state
    }

    /// Registers user activity. Ignored while the warning is visible.
    ///
    /// Returns whether the idle deadlines moved.
    pub fn record_activity(&mut self, now: Duration) -> bool {
        if self.state.warning_visible || !self.is_armed() {
            return false;
        }
        self.warn.reset(now);
        self.logout.reset(now);
        true
    }

    /// Dismisses the warning and restarts both idle deadlines from `now`.
    pub fn continue_session(&mut self, now: Duration) {
        self.state = IdleState::default();
        self.next_tick = None;
        if self.is_armed() {
            self.warn.arm(now);
            self.logout.arm(now);
        }
    }

    /// Hides the warning and stops the timers, bypassing the countdown.
    pub fn logout_now(&mut self, now: Duration) -> IdleEvent {
        self.disarm();
        IdleEvent::AutoLogout {
            cause: LogoutCause::UserRequested,
            at: now,
        }
    }

    /// Earliest instant at which [`SessionTimer::poll`] has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        [self.warn.deadline(), self.next_tick, self.logout.deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    /// Processes every deadline due at `now`, in time order.
    ///
    /// At equal instants the warning fires before a countdown tick, which
    /// fires before the logout deadline. Any logout disarms the timer, so at
    /// most one [`IdleEvent::AutoLogout`] is returned.
    pub fn poll(&mut self, now: Duration, authenticated: bool) -> Vec<IdleEvent> {
        let mut events = Vec::new();
        if !authenticated {
            self.disarm();
            return events;
        }

        while let Some(due) = self.next_due(now) {
            match due {
                Due::Warn(at) => {
                    // Re-armed by `continue_session`.
                    self.warn.disarm();
                    self.state = IdleState {
                        warning_visible: true,
                        countdown_seconds: self.countdown_from,
                    };
                    self.next_tick = Some(at + TICK);
                    events.push(IdleEvent::WarningShown {
                        countdown_seconds: self.countdown_from,
                        at,
                    });
                }
                Due::Tick(at) => {
                    let remaining = self.state.countdown_seconds.saturating_sub(1);
                    if remaining == 0 {
                        self.disarm();
                        events.push(IdleEvent::AutoLogout {
                            cause: LogoutCause::CountdownExpired,
                            at,
                        });
                        break;
                    }
                    self.state.countdown_seconds = remaining;
                    self.next_tick = Some(at + TICK);
                    events.push(IdleEvent::CountdownTick {
                        countdown_seconds: remaining,
                        at,
                    });
                }
                Due::Logout(at) => {
                    self.disarm();
                    events.push(IdleEvent::AutoLogout {
                        cause: LogoutCause::IdleThreshold,
                        at,
                    });
                    break;
                }
            }
        }

        events
    }

    fn next_due(&self, now: Duration) -> Option<Due> {
        [
            self.warn.deadline().map(Due::Warn),
            self.next_tick.map(Due::Tick),
            self.logout.deadline().map(Due::Logout),
        ]
        .into_iter()
        .flatten()
        .filter(|due| due.at() <= now)
        .min_by_key(|due| due.at())
    }
}
