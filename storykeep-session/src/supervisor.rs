//! Async driver for the idle timers.
//!
//! [`IdleSupervisor`] owns a [`SessionTimer`] on a background task. Every
//! sign-in starts the timer afresh and every sign-out disarms it, including a
//! sign-out and sign-in that land between two wakeups. In between it sleeps
//! until the next deadline and performs the logout the timer asks for.

use shared::config::IdleConfig;
use std::{
    future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::sync::{Notify, broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::{
    activity::ActivitySignal,
    audit::{self, AuditAction},
    clock::Clock,
    idle::{IdleEvent, IdleState, SessionTimer},
    session::AuthSession,
    state::AuthState,
};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug)]
struct Inner {
    timer: Mutex<SessionTimer>,
    clock: Arc<dyn Clock>,
    session: AuthSession,
    wake: Notify,
    state_tx: watch::Sender<IdleState>,
    events_tx: broadcast::Sender<IdleEvent>,
    cancel: CancellationToken,
}

impl Inner {
    fn timer(&self) -> MutexGuard<'_, SessionTimer> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self) {
        let current = self.timer().state();
        self.state_tx.send_if_modified(|state| {
            if *state == current {
                false
            } else {
                *state = current;
                true
            }
        });
    }

    async fn dispatch(&self, events: Vec<IdleEvent>) {
        for event in events {
            match event {
                IdleEvent::WarningShown {
                    countdown_seconds, ..
                } => info!(countdown_seconds, "idle warning shown"),
                IdleEvent::CountdownTick {
                    countdown_seconds, ..
                } => trace!(countdown_seconds, "idle countdown"),
                IdleEvent::AutoLogout { .. } => {}
            }
            let _ = self.events_tx.send(event);

            if let IdleEvent::AutoLogout { cause, .. } = event {
                let user_id = self.session.state().user.map(|user| user.id);
                info!(cause = cause.as_str(), "ending idle session");
                audit::record(AuditAction::IdleLogout, cause.as_str(), user_id);
                self.session.logout().await;
            }
        }
    }
}

/// Handle to the idle-timeout task. Dropping it stops the task.
#[derive(Debug)]
pub struct IdleSupervisor {
    inner: Arc<Inner>,
}

impl IdleSupervisor {
    /// Starts supervising `session` on the current tokio runtime.
    #[must_use]
    pub fn spawn(session: AuthSession, config: &IdleConfig, clock: Arc<dyn Clock>) -> Self {
        let (state_tx, _) = watch::channel(IdleState::default());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let auth_rx = session.subscribe();

        let inner = Arc::new(Inner {
            timer: Mutex::new(SessionTimer::new(config)),
            clock,
            session,
            wake: Notify::new(),
            state_tx,
            events_tx,
            cancel: CancellationToken::new(),
        });

        tokio::spawn(run(inner.clone(), auth_rx));
        Self { inner }
    }

    /// Registers one interaction signal.
    pub fn record_activity(&self, signal: ActivitySignal) -> bool {
        trace!(?signal, "activity");
        self.reset_idle_timer()
    }

    /// Restarts both idle deadlines. Ignored while the warning is visible.
    pub fn reset_idle_timer(&self) -> bool {
        let now = self.inner.clock.now();
        self.inner.timer().record_activity(now)
    }

    /// Dismisses the warning and re-validates the session with the API.
    pub async fn continue_session(&self) -> AuthState {
        let now = self.inner.clock.now();
        self.inner.timer().continue_session(now);
        self.inner.publish();
        self.inner.wake.notify_one();
        debug!("idle warning dismissed");

        self.inner.session.check_auth_status().await
    }

    /// Ends the session immediately, bypassing the countdown.
    pub async fn logout_now(&self) {
        let now = self.inner.clock.now();
        let event = self.inner.timer().logout_now(now);
        self.inner.publish();
        self.inner.wake.notify_one();
        self.inner.dispatch(vec![event]).await;
    }

    #[must_use]
    pub fn idle_state(&self) -> IdleState {
        *self.inner.state_tx.borrow()
    }

    /// Receiver updated whenever the warning or countdown changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<IdleState> {
        self.inner.state_tx.subscribe()
    }

    /// Warning, countdown and auto-logout signals as they happen.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<IdleEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Cancels pending timers and stops the task. Idempotent.
    pub fn stop(&self) {
        self.inner.cancel.cancel();
        self.inner.timer().disarm();
        self.inner.publish();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }
}

impl Drop for IdleSupervisor {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

async fn run(inner: Arc<Inner>, mut auth_rx: watch::Receiver<AuthState>) {
    let mut epoch = inner.session.session_epoch();
    let mut authenticated = auth_rx.borrow_and_update().is_authenticated;
    inner.timer().arm(inner.clock.now(), authenticated);

    loop {
        let now = inner.clock.now();
        let events = inner.timer().poll(now, authenticated);
        inner.publish();
        inner.dispatch(events).await;

        let sleep_for = inner
            .timer()
            .next_deadline()
            .map(|deadline| deadline.saturating_sub(inner.clock.now()));
        let sleep = async {
            match sleep_for {
                Some(duration) => tokio::time::sleep(duration).await,
                None => future::pending().await,
            }
        };

        tokio::select! {
            () = inner.cancel.cancelled() => break,
            () = inner.wake.notified() => {}
            changed = auth_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let now_epoch = inner.session.session_epoch();
                let now_authenticated = auth_rx.borrow_and_update().is_authenticated;
                if now_epoch != epoch || now_authenticated != authenticated {
                    epoch = now_epoch;
                    authenticated = now_authenticated;
                    let mut timer = inner.timer();
                    timer.disarm();
                    timer.arm(inner.clock.now(), authenticated);
                    debug!(authenticated, epoch, "idle timer {}", if authenticated { "armed" } else { "disarmed" });
                }
            }
            () = sleep => {}
        }
    }

    debug!("idle supervisor stopped");
}
