//! Authentication state machine and its container.
//!
//! [`AuthState::apply`] is the only way state changes. [`SessionStore`] owns
//! one instance and broadcasts every change, so several isolated sessions can
//! coexist in one process.

use shared::models::{ErrorPayload, ProfilePatch, UserProfile};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tokio::sync::watch;

/// Read model exposed to the host and the route guard.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    pub user: Option<UserProfile>,
    pub is_authenticated: bool,
    /// An auth-determining call is in flight. Guards treat this as unknown.
    pub loading: bool,
    pub error: Option<ErrorPayload>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self::initializing()
    }
}

/// Coarse view of [`AuthState`] for display and guard decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Loading,
    Authenticated,
    Unauthenticated,
}

/// Everything that can move the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    /// Login or register started.
    CredentialsSubmitted,
    CredentialsAccepted(UserProfile),
    CredentialsRejected(ErrorPayload),
    LogoutStarted,
    /// Logout finished, whatever the server said.
    LogoutSettled,
    StatusCheckStarted,
    StatusConfirmed(UserProfile),
    /// Status check failed. The error is intentionally dropped.
    StatusRejected,
    ProfileUpdateStarted,
    ProfileUpdated(ProfilePatch),
    ProfileUpdateFailed(ErrorPayload),
    /// The refresh token was rejected and the session torn down.
    SessionExpired,
    ErrorCleared,
}

impl AuthEvent {
    /// Whether the event begins a new signed-in session.
    fn starts_session(&self) -> bool {
        matches!(self, Self::CredentialsAccepted(_))
    }
}

impl AuthState {
    /// The only initial state: loading, signed out, no user.
    #[must_use]
    pub fn initializing() -> Self {
        Self {
            user: None,
            is_authenticated: false,
            loading: true,
            error: None,
        }
    }

    fn authenticated(user: UserProfile) -> Self {
        Self {
            user: Some(user),
            is_authenticated: true,
            loading: false,
            error: None,
        }
    }

    fn unauthenticated(error: Option<ErrorPayload>) -> Self {
        Self {
            user: None,
            is_authenticated: false,
            loading: false,
            error,
        }
    }

    #[must_use]
    pub fn phase(&self) -> AuthPhase {
        if self.loading {
            AuthPhase::Loading
        } else if self.is_authenticated {
            AuthPhase::Authenticated
        } else {
            AuthPhase::Unauthenticated
        }
    }

    /// Applies one transition.
    pub fn apply(&mut self, event: AuthEvent) {
        match event {
            AuthEvent::CredentialsSubmitted | AuthEvent::ProfileUpdateStarted => {
                self.loading = true;
                self.error = None;
            }
            AuthEvent::LogoutStarted | AuthEvent::StatusCheckStarted => {
                self.loading = true;
            }
            AuthEvent::CredentialsAccepted(user) | AuthEvent::StatusConfirmed(user) => {
                *self = Self::authenticated(user);
            }
            AuthEvent::CredentialsRejected(payload) => {
                *self = Self::unauthenticated(Some(payload));
            }
            AuthEvent::LogoutSettled | AuthEvent::StatusRejected | AuthEvent::SessionExpired => {
                *self = Self::unauthenticated(None);
            }
            AuthEvent::ProfileUpdated(patch) => {
                if let Some(user) = self.user.as_mut() {
                    user.apply(&patch);
                }
                self.loading = false;
            }
            AuthEvent::ProfileUpdateFailed(payload) => {
                self.loading = false;
                self.error = Some(payload);
            }
            AuthEvent::ErrorCleared => {
                self.error = None;
            }
        }
    }
}

/// Injectable container holding one [`AuthState`].
///
/// Clones share the same state. The epoch counts session boundaries and moves
/// on every sign-in and every sign-out, even when the two coalesce into one
/// watch notification.
#[derive(Debug, Clone)]
pub struct SessionStore {
    tx: Arc<watch::Sender<AuthState>>,
    epoch: Arc<AtomicU64>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// A store in the initializing state.
    #[must_use]
    pub fn new() -> Self {
        Self::with_state(AuthState::initializing())
    }

    #[must_use]
    pub fn with_state(state: AuthState) -> Self {
        let (tx, _rx) = watch::channel(state);
        Self {
            tx: Arc::new(tx),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    /// Session boundaries crossed since creation.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Applies `event` and returns the resulting state.
    pub fn apply(&self, event: AuthEvent) -> AuthState {
        tracing::trace!(?event, "auth transition");
        let starts_session = event.starts_session();
        self.tx.send_modify(|state| {
            let was_authenticated = state.is_authenticated;
            state.apply(event);
            if starts_session || was_authenticated != state.is_authenticated {
                self.epoch.fetch_add(1, Ordering::Release);
            }
        });
        self.snapshot()
    }
}
