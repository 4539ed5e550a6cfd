//! Auth actions driving the state machine from gateway outcomes.

use shared::models::{ErrorPayload, LoginRequest, ProfilePatch, RegisterRequest, UserProfile};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    audit::{self, AuditAction},
    gateway::AuthGateway,
    state::{AuthEvent, AuthState, SessionStore},
};

const LOGIN_FAILED: &str = "Login failed";
const REGISTRATION_FAILED: &str = "Registration failed";
const PROFILE_UPDATE_FAILED: &str = "Profile update failed";

/// The verbs hosts call: login, register, logout, status check, profile update.
///
/// Every failure is normalized into an [`ErrorPayload`] before it reaches
/// [`AuthState`]; raw transport errors never do.
#[derive(Debug, Clone)]
pub struct AuthSession {
    gateway: Arc<AuthGateway>,
}

impl AuthSession {
    #[must_use]
    pub fn new(gateway: Arc<AuthGateway>) -> Self {
        Self { gateway }
    }

    #[must_use]
    pub fn gateway(&self) -> &Arc<AuthGateway> {
        &self.gateway
    }

    fn store(&self) -> &SessionStore {
        self.gateway.store()
    }

    #[must_use]
    pub fn state(&self) -> AuthState {
        self.store().snapshot()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.store().subscribe()
    }

    /// Sign-ins and sign-outs seen so far. See [`SessionStore::epoch`].
    #[must_use]
    pub fn session_epoch(&self) -> u64 {
        self.store().epoch()
    }

    /// # Errors
    ///
    /// Returns the normalized payload, which is also stored in state.
    pub async fn login(&self, credentials: &LoginRequest) -> Result<UserProfile, ErrorPayload> {
        self.store().apply(AuthEvent::CredentialsSubmitted);
        match self.gateway.login(credentials).await {
            Ok(response) => {
                audit::record(AuditAction::Login, "success", Some(response.user.id));
                info!(user_id = response.user.id, "signed in");
                self.store()
                    .apply(AuthEvent::CredentialsAccepted(response.user.clone()));
                Ok(response.user)
            }
            Err(err) => {
                audit::record(AuditAction::Login, "failure", None);
                let payload = err.into_payload(LOGIN_FAILED);
                self.store()
                    .apply(AuthEvent::CredentialsRejected(payload.clone()));
                Err(payload)
            }
        }
    }

    /// # Errors
    ///
    /// Returns the normalized payload, which is also stored in state.
    pub async fn register(&self, form: &RegisterRequest) -> Result<UserProfile, ErrorPayload> {
        self.store().apply(AuthEvent::CredentialsSubmitted);
        match self.gateway.register(form).await {
            Ok(response) => {
                audit::record(AuditAction::Register, "success", Some(response.user.id));
                info!(user_id = response.user.id, "registered");
                self.store()
                    .apply(AuthEvent::CredentialsAccepted(response.user.clone()));
                Ok(response.user)
            }
            Err(err) => {
                audit::record(AuditAction::Register, "failure", None);
                let payload = err.into_payload(REGISTRATION_FAILED);
                self.store()
                    .apply(AuthEvent::CredentialsRejected(payload.clone()));
                Err(payload)
            }
        }
    }

    /// Ends the session. Local teardown happens whatever the server says.
    pub async fn logout(&self) {
        let user_id = self.state().user.map(|user| user.id);
        self.store().apply(AuthEvent::LogoutStarted);

        if let Err(err) = self.gateway.logout().await {
            warn!(error = %err, "logout request failed, clearing local session anyway");
        }
        if let Err(err) = self.gateway.tokens().clear_sensitive_data() {
            warn!(error = %err, "failed to clear local credentials");
        }

        audit::record(AuditAction::Logout, "success", user_id);
        self.store().apply(AuthEvent::LogoutSettled);
    }

    /// Re-validates the stored token by fetching the profile.
    ///
    /// Never fails: without a token, or on any error, the session ends up
    /// unauthenticated with no error recorded.
    pub async fn check_auth_status(&self) -> AuthState {
        self.store().apply(AuthEvent::StatusCheckStarted);

        if !self.gateway.has_access_token() {
            debug!("no stored access token");
            return self.reject_status();
        }

        match self.gateway.get_profile().await {
            Ok(user) => {
                audit::record(AuditAction::AuthCheck, "success", Some(user.id));
                self.store().apply(AuthEvent::StatusConfirmed(user))
            }
            Err(err) => {
                debug!(error = %err, "auth status check failed");
                audit::record(AuditAction::AuthCheck, "failure", None);
                self.reject_status()
            }
        }
    }

    fn reject_status(&self) -> AuthState {
        if let Err(err) = self.gateway.tokens().clear_sensitive_data() {
            warn!(error = %err, "failed to clear local credentials");
        }
        self.store().apply(AuthEvent::StatusRejected)
    }

    /// # Errors
    ///
    /// Returns the normalized payload, which is also stored in state.
    pub async fn update_profile(&self, patch: &ProfilePatch) -> Result<AuthState, ErrorPayload> {
        self.store().apply(AuthEvent::ProfileUpdateStarted);
        match self.gateway.update_profile(patch).await {
            Ok(updated) => Ok(self.store().apply(AuthEvent::ProfileUpdated(updated))),
            Err(err) => {
                let payload = err.into_payload(PROFILE_UPDATE_FAILED);
                self.store()
                    .apply(AuthEvent::ProfileUpdateFailed(payload.clone()));
                Err(payload)
            }
        }
    }

    pub fn clear_error(&self) {
        self.store().apply(AuthEvent::ErrorCleared);
    }
}
