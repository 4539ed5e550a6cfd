//! Security audit trail.
//!
//! Audit events are ordinary `tracing` events under a dedicated target so a
//! subscriber can route or filter them separately.

/// Target every audit event is emitted under.
pub const AUDIT_TARGET: &str = "storykeep::audit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Login,
    Register,
    Logout,
    AuthCheck,
    SessionExpired,
    IdleLogout,
}

impl AuditAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Register => "register",
            Self::Logout => "logout",
            Self::AuthCheck => "auth_check",
            Self::SessionExpired => "session_expired",
            Self::IdleLogout => "idle_logout",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records one audit event. `user_id` is absent for anonymous outcomes.
pub fn record(action: AuditAction, outcome: &str, user_id: Option<i64>) {
    tracing::info!(
        target: AUDIT_TARGET,
        action = action.as_str(),
        outcome,
        user_id,
        "security audit"
    );
}
