//! Route access decisions derived from [`AuthState`].

use crate::{
    navigation::{DASHBOARD_ROUTE, LOGIN_ROUTE},
    state::{AuthPhase, AuthState},
};

/// Who may see a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    RequiresAuth,
    /// Login and register: signed-in users are sent on.
    GuestOnly,
    Public,
}

/// The requested location, with the originally requested path if the user
/// was redirected here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub from: Option<String>,
}

impl Location {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            from: None,
        }
    }

    #[must_use]
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Auth state is unknown; show a neutral waiting indicator.
    Waiting,
    Redirect { to: String, from: Option<String> },
    /// The stored token was rejected; show a "session expired" notice.
    SessionExpired,
    Render,
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    login_route: String,
    landing_route: String,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new(LOGIN_ROUTE, DASHBOARD_ROUTE)
    }
}

impl RouteGuard {
    pub fn new(login_route: impl Into<String>, landing_route: impl Into<String>) -> Self {
        Self {
            login_route: login_route.into(),
            landing_route: landing_route.into(),
        }
    }

    #[must_use]
    pub fn decide(&self, state: &AuthState, access: RouteAccess, location: &Location) -> GuardDecision {
        match (state.phase(), access) {
            (AuthPhase::Loading, _) => GuardDecision::Waiting,
            (AuthPhase::Unauthenticated, RouteAccess::RequiresAuth) => {
                if state
                    .error
                    .as_ref()
                    .is_some_and(shared::models::ErrorPayload::is_token_invalid)
                {
                    GuardDecision::SessionExpired
                } else {
                    GuardDecision::Redirect {
                        to: self.login_route.clone(),
                        from: Some(location.path.clone()),
                    }
                }
            }
            (AuthPhase::Authenticated, RouteAccess::GuestOnly) => GuardDecision::Redirect {
                to: location
                    .from
                    .clone()
                    .unwrap_or_else(|| self.landing_route.clone()),
                from: None,
            },
            _ => GuardDecision::Render,
        }
    }

    /// Whether the host should run a status check before deciding.
    ///
    /// True when a token is stored but no user is loaded and nothing is in flight.
    #[must_use]
    pub fn needs_revalidation(&self, state: &AuthState, has_token: bool) -> bool {
        has_token && state.user.is_none() && !state.loading
    }
}
