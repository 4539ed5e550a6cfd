//! Authenticated request pipeline.
//!
//! Every call goes through [`AuthGateway::execute`], which attaches the
//! stored access token and, on a 401, renews it once through the shared
//! [`RefreshCoordinator`] before replaying the request.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use shared::models::{
    AuthResponse, ErrorPayload, LoginRequest, LogoutRequest, ProfilePatch, RefreshRequest,
    RefreshResponse, RegisterRequest, UserProfile,
};
use std::{fmt, sync::Arc};
use tracing::{error, info, warn};

use crate::{
    audit::{self, AuditAction},
    error::SessionError,
    navigation::{LOGIN_ROUTE, Navigator},
    refresh::{RefreshCoordinator, RefreshError, RefreshOutcome},
    state::{AuthEvent, SessionStore},
    tokens::{TokenPair, TokenStore},
    transport::{ApiRequest, ApiResponse, HttpTransport},
};

pub const LOGIN_PATH: &str = "auth/login/";
pub const REGISTER_PATH: &str = "auth/register/";
pub const LOGOUT_PATH: &str = "auth/logout/";
pub const PROFILE_PATH: &str = "auth/profile/";
pub const REFRESH_PATH: &str = "auth/token/refresh/";

pub struct AuthGateway {
    transport: Arc<dyn HttpTransport>,
    tokens: TokenStore,
    coordinator: RefreshCoordinator,
    navigator: Arc<dyn Navigator>,
    store: SessionStore,
    login_route: String,
}

impl fmt::Debug for AuthGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthGateway")
            .field("tokens", &self.tokens)
            .field("coordinator", &self.coordinator)
            .field("login_route", &self.login_route)
            .finish_non_exhaustive()
    }
}

impl AuthGateway {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        tokens: TokenStore,
        navigator: Arc<dyn Navigator>,
        store: SessionStore,
    ) -> Self {
        Self {
            transport,
            tokens,
            coordinator: RefreshCoordinator::new(),
            navigator,
            store,
            login_route: LOGIN_ROUTE.to_string(),
        }
    }

    /// Overrides the view users are sent to when the session expires.
    #[must_use]
    pub fn with_login_route(mut self, route: impl Into<String>) -> Self {
        self.login_route = route.into();
        self
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    #[must_use]
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Whether an access token is stored. Storage failures count as absent.
    #[must_use]
    pub fn has_access_token(&self) -> bool {
        matches!(self.tokens.access_token(), Ok(Some(_)))
    }

    /// Sends `request` through the authenticated pipeline.
    ///
    /// # Errors
    ///
    /// Non-2xx responses become [`SessionError::Api`]. A failed refresh
    /// surfaces as [`SessionError::Refresh`] after the session is torn down.
    pub async fn execute(&self, mut request: ApiRequest) -> Result<ApiResponse, SessionError> {
        if !request.anonymous && request.bearer.is_none() {
            request.bearer = self.tokens.access_token()?;
        }

        let response = self.transport.send(&request).await?;
        if response.status != StatusCode::UNAUTHORIZED || request.anonymous || request.retried {
            return settle(&request, response);
        }

        request.retried = true;
        let token = self.recover_credential(request.bearer.as_deref()).await?;
        request.bearer = Some(token);

        let replay = self.transport.send(&request).await?;
        settle(&request, replay)
    }

    /// Like [`AuthGateway::execute`], decoding the body as `T`.
    ///
    /// # Errors
    ///
    /// Returns the pipeline error, or [`SessionError::Decode`] for an unexpected body.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<T, SessionError> {
        let response = self.execute(request).await?;
        serde_json::from_value(response.body).map_err(|err| SessionError::Decode(err.to_string()))
    }

    /// # Errors
    ///
    /// Returns the API rejection or the transport failure.
    pub async fn login(&self, credentials: &LoginRequest) -> Result<AuthResponse, SessionError> {
        self.authenticate(LOGIN_PATH, credentials).await
    }

    /// # Errors
    ///
    /// Returns the API rejection or the transport failure.
    pub async fn register(&self, form: &RegisterRequest) -> Result<AuthResponse, SessionError> {
        self.authenticate(REGISTER_PATH, form).await
    }

    async fn authenticate<T: serde::Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<AuthResponse, SessionError> {
        let request = ApiRequest::post(path)
            .with_json(body)
            .map_err(|err| SessionError::Encode(err.to_string()))?
            .anonymous();
        let response: AuthResponse = self.execute_json(request).await?;
        self.tokens
            .store(&TokenPair::new(&response.access, &response.refresh))?;
        Ok(response)
    }

    /// Revokes the refresh token server-side, then drops both tokens locally.
    ///
    /// Never enters the refresh flow. Local tokens are removed even when the
    /// server call fails.
    ///
    /// # Errors
    ///
    /// Returns the server or transport failure, after local cleanup.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let Some(refresh) = self.tokens.refresh_token()? else {
            return Ok(());
        };

        let mut request = ApiRequest::post(LOGOUT_PATH)
            .with_json(&LogoutRequest { refresh })
            .map_err(|err| SessionError::Encode(err.to_string()))?;
        request.retried = true;

        let result = self.execute(request).await.map(|_| ());
        self.tokens.clear()?;
        result
    }

    /// # Errors
    ///
    /// Returns the pipeline error.
    pub async fn get_profile(&self) -> Result<UserProfile, SessionError> {
        self.execute_json(ApiRequest::get(PROFILE_PATH)).await
    }

    /// Sends a partial profile and returns the attributes the server echoed back.
    ///
    /// # Errors
    ///
    /// Returns the pipeline error.
    pub async fn update_profile(&self, patch: &ProfilePatch) -> Result<ProfilePatch, SessionError> {
        let request = ApiRequest::put(PROFILE_PATH)
            .with_json(patch)
            .map_err(|err| SessionError::Encode(err.to_string()))?;
        self.execute_json(request).await
    }

    /// Obtains a fresh access token, sharing any refresh already in flight.
    ///
    /// # Errors
    ///
    /// Returns why the refresh failed. The session has been expired by then.
    pub async fn refresh(&self) -> RefreshOutcome {
        self.coordinator
            .await_or_trigger_refresh(|| self.perform_refresh())
            .await
    }

    /// Token to replay a 401'd request with.
    ///
    /// When another caller already rotated the token since `stale` was sent,
    /// the current token is reused instead of refreshing again.
    async fn recover_credential(&self, stale: Option<&str>) -> Result<String, SessionError> {
        let rotated = || {
            self.tokens
                .access_token()
                .ok()
                .flatten()
                .filter(|current| stale != Some(current.as_str()))
        };
        Ok(self
            .coordinator
            .reuse_or_refresh(rotated, || self.perform_refresh())
            .await?)
    }

    async fn perform_refresh(&self) -> RefreshOutcome {
        let outcome = self.exchange_refresh_token().await;
        match &outcome {
            Ok(_) => info!("access token refreshed"),
            Err(err) => {
                warn!(error = %err, "token refresh failed, ending session");
                self.expire_session();
            }
        }
        outcome
    }

    async fn exchange_refresh_token(&self) -> RefreshOutcome {
        let refresh = self
            .tokens
            .refresh_token()
            .map_err(|err| RefreshError::Storage(err.to_string()))?
            .ok_or(RefreshError::MissingRefreshToken)?;

        let request = ApiRequest::post(REFRESH_PATH)
            .with_json(&RefreshRequest {
                refresh: refresh.clone(),
            })
            .map_err(|err| RefreshError::Decode(err.to_string()))?
            .anonymous();

        let response = self
            .transport
            .send(&request)
            .await
            .map_err(|err| RefreshError::Transport(err.to_string()))?;
        if !response.status.is_success() {
            return Err(RefreshError::Rejected(ErrorPayload::from_body(
                &response.body,
            )));
        }

        let renewed: RefreshResponse = serde_json::from_value(response.body)
            .map_err(|err| RefreshError::Decode(err.to_string()))?;
        let pair = TokenPair {
            access: renewed.access,
            refresh: renewed.refresh.unwrap_or(refresh),
        };
        self.tokens
            .store(&pair)
            .map_err(|err| RefreshError::Storage(err.to_string()))?;
        Ok(pair.access)
    }

    fn expire_session(&self) {
        if let Err(err) = self.tokens.clear_sensitive_data() {
            warn!(error = %err, "failed to clear credentials after refresh failure");
        }
        self.store.apply(AuthEvent::SessionExpired);
        audit::record(AuditAction::SessionExpired, "refresh_failed", None);

        if self.navigator.current_path() != self.login_route {
            self.navigator.redirect(&self.login_route);
        }
    }
}

/// Passes successes through and turns everything else into [`SessionError::Api`].
fn settle(request: &ApiRequest, response: ApiResponse) -> Result<ApiResponse, SessionError> {
    let status = response.status;
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::FORBIDDEN {
        warn!(path = %request.path, "access denied");
    } else if status.is_server_error() {
        error!(path = %request.path, status = status.as_u16(), "server error");
    }

    Err(SessionError::Api {
        status,
        payload: ErrorPayload::from_body(&response.body),
    })
}
