use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};
use session::{ApiRequest, ApiResponse, HttpTransport, Method, TransportError};
use shared::models::{TOKEN_INVALID_DETAIL, TOKEN_NOT_VALID_DETAIL};
use std::{
    collections::HashSet,
    sync::{Mutex, PoisonError},
    time::Duration,
};

pub const EMAIL: &str = "test@example.com";
pub const PASSWORD: &str = "password123";

#[derive(Debug)]
struct StubState {
    valid_access: HashSet<String>,
    refresh_calls: usize,
    issued: usize,
    profile: Value,
    requests: Vec<(Method, String)>,
}

/// In-process stand-in for the StoryKeep API.
///
/// Logging in with [`EMAIL`]/[`PASSWORD`] yields tokens `A`/`R`; refreshing
/// with `R` issues `A1`, `A2`, ... Only issued access tokens are accepted.
#[derive(Debug)]
pub struct StubApi {
    state: Mutex<StubState>,
    refresh_delay: Duration,
    refresh_fails: bool,
}

impl Default for StubApi {
    fn default() -> Self {
        Self::new()
    }
}

impl StubApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StubState {
                valid_access: HashSet::new(),
                refresh_calls: 0,
                issued: 0,
                profile: json!({"id": 1, "email": EMAIL, "username": "tester"}),
                requests: Vec::new(),
            }),
            refresh_delay: Duration::ZERO,
            refresh_fails: false,
        }
    }

    /// Keeps the refresh call in flight for `delay`.
    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    /// Rejects every refresh token.
    pub fn failing_refresh(mut self) -> Self {
        self.refresh_fails = true;
        self
    }

    /// Treats `token` as a currently valid access token.
    pub fn accept(&self, token: &str) {
        self.lock().valid_access.insert(token.to_string());
    }

    /// Invalidates every issued access token.
    pub fn expire_access_tokens(&self) {
        self.lock().valid_access.clear();
    }

    pub fn refresh_calls(&self) -> usize {
        self.lock().refresh_calls
    }

    pub fn requests_to(&self, path: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|(_, requested)| requested == path)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn authorized(&self, request: &ApiRequest) -> bool {
        request
            .bearer
            .as_ref()
            .is_some_and(|token| self.lock().valid_access.contains(token))
    }

    fn issue_pair(&self, user: Value) -> ApiResponse {
        self.accept("A");
        ApiResponse::new(
            StatusCode::OK,
            json!({"access": "A", "refresh": "R", "user": user}),
        )
    }

    async fn refresh(&self, request: &ApiRequest) -> ApiResponse {
        self.lock().refresh_calls += 1;
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }

        let presented = request
            .body
            .as_ref()
            .and_then(|body| body.get("refresh"))
            .and_then(Value::as_str);
        if self.refresh_fails || presented != Some("R") {
            return ApiResponse::new(
                StatusCode::UNAUTHORIZED,
                json!({"detail": TOKEN_INVALID_DETAIL, "code": "token_not_valid"}),
            );
        }

        let access = {
            let mut state = self.lock();
            state.issued += 1;
            let access = format!("A{}", state.issued);
            state.valid_access.insert(access.clone());
            access
        };
        ApiResponse::new(StatusCode::OK, json!({"access": access}))
    }
}

fn unauthorized() -> ApiResponse {
    ApiResponse::new(
        StatusCode::UNAUTHORIZED,
        json!({"detail": TOKEN_NOT_VALID_DETAIL, "code": "token_not_valid"}),
    )
}

#[async_trait]
impl HttpTransport for StubApi {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.lock()
            .requests
            .push((request.method, request.path.clone()));

        let response = match (request.method, request.path.as_str()) {
            (Method::Post, "auth/login/") => {
                let body = request.body.clone().unwrap_or_default();
                if body["email"] == EMAIL && body["password"] == PASSWORD {
                    self.issue_pair(json!({"id": 1}))
                } else {
                    ApiResponse::new(
                        StatusCode::UNAUTHORIZED,
                        json!({"non_field_errors": ["Invalid email or password"]}),
                    )
                }
            }
            (Method::Post, "auth/register/") => {
                let body = request.body.clone().unwrap_or_default();
                if body["password"] == body["password_confirm"] {
                    self.issue_pair(json!({
                        "id": 2,
                        "email": body["email"],
                        "username": body["username"],
                    }))
                } else {
                    ApiResponse::new(
                        StatusCode::BAD_REQUEST,
                        json!({"password_confirm": ["Passwords do not match"]}),
                    )
                }
            }
            (Method::Post, "auth/token/refresh/") => self.refresh(request).await,
            (Method::Post, "auth/logout/") => ApiResponse::new(StatusCode::OK, Value::Null),
            (Method::Get, "auth/profile/") if self.authorized(request) => {
                ApiResponse::new(StatusCode::OK, self.lock().profile.clone())
            }
            (Method::Put, "auth/profile/") if self.authorized(request) => {
                let mut state = self.lock();
                if let (Some(profile), Some(Value::Object(patch))) =
                    (state.profile.as_object_mut(), request.body.as_ref())
                {
                    for (key, value) in patch {
                        profile.insert(key.clone(), value.clone());
                    }
                }
                ApiResponse::new(StatusCode::OK, state.profile.clone())
            }
            (Method::Get, "entries/") if self.authorized(request) => {
                ApiResponse::new(StatusCode::OK, json!([]))
            }
            _ => unauthorized(),
        };

        Ok(response)
    }
}
