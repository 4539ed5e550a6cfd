pub mod auth;
pub mod errors;
pub mod user;

pub use auth::{
    AuthResponse, LoginRequest, LogoutRequest, RefreshRequest, RefreshResponse, RegisterRequest,
};
pub use errors::{ErrorPayload, TOKEN_INVALID_DETAIL, TOKEN_NOT_VALID_DETAIL};
pub use user::{ProfilePatch, UserProfile};
