use reqwest::StatusCode;
use shared::models::ErrorPayload;
use thiserror::Error;

use crate::{refresh::RefreshError, storage::StorageError, transport::TransportError};

/// Failure of a gateway or session call.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("API responded with {status}: {payload}")]
    Api {
        status: StatusCode,
        payload: ErrorPayload,
    },

    #[error("session expired: {0}")]
    Refresh(#[from] RefreshError),

    #[error("credential storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("could not encode the request: {0}")]
    Encode(String),

    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl SessionError {
    /// HTTP status of an API rejection.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Normalizes the failure into a payload fit for user-facing state.
    ///
    /// API rejections keep the server's detail; everything else becomes a
    /// plain message. Empty results fall back to `fallback`.
    #[must_use]
    pub fn into_payload(self, fallback: &str) -> ErrorPayload {
        match self {
            Self::Api { payload, .. } => payload.or_message(fallback),
            Self::Refresh(RefreshError::Rejected(payload)) => payload.or_message(fallback),
            other => ErrorPayload::message(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_error_keeps_payload() {
        let err = SessionError::Api {
            status: StatusCode::BAD_REQUEST,
            payload: ErrorPayload::from_body(&json!({"email": ["Enter a valid email address"]})),
        };

        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(
            err.into_payload("Login failed").field_error("email"),
            Some("Enter a valid email address")
        );
    }

    #[test]
    fn test_empty_api_payload_uses_fallback() {
        let err = SessionError::Api {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            payload: ErrorPayload::Empty,
        };
        assert_eq!(
            err.into_payload("Registration failed"),
            ErrorPayload::message("Registration failed")
        );
    }

    #[test]
    fn test_transport_error_becomes_message() {
        let err = SessionError::from(TransportError::Timeout);
        assert_eq!(err.status(), None);
        assert_eq!(
            err.into_payload("Login failed"),
            ErrorPayload::message("request timed out")
        );
    }
}
