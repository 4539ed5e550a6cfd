//! Access and refresh token persistence.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use std::{fmt, sync::Arc};

use crate::storage::{KeyValueStore, MemoryStore, StorageError};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Tokens closer than this to expiry are treated as expiring.
pub const DEFAULT_EXPIRY_BUFFER: TimeDelta = TimeDelta::minutes(5);

/// An access token together with the refresh token that renews it.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

impl TokenPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

/// Token persistence over a durable store plus a session-scoped store.
///
/// The pair is always written and removed in one storage operation.
#[derive(Debug, Clone)]
pub struct TokenStore {
    durable: Arc<dyn KeyValueStore>,
    session_scoped: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    pub fn new(durable: Arc<dyn KeyValueStore>, session_scoped: Arc<dyn KeyValueStore>) -> Self {
        Self {
            durable,
            session_scoped,
        }
    }

    /// Store backed entirely by memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    #[must_use]
    pub fn session_scoped(&self) -> &Arc<dyn KeyValueStore> {
        &self.session_scoped
    }

    /// # Errors
    ///
    /// Returns an error when the durable store cannot be read.
    pub fn access_token(&self) -> Result<Option<String>, StorageError> {
        self.durable.get(ACCESS_TOKEN_KEY)
    }

    /// # Errors
    ///
    /// Returns an error when the durable store cannot be read.
    pub fn refresh_token(&self) -> Result<Option<String>, StorageError> {
        self.durable.get(REFRESH_TOKEN_KEY)
    }

    /// The stored pair, if both halves are present.
    ///
    /// # Errors
    ///
    /// Returns an error when the durable store cannot be read.
    pub fn load(&self) -> Result<Option<TokenPair>, StorageError> {
        let access = self.access_token()?;
        let refresh = self.refresh_token()?;
        Ok(access
            .zip(refresh)
            .map(|(access, refresh)| TokenPair { access, refresh }))
    }

    /// # Errors
    ///
    /// Returns an error when the pair cannot be persisted.
    pub fn store(&self, pair: &TokenPair) -> Result<(), StorageError> {
        self.durable.set_many(&[
            (ACCESS_TOKEN_KEY, pair.access.as_str()),
            (REFRESH_TOKEN_KEY, pair.refresh.as_str()),
        ])
    }

    /// Removes both tokens.
    ///
    /// # Errors
    ///
    /// Returns an error when the removal cannot be persisted.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.durable
            .remove_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY])
    }

    /// Removes both tokens and every session-scoped entry.
    ///
    /// Both stores are always attempted; the first failure is returned.
    ///
    /// # Errors
    ///
    /// Returns an error when either store fails to clear.
    pub fn clear_sensitive_data(&self) -> Result<(), StorageError> {
        let tokens = self.clear();
        let session = self.session_scoped.clear();
        tokens.and(session)
    }
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<i64>,
}

/// Expiry instant encoded in a JWT's `exp` claim.
///
/// The signature is not verified; this only reads the payload.
#[must_use]
pub fn token_expiration(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&decoded).ok()?;
    DateTime::from_timestamp(claims.exp?, 0)
}

/// Whether `token` expires within `buffer` of `now`.
///
/// Tokens that cannot be decoded count as expiring.
#[must_use]
pub fn is_token_expiring_soon(token: &str, buffer: TimeDelta, now: DateTime<Utc>) -> bool {
    token_expiration(token).is_none_or(|expires_at| expires_at - buffer <= now)
}

#[cfg(test)]
pub(crate) fn encode_test_token(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp},"user_id":1}}"#));
    format!("{header}.{payload}.signature")
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_store_and_load_pair() {
        let tokens = TokenStore::in_memory();
        assert_eq!(tokens.load().unwrap(), None);

        tokens.store(&TokenPair::new("A", "R")).unwrap();
        assert_eq!(tokens.access_token().unwrap().as_deref(), Some("A"));
        assert_eq!(tokens.refresh_token().unwrap().as_deref(), Some("R"));
        assert_eq!(tokens.load().unwrap(), Some(TokenPair::new("A", "R")));
    }

    #[test]
    fn test_clear_sensitive_data_clears_session_scope() {
        let tokens = TokenStore::in_memory();
        tokens.store(&TokenPair::new("A", "R")).unwrap();
        tokens
            .session_scoped()
            .set_many(&[("draft_story", "text")])
            .unwrap();

        tokens.clear_sensitive_data().unwrap();

        assert_eq!(tokens.access_token().unwrap(), None);
        assert_eq!(tokens.refresh_token().unwrap(), None);
        assert_eq!(tokens.session_scoped().get("draft_story").unwrap(), None);
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let rendered = format!("{:?}", TokenPair::new("secret-access", "secret-refresh"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_token_expiration_reads_exp_claim() {
        let token = encode_test_token(1_700_000_000);
        assert_eq!(
            token_expiration(&token),
            DateTime::from_timestamp(1_700_000_000, 0)
        );
    }

    #[test_case("" ; "empty")]
    #[test_case("not-a-jwt" ; "single segment")]
    #[test_case("a.!!!.c" ; "bad base64")]
    #[test_case("a.e30.c" ; "no exp claim")]
    fn test_malformed_tokens_are_expiring(token: &str) {
        assert_eq!(token_expiration(token), None);
        assert!(is_token_expiring_soon(token, DEFAULT_EXPIRY_BUFFER, Utc::now()));
    }

    #[test]
    fn test_expiring_soon_respects_buffer() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let in_ten_minutes = encode_test_token(1_700_000_600);
        let in_two_minutes = encode_test_token(1_700_000_120);

        assert!(!is_token_expiring_soon(&in_ten_minutes, DEFAULT_EXPIRY_BUFFER, now));
        assert!(is_token_expiring_soon(&in_two_minutes, DEFAULT_EXPIRY_BUFFER, now));
    }
}
