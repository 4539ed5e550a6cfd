#![allow(dead_code)]

// Shared fixtures for the session integration tests
pub mod stub_api;

use session::{AuthGateway, AuthSession, MemoryNavigator, SessionStore, TokenStore};
use std::sync::Arc;

pub use stub_api::StubApi;

/// A session wired to `api`, with in-memory storage and a navigator at `path`.
pub struct Harness {
    pub api: Arc<StubApi>,
    pub session: AuthSession,
    pub tokens: TokenStore,
    pub navigator: Arc<MemoryNavigator>,
}

impl Harness {
    pub fn new(api: StubApi, path: &str) -> Self {
        Self::with_tokens(api, path, TokenStore::in_memory())
    }

    pub fn with_tokens(api: StubApi, path: &str, tokens: TokenStore) -> Self {
        let api = Arc::new(api);
        let navigator = Arc::new(MemoryNavigator::new(path));
        let gateway = AuthGateway::new(
            api.clone(),
            tokens.clone(),
            navigator.clone(),
            SessionStore::new(),
        );

        Self {
            api,
            session: AuthSession::new(Arc::new(gateway)),
            tokens,
            navigator,
        }
    }

    pub fn gateway(&self) -> &AuthGateway {
        self.session.gateway()
    }
}
