//! Single-flight coordination of access token refreshes.
//!
//! The first caller to need a refresh becomes the leader and performs it.
//! Callers arriving while it runs queue up and receive the leader's outcome
//! in arrival order. The queue exists only while a refresh is in flight.

use shared::models::ErrorPayload;
use std::{
    future::Future,
    mem,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};
use thiserror::Error;
use tokio::sync::oneshot;

/// Why a refresh attempt failed. Cloned to every waiter.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RefreshError {
    #[error("no refresh token is stored")]
    MissingRefreshToken,

    #[error("refresh rejected: {0}")]
    Rejected(ErrorPayload),

    #[error("refresh request failed: {0}")]
    Transport(String),

    #[error("could not persist refreshed tokens: {0}")]
    Storage(String),

    #[error("refresh response was malformed: {0}")]
    Decode(String),

    #[error("refresh was abandoned before completing")]
    Abandoned,
}

/// The new access token, or why none could be obtained.
pub type RefreshOutcome = Result<String, RefreshError>;

type Waiter = oneshot::Sender<RefreshOutcome>;

#[derive(Debug, Default)]
enum RefreshState {
    #[default]
    Idle,
    Refreshing(Vec<Waiter>),
}

enum Role {
    Leader,
    Follower(oneshot::Receiver<RefreshOutcome>),
    Settled(String),
}

#[derive(Debug, Default)]
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    refreshes: AtomicU64,
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock(), RefreshState::Refreshing(_))
    }

    /// Callers currently queued behind the leader.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        match &*self.lock() {
            RefreshState::Idle => 0,
            RefreshState::Refreshing(waiters) => waiters.len(),
        }
    }

    /// Refreshes started since creation.
    #[must_use]
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    /// Joins the refresh in flight, or runs `refresh` as the leader.
    ///
    /// `refresh` is only invoked when no other refresh is running. Its outcome
    /// is delivered to every queued caller before this returns.
    pub async fn await_or_trigger_refresh<F, Fut>(&self, refresh: F) -> RefreshOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RefreshOutcome>,
    {
        self.reuse_or_refresh(|| None, refresh).await
    }

    /// Like [`RefreshCoordinator::await_or_trigger_refresh`], but when no
    /// refresh is in flight `reuse` is asked first for a token that already
    /// supersedes the caller's.
    ///
    /// `reuse` runs under the coordinator's lock, so a leader finishing
    /// concurrently is either joined or already visible to it.
    pub async fn reuse_or_refresh<R, F, Fut>(&self, reuse: R, refresh: F) -> RefreshOutcome
    where
        R: FnOnce() -> Option<String>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = RefreshOutcome>,
    {
        match self.join(reuse) {
            Role::Settled(token) => Ok(token),
            Role::Follower(receiver) => receiver.await.unwrap_or(Err(RefreshError::Abandoned)),
            Role::Leader => {
                self.refreshes.fetch_add(1, Ordering::Relaxed);
                let guard = LeaderGuard {
                    coordinator: self,
                    settled: false,
                };
                let outcome = refresh().await;
                guard.settle(&outcome);
                outcome
            }
        }
    }

    fn join(&self, reuse: impl FnOnce() -> Option<String>) -> Role {
        let mut state = self.lock();
        match &mut *state {
            RefreshState::Refreshing(waiters) => {
                let (sender, receiver) = oneshot::channel();
                waiters.push(sender);
                Role::Follower(receiver)
            }
            RefreshState::Idle => {
                if let Some(token) = reuse() {
                    return Role::Settled(token);
                }
                *state = RefreshState::Refreshing(Vec::new());
                Role::Leader
            }
        }
    }

    fn drain(&self) -> Vec<Waiter> {
        match mem::take(&mut *self.lock()) {
            RefreshState::Idle => Vec::new(),
            RefreshState::Refreshing(waiters) => waiters,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns the coordinator to idle even if the leader's future is dropped.
struct LeaderGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl LeaderGuard<'_> {
    fn settle(mut self, outcome: &RefreshOutcome) {
        self.settled = true;
        let waiters = self.coordinator.drain();
        if waiters.is_empty() {
            return;
        }
        tracing::debug!(waiters = waiters.len(), succeeded = outcome.is_ok(), "releasing refresh waiters");
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let waiters = self.coordinator.drain();
        if !waiters.is_empty() {
            tracing::warn!(waiters = waiters.len(), "token refresh abandoned");
        }
        for waiter in waiters {
            let _ = waiter.send(Err(RefreshError::Abandoned));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, time::Duration};
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_leader_runs_refresh() {
        let coordinator = RefreshCoordinator::new();

        let outcome = coordinator
            .await_or_trigger_refresh(|| async { Ok("A2".to_string()) })
            .await;

        assert_eq!(outcome, Ok("A2".to_string()));
        assert_eq!(coordinator.refresh_count(), 1);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_followers_share_one_refresh() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let release = Arc::new(Notify::new());

        let leader = {
            let coordinator = coordinator.clone();
            let release = release.clone();
            tokio::spawn(async move {
                coordinator
                    .await_or_trigger_refresh(|| async move {
                        release.notified().await;
                        Ok("A2".to_string())
                    })
                    .await
            })
        };

        while !coordinator.is_refreshing() {
            tokio::task::yield_now().await;
        }

        let followers: Vec<_> = (0..3)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    coordinator
                        .await_or_trigger_refresh(|| async { Ok("unexpected".to_string()) })
                        .await
                })
            })
            .collect();

        while coordinator.waiter_count() < 3 {
            tokio::task::yield_now().await;
        }
        release.notify_one();

        assert_eq!(leader.await.unwrap(), Ok("A2".to_string()));
        for follower in followers {
            assert_eq!(follower.await.unwrap(), Ok("A2".to_string()));
        }
        assert_eq!(coordinator.refresh_count(), 1);
        assert_eq!(coordinator.waiter_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_rejects_every_waiter() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let release = Arc::new(Notify::new());

        let leader = {
            let coordinator = coordinator.clone();
            let release = release.clone();
            tokio::spawn(async move {
                coordinator
                    .await_or_trigger_refresh(|| async move {
                        release.notified().await;
                        Err(RefreshError::MissingRefreshToken)
                    })
                    .await
            })
        };
        while !coordinator.is_refreshing() {
            tokio::task::yield_now().await;
        }

        let follower = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .await_or_trigger_refresh(|| async { Ok("unexpected".to_string()) })
                    .await
            })
        };
        while coordinator.waiter_count() < 1 {
            tokio::task::yield_now().await;
        }
        release.notify_one();

        assert_eq!(leader.await.unwrap(), Err(RefreshError::MissingRefreshToken));
        assert_eq!(follower.await.unwrap(), Err(RefreshError::MissingRefreshToken));
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_superseding_token_skips_refresh() {
        let coordinator = RefreshCoordinator::new();
        coordinator
            .await_or_trigger_refresh(|| async { Ok("A2".to_string()) })
            .await
            .unwrap();

        let outcome = coordinator
            .reuse_or_refresh(
                || Some("A2".to_string()),
                || async { Ok("unexpected".to_string()) },
            )
            .await;

        assert_eq!(outcome, Ok("A2".to_string()));
        assert_eq!(coordinator.refresh_count(), 1);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_in_flight_refresh_is_joined_before_reuse() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let release = Arc::new(Notify::new());

        let leader = {
            let coordinator = coordinator.clone();
            let release = release.clone();
            tokio::spawn(async move {
                coordinator
                    .await_or_trigger_refresh(|| async move {
                        release.notified().await;
                        Ok("A2".to_string())
                    })
                    .await
            })
        };
        while !coordinator.is_refreshing() {
            tokio::task::yield_now().await;
        }

        let follower = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .reuse_or_refresh(
                        || Some("A1".to_string()),
                        || async { Ok("unexpected".to_string()) },
                    )
                    .await
            })
        };
        while coordinator.waiter_count() < 1 {
            tokio::task::yield_now().await;
        }
        release.notify_one();

        assert_eq!(leader.await.unwrap(), Ok("A2".to_string()));
        assert_eq!(follower.await.unwrap(), Ok("A2".to_string()));
        assert_eq!(coordinator.refresh_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_leader_abandons_waiters() {
        let coordinator = Arc::new(RefreshCoordinator::new());

        let leader = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .await_or_trigger_refresh(|| async {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Ok("never".to_string())
                    })
                    .await
            })
        };
        while !coordinator.is_refreshing() {
            tokio::task::yield_now().await;
        }

        let follower = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .await_or_trigger_refresh(|| async { Ok("unexpected".to_string()) })
                    .await
            })
        };
        while coordinator.waiter_count() < 1 {
            tokio::task::yield_now().await;
        }

        leader.abort();
        assert_eq!(follower.await.unwrap(), Err(RefreshError::Abandoned));
        assert!(!coordinator.is_refreshing());

        let outcome = coordinator
            .await_or_trigger_refresh(|| async { Ok("A3".to_string()) })
            .await;
        assert_eq!(outcome, Ok("A3".to_string()));
    }
}
