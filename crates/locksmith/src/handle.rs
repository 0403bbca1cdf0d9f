//! Scoped ownership of an acquired lock.

use std::sync::Arc;
use std::time::Duration;

use locksmith_core::error::LockResult;
use locksmith_core::token::Token;
use locksmith_core::traits::LockBackend;
use locksmith_redis::redlock::release_redlock;
use tokio::time::Instant;
use tracing::{debug, warn};

enum Holding<B> {
    Single(Arc<B>),
    Quorum {
        nodes: Arc<[Arc<B>]>,
        node_timeout: Duration,
    },
}

/// A held lock: key, token, the backend(s) holding it and when it was taken.
///
/// Call [`release`](Self::release) when done. A handle dropped without
/// release (panic, cancelled future) schedules a best-effort release on the
/// current tokio runtime; store records not released that way expire after
/// their TTL.
pub struct LockHandle<B: LockBackend + 'static> {
    key: String,
    token: Token,
    holding: Option<Holding<B>>,
    acquired_at: Instant,
    validity: Option<Duration>,
}

impl<B: LockBackend + 'static> LockHandle<B> {
    pub(crate) fn single(
        backend: Arc<B>,
        key: String,
        token: Token,
        acquired_at: Instant,
        validity: Option<Duration>,
    ) -> Self {
        Self {
            key,
            token,
            holding: Some(Holding::Single(backend)),
            acquired_at,
            validity,
        }
    }

    pub(crate) fn quorum(
        nodes: Arc<[Arc<B>]>,
        node_timeout: Duration,
        key: String,
        token: Token,
        validity: Duration,
    ) -> Self {
        Self {
            key,
            token,
            holding: Some(Holding::Quorum {
                nodes,
                node_timeout,
            }),
            acquired_at: Instant::now(),
            validity: Some(validity),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn acquired_at(&self) -> Instant {
        self.acquired_at
    }

    /// How long after [`acquired_at`](Self::acquired_at) the lock can be
    /// trusted. `None` for backends whose locks do not expire.
    ///
    /// For quorum locks this is the RedLock validity window, not the TTL:
    /// work running past it may overlap with the next holder.
    pub fn validity(&self) -> Option<Duration> {
        self.validity
    }

    /// Whether the validity window has passed.
    pub fn is_expired(&self) -> bool {
        self.validity
            .is_some_and(|validity| self.acquired_at.elapsed() > validity)
    }

    /// Releases the lock.
    ///
    /// Returns `Ok(false)` when the backend no longer held our token (for
    /// store locks: the record expired, and maybe belongs to someone else now).
    pub async fn release(mut self) -> LockResult<bool> {
        match self.holding.take() {
            Some(holding) => release_holding(holding, &self.key, &self.token).await,
            None => Ok(false),
        }
    }
}

async fn release_holding<B: LockBackend + 'static>(
    holding: Holding<B>,
    key: &str,
    token: &Token,
) -> LockResult<bool> {
    match holding {
        Holding::Single(backend) => backend.release(key, token).await,
        Holding::Quorum {
            nodes,
            node_timeout,
        } => release_redlock(&nodes, key, token, node_timeout)
            .await
            .into_result(key)
            .map(|released| released > 0),
    }
}

impl<B: LockBackend + 'static> Drop for LockHandle<B> {
    fn drop(&mut self) {
        let Some(holding) = self.holding.take() else {
            return;
        };

        let key = std::mem::take(&mut self.key);
        let token = self.token.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(lock.key = %key, "lock handle dropped while held, releasing in background");
                runtime.spawn(async move {
                    if let Err(e) = release_holding(holding, &key, &token).await {
                        warn!(lock.key = %key, error = %e, "background lock release failed");
                    }
                });
            }
            Err(_) => {
                warn!(lock.key = %key, "lock handle dropped outside a tokio runtime, lock not released");
            }
        }
    }
}
