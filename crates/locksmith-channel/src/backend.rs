//! In-process lock registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use locksmith_core::error::LockResult;
use locksmith_core::token::Token;
use locksmith_core::traits::LockBackend;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct Holder {
    token: Token,
    since: Instant,
}

/// Lock registry shared by every clone of the backend.
///
/// The holder's token is recorded, but release does not compare it: callers
/// inside one process are trusted to release only what they acquired. The TTL
/// argument is ignored.
#[derive(Debug, Clone, Default)]
pub struct ChannelBackend {
    holders: Arc<Mutex<HashMap<String, Holder>>>,
}

impl ChannelBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the token currently holding `key`, if any.
    pub fn holder(&self, key: &str) -> Option<Token> {
        self.holders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|holder| holder.token.clone())
    }

    /// Returns how long `key` has been held.
    pub fn held_for(&self, key: &str) -> Option<Duration> {
        self.holders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|holder| holder.since.elapsed())
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.holder(key).is_some()
    }
}

impl LockBackend for ChannelBackend {
    fn name(&self) -> &str {
        "channel"
    }

    fn supports_expiry(&self) -> bool {
        false
    }

    async fn try_acquire(&self, key: &str, token: &Token, _ttl: Duration) -> LockResult<bool> {
        let mut holders = self.holders.lock().unwrap_or_else(PoisonError::into_inner);
        if holders.contains_key(key) {
            return Ok(false);
        }
        holders.insert(
            key.to_string(),
            Holder {
                token: token.clone(),
                since: Instant::now(),
            },
        );
        debug!(lock.key = %key, backend = "channel", "channel lock acquired");
        Ok(true)
    }

    async fn release(&self, key: &str, token: &Token) -> LockResult<bool> {
        let removed = self
            .holders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);

        match removed {
            Some(holder) => {
                if holder.token != *token {
                    debug!(lock.key = %key, "channel lock released by a different token");
                }
                debug!(lock.key = %key, backend = "channel", "channel lock released");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
