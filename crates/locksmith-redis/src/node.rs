//! Single Redis instance as a lock backend.

use std::time::Duration;

use fred::prelude::*;
use fred::types::CustomCommand;
use locksmith_core::error::{LockError, LockResult};
use locksmith_core::token::Token;
use locksmith_core::traits::LockBackend;
use tracing::instrument;

/// Default namespace prepended to every lock key.
pub const DEFAULT_KEY_PREFIX: &str = "lock:";

/// Lua script deleting the key only while it still holds the caller's token.
const RELEASE_SCRIPT_LUA: &str = r#"
    if redis.call('get', KEYS[1]) == ARGV[1] then
        return redis.call('del', KEYS[1])
    end
    return 0
"#;

/// One Redis server holding lock records as `key -> token` with a PX expiry.
///
/// Used on its own for `redis_lock` and as one quorum member for `red_lock`.
#[derive(Clone)]
pub struct RedisNode {
    client: RedisClient,
    name: String,
    key_prefix: String,
}

impl std::fmt::Debug for RedisNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisNode")
            .field("name", &self.name)
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl RedisNode {
    /// Wraps an already-connected client.
    pub fn new(client: RedisClient, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    /// Replaces the namespace prepended to lock keys.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &RedisClient {
        &self.client
    }

    /// Redis key holding the lock record for `key`.
    pub fn redis_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    fn unavailable(&self, error: RedisError) -> LockError {
        LockError::unavailable(self.name.clone(), error)
    }
}

impl LockBackend for RedisNode {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, token), fields(backend = "redis", node = %self.name))]
    async fn try_acquire(&self, key: &str, token: &Token, ttl: Duration) -> LockResult<bool> {
        let expiry_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1);

        // SET NX returns OK when the key was set, nil when it already exists
        let result: Option<String> = self
            .client
            .set(
                self.redis_key(key),
                token.as_str(),
                Some(Expiration::PX(expiry_millis)),
                Some(SetOptions::NX),
                false,
            )
            .await
            .map_err(|e| self.unavailable(e))?;

        Ok(result.is_some())
    }

    #[instrument(skip(self, token), fields(backend = "redis", node = %self.name))]
    async fn release(&self, key: &str, token: &Token) -> LockResult<bool> {
        let args: Vec<RedisValue> = vec![
            RELEASE_SCRIPT_LUA.into(),
            1_i64.into(), // numkeys
            self.redis_key(key).into(),
            token.as_str().into(),
        ];

        let cmd = CustomCommand::new_static("EVAL", None, false);
        let deleted: i64 = self
            .client
            .custom(cmd, args)
            .await
            .map_err(|e| self.unavailable(e))?;

        Ok(deleted == 1)
    }
}
