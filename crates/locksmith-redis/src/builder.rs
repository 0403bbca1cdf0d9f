//! Connection builder for Redis lock nodes.

use fred::prelude::*;
use locksmith_core::error::{LockError, LockResult};
use tracing::debug;

use crate::node::{DEFAULT_KEY_PREFIX, RedisNode};

/// Builds connected [`RedisNode`]s from URLs or existing clients.
///
/// For RedLock, add several independent servers (ideally 3 or 5).
pub struct RedisNodeBuilder {
    urls: Vec<String>,
    clients: Vec<RedisClient>,
    key_prefix: String,
}

impl RedisNodeBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            urls: vec![],
            clients: vec![],
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    /// Adds a Redis server URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.urls.push(url.into());
        self
    }

    /// Adds multiple Redis server URLs.
    pub fn urls(mut self, urls: &[impl AsRef<str>]) -> Self {
        for url in urls {
            self.urls.push(url.as_ref().to_string());
        }
        self
    }

    /// Uses an existing, already connected Redis client.
    pub fn client(mut self, client: RedisClient) -> Self {
        self.clients.push(client);
        self
    }

    /// Sets the namespace prepended to every lock key.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Connects every URL and returns one node per server, clients first.
    ///
    /// # Errors
    ///
    /// * [`LockError::Configuration`] - no URL or client was supplied, or a
    ///   URL could not be parsed
    /// * [`LockError::BackendUnavailable`] - a server refused the connection
    pub async fn build(self) -> LockResult<Vec<RedisNode>> {
        if self.urls.is_empty() && self.clients.is_empty() {
            return Err(LockError::Configuration(
                "no Redis clients or URLs provided".to_string(),
            ));
        }

        let mut nodes = Vec::with_capacity(self.clients.len() + self.urls.len());
        for (index, client) in self.clients.into_iter().enumerate() {
            nodes.push(
                RedisNode::new(client, format!("redis-client-{index}"))
                    .with_key_prefix(self.key_prefix.clone()),
            );
        }

        for url in self.urls {
            let config = RedisConfig::from_url(&url)
                .map_err(|e| LockError::Configuration(format!("invalid Redis URL '{url}': {e}")))?;

            let client = RedisClient::new(config, None, None, None);
            client.connect();
            client
                .wait_for_connect()
                .await
                .map_err(|e| LockError::unavailable(url.clone(), e))?;
            debug!(url = %url, "connected Redis lock node");

            nodes.push(RedisNode::new(client, url).with_key_prefix(self.key_prefix.clone()));
        }

        Ok(nodes)
    }

    /// Connects exactly one node, for single-store locking.
    pub async fn build_single(self) -> LockResult<RedisNode> {
        let mut nodes = self.build().await?;
        if nodes.len() > 1 {
            return Err(LockError::Configuration(format!(
                "expected one Redis server, got {}",
                nodes.len()
            )));
        }
        nodes
            .pop()
            .ok_or_else(|| LockError::Configuration("no Redis server".to_string()))
    }
}

impl Default for RedisNodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
