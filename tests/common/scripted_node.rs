//! Quorum node whose answers are scripted per test.

use std::io;
use std::sync::Mutex;
use std::time::Duration;

use locksmith::{LockBackend, LockError, LockResult, Token};

use super::MemoryStore;

/// How a node answers acquisition requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeBehavior {
    /// Behaves like a healthy store.
    Store,
    /// Reports the key as held by someone else.
    Reject,
    /// Fails with a backend error.
    Fail,
    /// Sleeps before behaving like a healthy store.
    Slow(Duration),
}

/// A [`MemoryStore`] wrapped with a scripted behavior and a call journal.
pub struct ScriptedNode {
    name: String,
    behavior: Mutex<NodeBehavior>,
    store: MemoryStore,
    released: Mutex<Vec<(String, Token)>>,
}

impl ScriptedNode {
    pub fn new(name: impl Into<String>, behavior: NodeBehavior) -> Self {
        Self {
            name: name.into(),
            behavior: Mutex::new(behavior),
            store: MemoryStore::new(),
            released: Mutex::new(Vec::new()),
        }
    }

    pub fn set_behavior(&self, behavior: NodeBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn holder(&self, key: &str) -> Option<Token> {
        self.store.holder(key)
    }

    pub fn acquire_calls(&self) -> usize {
        self.store.acquire_calls()
    }

    /// Every release request this node received, in order.
    pub fn releases(&self) -> Vec<(String, Token)> {
        self.released.lock().unwrap().clone()
    }
}

impl LockBackend for ScriptedNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn try_acquire(&self, key: &str, token: &Token, ttl: Duration) -> LockResult<bool> {
        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            NodeBehavior::Store => self.store.try_acquire(key, token, ttl).await,
            NodeBehavior::Reject => Ok(false),
            NodeBehavior::Fail => Err(LockError::unavailable(
                self.name.clone(),
                io::Error::new(io::ErrorKind::ConnectionRefused, "node down"),
            )),
            NodeBehavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                self.store.try_acquire(key, token, ttl).await
            }
        }
    }

    async fn release(&self, key: &str, token: &Token) -> LockResult<bool> {
        self.released
            .lock()
            .unwrap()
            .push((key.to_string(), token.clone()));
        self.store.release(key, token).await
    }
}
