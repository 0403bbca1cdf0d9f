//! In-memory stand-in for a Redis store.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use locksmith::{LockBackend, LockResult, Token};
use tokio::time::Instant;

struct Record {
    token: Token,
    expires_at: Instant,
}

/// Set-if-absent with expiry and compare-and-delete release, like the Redis
/// node, kept in a map.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, Record>>,
    acquire_calls: AtomicUsize,
    release_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live holder of `key`, if any.
    pub fn holder(&self, key: &str) -> Option<Token> {
        let records = self.records.lock().unwrap();
        records
            .get(key)
            .filter(|record| record.expires_at > Instant::now())
            .map(|record| record.token.clone())
    }

    /// Writes a record directly, as another client would.
    pub fn insert(&self, key: &str, token: &Token, ttl: Duration) {
        self.records.lock().unwrap().insert(
            key.to_string(),
            Record {
                token: token.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn acquire_calls(&self) -> usize {
        self.acquire_calls.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }
}

impl LockBackend for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn try_acquire(&self, key: &str, token: &Token, ttl: Duration) -> LockResult<bool> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        let now = Instant::now();
        let mut records = self.records.lock().unwrap();
        if records.get(key).is_some_and(|record| record.expires_at > now) {
            return Ok(false);
        }
        records.insert(
            key.to_string(),
            Record {
                token: token.clone(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn release(&self, key: &str, token: &Token) -> LockResult<bool> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.lock().unwrap();
        let owned = records
            .get(key)
            .is_some_and(|record| record.token == *token && record.expires_at > Instant::now());
        Ok(owned && records.remove(key).is_some())
    }
}
