//! Core traits for lock backends and retry strategies.

use std::future::Future;
use std::time::Duration;

use crate::error::LockResult;
use crate::token::Token;

// ============================================================================
// Backend Trait
// ============================================================================

/// A medium that can hold an exclusive lock record per key.
///
/// Both operations are non-blocking: waiting is layered on top by the retry
/// loop, and multi-node safety by the quorum coordinator. Implementations must
/// make each operation atomic on their medium.
///
/// # Example
///
/// ```rust,ignore
/// let token = Token::generate();
/// if backend.try_acquire("order:1", &token, Duration::from_secs(30)).await? {
///     // Critical section
///     backend.release("order:1", &token).await?;
/// }
/// ```
pub trait LockBackend: Send + Sync {
    /// Short description used in log events and error messages.
    fn name(&self) -> &str;

    /// Whether records on this backend expire after the TTL passed to
    /// [`try_acquire`](Self::try_acquire). Backends whose locks live until
    /// release or process exit return `false`.
    fn supports_expiry(&self) -> bool {
        true
    }

    /// Attempts to record `token` as the holder of `key`, expiring after `ttl`.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The lock was newly set for this token
    /// * `Ok(false)` - The key is held by a different live token
    /// * `Err(...)` - The backend could not answer
    ///
    /// Backends without expiry (file, in-process) ignore `ttl`.
    fn try_acquire(
        &self,
        key: &str,
        token: &Token,
        ttl: Duration,
    ) -> impl Future<Output = LockResult<bool>> + Send;

    /// Releases `key` if it is still held under `token`.
    ///
    /// Returns whether a lock record was actually removed.
    fn release(&self, key: &str, token: &Token) -> impl Future<Output = LockResult<bool>> + Send;
}

// ============================================================================
// Loop Policy Trait
// ============================================================================

/// Strategy deciding how long the retry loop sleeps between attempts.
///
/// Policies are stateless: the same value can drive any number of concurrent
/// loops. `attempt` is the number of failed attempts so far (starting at 1).
pub trait LoopPolicy: Send + Sync {
    fn delay(&self, attempt: u32) -> Duration;
}

impl<F> LoopPolicy for F
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    fn delay(&self, attempt: u32) -> Duration {
        self(attempt)
    }
}
