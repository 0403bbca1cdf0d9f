//! The mutex facade.

use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use locksmith_channel::ChannelBackend;
use locksmith_core::error::{LockError, LockResult};
use locksmith_core::retry::with_retry;
use locksmith_core::timeout::TimeoutValue;
use locksmith_core::token::Token;
use locksmith_core::traits::{LockBackend, LoopPolicy};
use locksmith_file::FileBackend;
use locksmith_redis::RedisNode;
use locksmith_redis::redlock::{QuorumResult, acquire_redlock};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::handle::LockHandle;
use crate::options::LockerOptions;

/// Builder for [`Locker`].
///
/// Backends are handed over explicitly; a flavor whose backend was not
/// configured fails with [`LockError::Configuration`] when called.
#[derive(Default)]
pub struct LockerBuilder {
    options: LockerOptions,
    file: Option<FileBackend>,
    file_directory: Option<PathBuf>,
    channel: Option<ChannelBackend>,
    redis: Option<RedisNode>,
    quorum: Vec<RedisNode>,
    cancel: Option<watch::Receiver<bool>>,
}

impl LockerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(mut self, options: LockerOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the expiry of store lock records.
    pub fn ttl(mut self, ttl: std::time::Duration) -> Self {
        self.options.ttl = ttl;
        self
    }

    /// Sets the delay strategy between acquisition attempts.
    pub fn loop_policy(mut self, policy: impl LoopPolicy + 'static) -> Self {
        self.options.loop_policy = Arc::new(policy);
        self
    }

    /// Uses an existing file backend for `flock`.
    pub fn file(mut self, backend: FileBackend) -> Self {
        self.file = Some(backend);
        self
    }

    /// Creates a file backend in `directory` for `flock` at build time.
    pub fn file_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.file_directory = Some(directory.into());
        self
    }

    /// Shares an in-process registry for `channel_lock`. Without one, each
    /// locker gets its own registry.
    pub fn channel(mut self, backend: ChannelBackend) -> Self {
        self.channel = Some(backend);
        self
    }

    /// Sets the store used by `redis_lock`.
    pub fn redis(mut self, node: RedisNode) -> Self {
        self.redis = Some(node);
        self
    }

    /// Adds one independent node for `red_lock`.
    pub fn quorum_node(mut self, node: RedisNode) -> Self {
        self.quorum.push(node);
        self
    }

    /// Adds independent nodes for `red_lock`.
    pub fn quorum_nodes(mut self, nodes: impl IntoIterator<Item = RedisNode>) -> Self {
        self.quorum.extend(nodes);
        self
    }

    /// Observes `cancel`: once it reads `true`, waiting operations stop with
    /// [`LockError::Cancelled`].
    pub fn cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Builds the locker.
    ///
    /// # Errors
    ///
    /// Fails only if a file directory was given and cannot be created.
    pub fn build(self) -> LockResult<Locker> {
        let file = match (self.file, self.file_directory) {
            (Some(backend), _) => Some(backend),
            (None, Some(directory)) => Some(FileBackend::new(directory)?),
            (None, None) => None,
        };

        Ok(Locker {
            options: self.options,
            file: file.map(Arc::new),
            channel: Arc::new(self.channel.unwrap_or_default()),
            redis: self.redis.map(Arc::new),
            quorum: self.quorum.into_iter().map(Arc::new).collect(),
            cancel: self.cancel,
        })
    }
}

/// Runs business logic while holding a file, in-process, Redis or RedLock
/// mutex.
///
/// Every operation acquires the lock (retrying per the loop policy until the
/// timeout), runs the business logic exactly once, and releases the lock on
/// every exit path. Business logic errors are returned verbatim; the locker's
/// own failures reach the caller through `E: From<LockError>`.
///
/// Timeouts are signed seconds: `0.0` tries once, a positive value bounds the
/// wait, a negative value (see [`locksmith_core::timeout::INFINITE_TIMEOUT`])
/// waits until acquired or cancelled.
///
/// # Example
///
/// ```rust,ignore
/// let locker = Locker::builder().redis(node).build()?;
/// let total = locker
///     .redis_lock("order:1", 2.0, None, || async {
///         Ok::<_, LockError>(charge_order().await)
///     })
///     .await?;
/// ```
#[derive(Clone)]
pub struct Locker {
    options: LockerOptions,
    file: Option<Arc<FileBackend>>,
    channel: Arc<ChannelBackend>,
    redis: Option<Arc<RedisNode>>,
    quorum: Arc<[Arc<RedisNode>]>,
    cancel: Option<watch::Receiver<bool>>,
}

impl Locker {
    pub fn builder() -> LockerBuilder {
        LockerBuilder::new()
    }

    pub fn options(&self) -> &LockerOptions {
        &self.options
    }

    /// Returns a locker sharing this one's backends that observes `cancel`.
    pub fn with_cancellation(&self, cancel: watch::Receiver<bool>) -> Self {
        Self {
            cancel: Some(cancel),
            ..self.clone()
        }
    }

    /// Returns a locker sharing this one's backends that waits between
    /// attempts according to `policy`.
    ///
    /// ```rust,ignore
    /// locker
    ///     .with_loop_policy(ExponentialBackoff::default())
    ///     .redis_lock("order:1", 5.0, None, || async { Ok::<_, LockError>(()) })
    ///     .await?;
    /// ```
    pub fn with_loop_policy(&self, policy: impl LoopPolicy + 'static) -> Self {
        let mut locker = self.clone();
        locker.options.loop_policy = Arc::new(policy);
        locker
    }

    /// Runs `business_logic` under an advisory file lock on `key`.
    pub async fn flock<F, Fut, T, E>(&self, key: &str, timeout: f64, business_logic: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let backend = self
            .file
            .clone()
            .ok_or_else(|| LockError::Configuration("no file backend configured".to_string()))?;
        self.with_lock(backend, key, timeout, None, business_logic).await
    }

    /// Runs `business_logic` under an in-process lock on `key`.
    pub async fn channel_lock<F, Fut, T, E>(
        &self,
        key: &str,
        timeout: f64,
        business_logic: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        self.with_lock(self.channel.clone(), key, timeout, None, business_logic)
            .await
    }

    /// Runs `business_logic` under a lock on the single configured store.
    ///
    /// `token` overrides the generated ownership token.
    pub async fn redis_lock<F, Fut, T, E>(
        &self,
        key: &str,
        timeout: f64,
        token: Option<&str>,
        business_logic: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let node = self
            .redis
            .clone()
            .ok_or_else(|| LockError::Configuration("no Redis store configured".to_string()))?;
        self.with_lock(node, key, timeout, token, business_logic).await
    }

    /// Runs `business_logic` under a RedLock held by a majority of the
    /// configured quorum nodes.
    ///
    /// `token` overrides the token generated for each round.
    pub async fn red_lock<F, Fut, T, E>(
        &self,
        key: &str,
        timeout: f64,
        token: Option<&str>,
        business_logic: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let nodes = Arc::clone(&self.quorum);
        self.with_quorum_lock(nodes, key, timeout, token, business_logic)
            .await
    }

    /// Runs `business_logic` under a lock on any single backend.
    pub async fn with_lock<B, F, Fut, T, E>(
        &self,
        backend: Arc<B>,
        key: &str,
        timeout: f64,
        token: Option<&str>,
        business_logic: F,
    ) -> Result<T, E>
    where
        B: LockBackend + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let handle = self.acquire(backend, key, timeout, token).await?;
        run_locked(handle, business_logic).await
    }

    /// Runs `business_logic` under a RedLock over any set of nodes.
    pub async fn with_quorum_lock<B, F, Fut, T, E>(
        &self,
        nodes: Arc<[Arc<B>]>,
        key: &str,
        timeout: f64,
        token: Option<&str>,
        business_logic: F,
    ) -> Result<T, E>
    where
        B: LockBackend + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let handle = self.acquire_quorum(nodes, key, timeout, token).await?;
        run_locked(handle, business_logic).await
    }

    /// Acquires `key` on a single backend and hands out the scoped handle.
    #[instrument(skip_all, fields(lock.key = %key, backend = %backend.name(), timeout = timeout))]
    pub async fn acquire<B>(
        &self,
        backend: Arc<B>,
        key: &str,
        timeout: f64,
        token: Option<&str>,
    ) -> LockResult<LockHandle<B>>
    where
        B: LockBackend + 'static,
    {
        validate_key(key)?;
        let timeout = TimeoutValue::from_secs_f64(timeout)?;
        let token = token.map(Token::from).unwrap_or_else(Token::generate);
        let ttl = self.options.ttl;
        let started: Mutex<Option<Instant>> = Mutex::new(None);

        let acquired = {
            let backend = &backend;
            let token = &token;
            let started = &started;
            with_retry(
                timeout,
                self.options.loop_policy.as_ref(),
                self.cancel.as_ref(),
                move || async move {
                    let attempt_started = Instant::now();
                    let acquired = backend.try_acquire(key, token, ttl).await?;
                    if acquired {
                        *started.lock().unwrap_or_else(PoisonError::into_inner) =
                            Some(attempt_started);
                    }
                    Ok::<bool, LockError>(acquired)
                },
            )
            .await?
        };

        if !acquired {
            debug!("lock acquisition timed out");
            return Err(LockError::Timeout(timeout));
        }

        let acquired_at = started
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .unwrap_or_else(Instant::now);
        let validity = backend.supports_expiry().then_some(ttl);
        debug!("lock acquired");
        Ok(LockHandle::single(
            backend,
            key.to_string(),
            token,
            acquired_at,
            validity,
        ))
    }

    /// Acquires `key` on a majority of `nodes` and hands out the scoped handle.
    #[instrument(skip_all, fields(lock.key = %key, nodes = nodes.len(), timeout = timeout))]
    pub async fn acquire_quorum<B>(
        &self,
        nodes: Arc<[Arc<B>]>,
        key: &str,
        timeout: f64,
        token: Option<&str>,
    ) -> LockResult<LockHandle<B>>
    where
        B: LockBackend + 'static,
    {
        validate_key(key)?;
        if nodes.is_empty() {
            return Err(LockError::Configuration(
                "no RedLock nodes configured".to_string(),
            ));
        }
        let timeout = TimeoutValue::from_secs_f64(timeout)?;
        let timeouts = self.options.redlock_timeouts();
        let fixed_token = token.map(Token::from);
        let winner: Mutex<Option<(Token, QuorumResult)>> = Mutex::new(None);

        let acquired = {
            let nodes: &[Arc<B>] = &nodes;
            let timeouts = &timeouts;
            let fixed_token = &fixed_token;
            let winner = &winner;
            let cancel = self.cancel.as_ref();
            with_retry(
                timeout,
                self.options.loop_policy.as_ref(),
                cancel,
                move || async move {
                    // A fresh token per round unless the caller fixed one.
                    let token = fixed_token.clone().unwrap_or_else(Token::generate);
                    let result = acquire_redlock(nodes, key, &token, timeouts, cancel).await?;
                    let successful = result.is_successful();
                    if successful {
                        *winner.lock().unwrap_or_else(PoisonError::into_inner) =
                            Some((token, result));
                    }
                    Ok::<bool, LockError>(successful)
                },
            )
            .await?
        };

        let winner = winner.into_inner().unwrap_or_else(PoisonError::into_inner);
        let (token, validity) = match winner {
            Some((token, QuorumResult { validity: Some(validity), .. })) if acquired => {
                (token, validity)
            }
            _ => {
                debug!("redlock acquisition timed out");
                return Err(LockError::Timeout(timeout));
            }
        };

        debug!(validity_ms = validity.as_millis() as u64, "redlock acquired");
        Ok(LockHandle::quorum(
            nodes,
            timeouts.node_timeout(),
            key.to_string(),
            token,
            validity,
        ))
    }
}

async fn run_locked<B, F, Fut, T, E>(handle: LockHandle<B>, business_logic: F) -> Result<T, E>
where
    B: LockBackend + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let outcome = business_logic().await;

    if let Some(validity) = handle.validity() {
        let held_for = handle.acquired_at().elapsed();
        if held_for > validity {
            warn!(
                lock.key = %handle.key(),
                held_ms = held_for.as_millis() as u64,
                validity_ms = validity.as_millis() as u64,
                "business logic executed outside the lock's validity window"
            );
        }
    }

    let key = handle.key().to_string();
    match handle.release().await {
        Ok(true) => debug!(lock.key = %key, "lock released"),
        Ok(false) => warn!(lock.key = %key, "lock was no longer held at release"),
        Err(e) => warn!(lock.key = %key, error = %e, "lock release failed"),
    }

    outcome
}

fn validate_key(key: &str) -> LockResult<()> {
    if key.is_empty() {
        return Err(LockError::InvalidKey("lock key cannot be empty".to_string()));
    }
    Ok(())
}
