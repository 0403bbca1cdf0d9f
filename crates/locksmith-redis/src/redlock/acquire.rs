//! RedLock acquire algorithm implementation.

use std::sync::Arc;
use std::time::Duration;

use locksmith_core::error::{LockError, LockResult};
use locksmith_core::retry::cancelled;
use locksmith_core::token::Token;
use locksmith_core::traits::LockBackend;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::helper::RedLockHelper;
use super::release::release_redlock;
use super::timeouts::RedLockTimeouts;

/// What one node answered during a round.
#[derive(Debug, Clone)]
pub struct NodeOutcome {
    /// Position of the node in the coordinator's node list.
    pub index: usize,
    /// Backend name of the node.
    pub node: String,
    /// Whether the node stored our token.
    pub acquired: bool,
    /// Time the node took to answer (or to be abandoned).
    pub elapsed: Duration,
    /// Error or timeout that made the node count as failed.
    pub error: Option<String>,
}

/// Result of one RedLock acquisition round.
#[derive(Debug, Clone)]
pub struct QuorumResult {
    /// One outcome per node, in node order.
    pub outcomes: Vec<NodeOutcome>,
    /// Round duration, from the first request to the last answer.
    pub elapsed: Duration,
    /// Remaining trustworthy lock time, `None` if it was used up.
    pub validity: Option<Duration>,
}

impl QuorumResult {
    /// Returns the number of nodes that stored our token.
    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.acquired).count()
    }

    /// The round holds the lock iff a majority acquired it and some validity
    /// time is left.
    pub fn is_successful(&self) -> bool {
        RedLockHelper::has_sufficient_successes(self.success_count(), self.outcomes.len())
            && self.validity.is_some()
    }
}

/// Releases the round's token on every node if the round future is dropped
/// before it finished (caller deadline, aborted task).
struct RoundGuard<B: LockBackend + 'static> {
    nodes: Vec<Arc<B>>,
    key: String,
    token: Token,
    node_timeout: Duration,
    armed: bool,
}

impl<B: LockBackend + 'static> RoundGuard<B> {
    fn new(nodes: &[Arc<B>], key: &str, token: &Token, node_timeout: Duration) -> Self {
        Self {
            nodes: nodes.to_vec(),
            key: key.to_string(),
            token: token.clone(),
            node_timeout,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<B: LockBackend + 'static> Drop for RoundGuard<B> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let nodes = std::mem::take(&mut self.nodes);
        let key = std::mem::take(&mut self.key);
        let token = self.token.clone();
        let node_timeout = self.node_timeout;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(lock.key = %key, "redlock round dropped, releasing all nodes in background");
                runtime.spawn(async move {
                    release_redlock(&nodes, &key, &token, node_timeout).await;
                });
            }
            Err(_) => {
                warn!(lock.key = %key, "redlock round dropped outside a tokio runtime, nodes not released");
            }
        }
    }
}

/// Runs one RedLock round across `nodes` with a shared `token`.
///
/// Every node is asked concurrently, each call bounded by the per-node
/// timeout; a node that errors or times out counts as a failed node rather
/// than failing the round. The round stops waiting as soon as enough nodes
/// failed that a majority is out of reach. Once the nodes answered, the
/// validity window is computed from the round's elapsed time.
///
/// When the round does not hold the lock (no majority, or no validity left)
/// the token is released on every node before returning, so no partial lock
/// survives the round. The same happens in the background if the returned
/// future is dropped mid-round. A successful round leaves the lock in place;
/// its holder must call [`release_redlock`] when done.
///
/// # Errors
///
/// * [`LockError::Configuration`] - `nodes` is empty
/// * [`LockError::Cancelled`] - the cancellation signal fired mid-round; the
///   token was released on every node first
#[instrument(skip_all, fields(lock.key = %key, nodes = nodes.len()))]
pub async fn acquire_redlock<B>(
    nodes: &[Arc<B>],
    key: &str,
    token: &Token,
    timeouts: &RedLockTimeouts,
    cancel: Option<&watch::Receiver<bool>>,
) -> LockResult<QuorumResult>
where
    B: LockBackend + 'static,
{
    if nodes.is_empty() {
        return Err(LockError::Configuration(
            "no quorum nodes provided".to_string(),
        ));
    }

    let node_timeout = timeouts.node_timeout();
    let start = Instant::now();

    let mut tasks = JoinSet::new();
    for (index, node) in nodes.iter().enumerate() {
        let node = Arc::clone(node);
        let key = key.to_string();
        let token = token.clone();
        let expiry = timeouts.expiry;
        tasks.spawn(async move {
            let started = Instant::now();
            let answer =
                tokio::time::timeout(node_timeout, node.try_acquire(&key, &token, expiry)).await;
            let (acquired, error) = match answer {
                Ok(Ok(acquired)) => (acquired, None),
                Ok(Err(e)) => (false, Some(e.to_string())),
                Err(_) => (false, Some(format!("timed out after {node_timeout:?}"))),
            };
            NodeOutcome {
                index,
                node: node.name().to_string(),
                acquired,
                elapsed: started.elapsed(),
                error,
            }
        });
    }
    let mut guard = RoundGuard::new(nodes, key, token, node_timeout);

    let mut outcomes: Vec<Option<NodeOutcome>> = vec![None; nodes.len()];
    let mut failures = 0;
    let mut abandoned = false;
    loop {
        let joined = match cancel {
            Some(cancel) => tokio::select! {
                joined = tasks.join_next() => joined,
                _ = cancelled(cancel) => {
                    tasks.abort_all();
                    debug!("redlock round cancelled, releasing all nodes");
                    release_redlock(nodes, key, token, node_timeout).await;
                    guard.disarm();
                    return Err(LockError::Cancelled);
                }
            },
            None => tasks.join_next().await,
        };

        match joined {
            Some(Ok(outcome)) => {
                if !outcome.acquired {
                    failures += 1;
                }
                let index = outcome.index;
                outcomes[index] = Some(outcome);
            }
            Some(Err(e)) => {
                // A panicked node task is filled in as failed below.
                warn!(error = %e, "redlock node task failed");
                failures += 1;
            }
            None => break,
        }

        if RedLockHelper::has_too_many_failures_or_faults(failures, nodes.len()) {
            if !tasks.is_empty() {
                debug!(failures, "redlock majority out of reach, abandoning pending nodes");
                tasks.abort_all();
                abandoned = true;
            }
            break;
        }
    }

    let elapsed = start.elapsed();
    let outcomes: Vec<NodeOutcome> = outcomes
        .into_iter()
        .enumerate()
        .map(|(index, outcome)| {
            outcome.unwrap_or_else(|| NodeOutcome {
                index,
                node: nodes[index].name().to_string(),
                acquired: false,
                elapsed,
                error: Some(if abandoned {
                    "abandoned, majority out of reach".to_string()
                } else {
                    "node task failed".to_string()
                }),
            })
        })
        .collect();

    for outcome in outcomes.iter().filter(|o| o.error.is_some()) {
        warn!(
            node = %outcome.node,
            error = outcome.error.as_deref().unwrap_or_default(),
            "redlock node failed"
        );
    }

    let result = QuorumResult {
        outcomes,
        elapsed,
        validity: timeouts.validity(elapsed),
    };

    if result.is_successful() {
        guard.disarm();
        debug!(
            acquired = result.success_count(),
            elapsed_ms = elapsed.as_millis() as u64,
            validity_ms = result.validity.map(|v| v.as_millis() as u64),
            "redlock round acquired quorum"
        );
    } else {
        debug!(
            acquired = result.success_count(),
            required = RedLockHelper::majority(nodes.len()),
            validity_left = result.validity.is_some(),
            "redlock round failed, releasing all nodes"
        );
        release_redlock(nodes, key, token, node_timeout).await;
        guard.disarm();
    }

    Ok(result)
}
