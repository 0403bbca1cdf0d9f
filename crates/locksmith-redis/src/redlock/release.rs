//! RedLock release algorithm implementation.

use std::sync::Arc;
use std::time::Duration;

use locksmith_core::error::{LockError, LockResult};
use locksmith_core::token::Token;
use locksmith_core::traits::LockBackend;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// What a release-to-all pass achieved.
#[derive(Debug, Clone, Default)]
pub struct ReleaseReport {
    /// Nodes that deleted a record holding our token.
    pub released: usize,
    /// Nodes that answered without deleting anything.
    pub not_held: usize,
    /// `(node, reason)` for nodes that errored or timed out.
    pub failures: Vec<(String, String)>,
}

impl ReleaseReport {
    /// Turns node failures into a [`LockError::ReleaseFailure`].
    ///
    /// Nodes that did not hold the token are not failures: they either never
    /// acquired it or their record already expired.
    pub fn into_result(self, key: &str) -> LockResult<usize> {
        if self.failures.is_empty() {
            return Ok(self.released);
        }
        let reason = self
            .failures
            .iter()
            .map(|(node, reason)| format!("{node}: {reason}"))
            .collect::<Vec<_>>()
            .join("; ");
        Err(LockError::ReleaseFailure {
            key: key.to_string(),
            reason,
        })
    }
}

/// Releases `token` on every node, concurrently and best-effort.
///
/// All nodes are asked, including ones that never acquired the token (a
/// harmless no-op there). Each call is bounded by `node_timeout`; a node that
/// cannot be reached keeps its record until the TTL expires it.
pub async fn release_redlock<B>(
    nodes: &[Arc<B>],
    key: &str,
    token: &Token,
    node_timeout: Duration,
) -> ReleaseReport
where
    B: LockBackend + 'static,
{
    let mut tasks = JoinSet::new();
    for node in nodes {
        let node = Arc::clone(node);
        let key = key.to_string();
        let token = token.clone();
        tasks.spawn(async move {
            let answer = tokio::time::timeout(node_timeout, node.release(&key, &token)).await;
            let answer = match answer {
                Ok(Ok(released)) => Ok(released),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("timed out after {node_timeout:?}")),
            };
            (node.name().to_string(), answer)
        });
    }

    let mut report = ReleaseReport::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(true))) => report.released += 1,
            Ok((_, Ok(false))) => report.not_held += 1,
            Ok((node, Err(reason))) => {
                warn!(node = %node, lock.key = %key, reason = %reason, "redlock node release failed");
                report.failures.push((node, reason));
            }
            Err(e) => {
                warn!(lock.key = %key, error = %e, "redlock release task failed");
                report.failures.push(("unknown".to_string(), e.to_string()));
            }
        }
    }

    debug!(
        lock.key = %key,
        released = report.released,
        not_held = report.not_held,
        failed = report.failures.len(),
        "redlock release finished"
    );
    report
}
