//! RedLock timeout calculations.

use std::time::Duration;

/// Floor for the derived per-node timeout.
const MIN_NODE_TIMEOUT: Duration = Duration::from_millis(1);

/// Constant part of the derived clock drift margin.
const DRIFT_CONSTANT: Duration = Duration::from_millis(2);

/// Timeout configuration for one RedLock round.
///
/// Unset fields are derived from `expiry`:
///
/// - per-node timeout: `expiry / 10`
/// - clock drift margin: `expiry / 100 + 2ms`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedLockTimeouts {
    /// Lock expiry time (TTL set on every node).
    pub expiry: Duration,
    /// Upper bound for a single node call.
    pub node_timeout: Option<Duration>,
    /// Safety margin for clock skew between nodes.
    pub drift_margin: Option<Duration>,
}

impl RedLockTimeouts {
    /// Creates a configuration with derived node timeout and drift margin.
    pub fn new(expiry: Duration) -> Self {
        Self {
            expiry,
            node_timeout: None,
            drift_margin: None,
        }
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = Some(timeout);
        self
    }

    pub fn with_drift_margin(mut self, margin: Duration) -> Self {
        self.drift_margin = Some(margin);
        self
    }

    /// Upper bound for a single node's acquire or release call.
    pub fn node_timeout(&self) -> Duration {
        self.node_timeout
            .unwrap_or(self.expiry / 10)
            .max(MIN_NODE_TIMEOUT)
    }

    /// Safety margin subtracted from the validity window.
    pub fn drift_margin(&self) -> Duration {
        self.drift_margin
            .unwrap_or(self.expiry / 100 + DRIFT_CONSTANT)
    }

    /// Time the lock can still be trusted after a round that took `elapsed`.
    ///
    /// `expiry - elapsed - drift`, or `None` when nothing positive remains.
    pub fn validity(&self, elapsed: Duration) -> Option<Duration> {
        self.expiry
            .checked_sub(elapsed)?
            .checked_sub(self.drift_margin())
            .filter(|remaining| !remaining.is_zero())
    }
}
