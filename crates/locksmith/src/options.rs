//! Locker configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use locksmith_core::policy::ConstantDelay;
use locksmith_core::traits::LoopPolicy;
use locksmith_redis::RedLockTimeouts;

/// Timeout commonly used for store-backed flavors, in seconds.
pub const DEFAULT_STORE_TIMEOUT: f64 = 5.0;

/// Tuning shared by every lock taken through one [`crate::Locker`].
#[derive(Clone)]
pub struct LockerOptions {
    /// Expiry written with each store lock record.
    pub ttl: Duration,
    /// Delay strategy between acquisition attempts.
    pub loop_policy: Arc<dyn LoopPolicy>,
    /// Per-node bound for quorum calls; derived from `ttl` when `None`.
    pub node_timeout: Option<Duration>,
    /// Clock drift margin for quorum validity; derived from `ttl` when `None`.
    pub drift_margin: Option<Duration>,
}

impl Default for LockerOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            loop_policy: Arc::new(ConstantDelay::default()),
            node_timeout: None,
            drift_margin: None,
        }
    }
}

impl LockerOptions {
    /// RedLock timeouts derived from these options.
    pub fn redlock_timeouts(&self) -> RedLockTimeouts {
        let mut timeouts = RedLockTimeouts::new(self.ttl);
        timeouts.node_timeout = self.node_timeout;
        timeouts.drift_margin = self.drift_margin;
        timeouts
    }
}

impl fmt::Debug for LockerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockerOptions")
            .field("ttl", &self.ttl)
            .field("node_timeout", &self.node_timeout)
            .field("drift_margin", &self.drift_margin)
            .finish_non_exhaustive()
    }
}
