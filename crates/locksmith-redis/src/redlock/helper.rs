//! RedLock helper functions.

/// Helper functions for RedLock algorithm.
pub struct RedLockHelper;

impl RedLockHelper {
    /// Number of nodes that must agree: `N/2 + 1`.
    pub fn majority(node_count: usize) -> usize {
        (node_count / 2) + 1
    }

    /// Checks if we have sufficient successes for majority consensus.
    pub fn has_sufficient_successes(success_count: usize, node_count: usize) -> bool {
        success_count >= Self::majority(node_count)
    }

    /// Checks if enough nodes failed that a majority is out of reach.
    pub fn has_too_many_failures_or_faults(failure_count: usize, node_count: usize) -> bool {
        node_count.saturating_sub(failure_count) < Self::majority(node_count)
    }
}
