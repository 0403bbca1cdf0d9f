//! RedLock algorithm: one logical lock held by a majority of independent nodes.
//!
//! See https://redis.io/topics/distlock for the algorithm specification.
//!
//! The coordinator is generic over [`locksmith_core::traits::LockBackend`];
//! nodes are usually [`crate::RedisNode`]s.

pub mod acquire;
pub mod helper;
pub mod release;
pub mod timeouts;

pub use acquire::{NodeOutcome, QuorumResult, acquire_redlock};
pub use helper::RedLockHelper;
pub use release::{ReleaseReport, release_redlock};
pub use timeouts::RedLockTimeouts;
