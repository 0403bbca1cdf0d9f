//! Redis backend and RedLock quorum coordinator for locksmith mutexes.

pub mod builder;
pub mod node;
pub mod redlock;

pub use builder::RedisNodeBuilder;
pub use node::RedisNode;
pub use redlock::{QuorumResult, RedLockHelper, RedLockTimeouts};
