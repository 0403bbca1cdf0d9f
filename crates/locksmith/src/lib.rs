//! Run business logic under a mutex held on a file, in process, on a Redis
//! store or on a RedLock quorum of Redis nodes.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use locksmith::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), LockError> {
//!     let locker = Locker::builder().file_directory("/tmp/locks").build()?;
//!
//!     // Wait up to two seconds for the lock, then run the closure once.
//!     let answer = locker
//!         .flock("report:daily", 2.0, || async { Ok::<_, LockError>(42) })
//!         .await?;
//!     assert_eq!(answer, 42);
//!     Ok(())
//! }
//! ```
//!
//! # Flavors
//!
//! | Operation | Backend | Default timeout |
//! |-----------|---------|-----------------|
//! | [`Locker::flock`] | advisory file lock | `INFINITE_TIMEOUT` |
//! | [`Locker::channel_lock`] | in-process registry | `INFINITE_TIMEOUT` |
//! | [`Locker::redis_lock`] | one Redis store | [`DEFAULT_STORE_TIMEOUT`] |
//! | [`Locker::red_lock`] | majority of Redis nodes | [`DEFAULT_STORE_TIMEOUT`] |
//!
//! Store flavors write `SET key token NX PX ttl` and release with a
//! compare-and-delete script, so a caller can only ever remove its own lock.
//!
//! ```rust,no_run
//! use locksmith::*;
//!
//! # async fn run() -> Result<(), LockError> {
//! let nodes = RedisNodeBuilder::new()
//!     .urls(&["redis://10.0.0.1:6379", "redis://10.0.0.2:6379", "redis://10.0.0.3:6379"])
//!     .build()
//!     .await?;
//! let locker = Locker::builder().quorum_nodes(nodes).build()?;
//!
//! locker
//!     .red_lock("order:1", DEFAULT_STORE_TIMEOUT, None, || async {
//!         Ok::<_, LockError>(())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! Lower-level pieces (backends, the retry loop, the quorum coordinator) are
//! re-exported for callers that need a [`LockHandle`] instead of a closure.

pub mod handle;
pub mod locker;
pub mod options;

pub use handle::LockHandle;
pub use locker::{Locker, LockerBuilder};
pub use options::{DEFAULT_STORE_TIMEOUT, LockerOptions};

pub use locksmith_core::prelude::*;
pub use locksmith_channel::ChannelBackend;
pub use locksmith_file::{FileBackend, FileBackendBuilder};
pub use locksmith_redis::redlock::{ReleaseReport, acquire_redlock, release_redlock};
pub use locksmith_redis::{QuorumResult, RedLockTimeouts, RedisNode, RedisNodeBuilder};
