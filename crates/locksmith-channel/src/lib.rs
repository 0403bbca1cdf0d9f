//! In-process backend for locksmith mutexes.
//!
//! Coordinates tasks and threads of a single process. Nothing is shared with
//! other processes, so the lock disappears with the process.

pub mod backend;

pub use backend::ChannelBackend;
