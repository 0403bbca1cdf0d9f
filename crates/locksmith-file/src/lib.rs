//! File system backend for locksmith mutexes.

pub mod backend;
mod handle;
pub mod name;

pub use backend::{FileBackend, FileBackendBuilder};
