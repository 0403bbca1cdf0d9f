//! Core traits and types for locksmith mutexes.

pub mod error;
pub mod policy;
pub mod prelude;
pub mod retry;
pub mod timeout;
pub mod token;
pub mod traits;

pub use error::{LockError, LockResult};
pub use prelude::*;
