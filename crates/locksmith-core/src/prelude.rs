//! Convenience prelude for locksmith types.

pub use crate::error::{LockError, LockResult};
pub use crate::policy::{ConstantDelay, ExponentialBackoff};
pub use crate::retry::with_retry;
pub use crate::timeout::{INFINITE_TIMEOUT, TimeoutValue};
pub use crate::token::Token;
pub use crate::traits::{LockBackend, LoopPolicy};
