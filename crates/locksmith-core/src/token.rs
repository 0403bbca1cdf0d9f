//! Ownership tokens.

use std::fmt;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

/// Value identifying the holder of one lock acquisition.
///
/// A store only deletes a lock record whose stored value equals the caller's
/// token, so a holder whose lock expired cannot release a newer holder's lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    /// Generates a fresh token.
    ///
    /// Format: `{process_id}_{counter}_{128 random bits as hex}`
    pub fn generate() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let counter = COUNTER.fetch_add(1, Ordering::Relaxed);

        let pid = process::id();

        let mut rng = rand::thread_rng();
        let random: u128 = rng.r#gen();

        Self(format!("{}_{}_{:032x}", pid, counter, random))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
