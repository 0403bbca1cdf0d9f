//! Timeout value helpers.

use std::fmt;
use std::time::Duration;

use crate::error::{LockError, LockResult};

/// Timeout seconds meaning "wait until acquired or cancelled".
pub const INFINITE_TIMEOUT: f64 = -1.0;

/// How long an acquisition may wait.
///
/// Built from signed float seconds:
///
/// - `0.0` - a single attempt, no retry
/// - `> 0.0` - retry until the budget runs out
/// - `< 0.0` - retry until acquired or cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutValue {
    millis: i64, // -1 for infinite
}

impl TimeoutValue {
    pub const INFINITE: Self = Self { millis: -1 };
    pub const ZERO: Self = Self { millis: 0 };

    /// Interprets caller-supplied seconds. Sub-millisecond positive values
    /// round up so that they never collapse into a single attempt.
    pub fn from_secs_f64(seconds: f64) -> LockResult<Self> {
        if seconds.is_nan() {
            return Err(LockError::InvalidTimeout(seconds));
        }
        if seconds < 0.0 {
            return Ok(Self::INFINITE);
        }
        if seconds == 0.0 {
            return Ok(Self::ZERO);
        }
        let millis = (seconds * 1000.0).ceil();
        let millis = if millis >= i64::MAX as f64 {
            i64::MAX
        } else {
            millis as i64
        };
        Ok(Self { millis })
    }

    pub fn is_infinite(&self) -> bool {
        self.millis < 0
    }

    pub fn is_zero(&self) -> bool {
        self.millis == 0
    }

    pub fn as_duration(&self) -> Option<Duration> {
        if self.is_infinite() {
            None
        } else {
            Some(Duration::from_millis(self.millis as u64))
        }
    }
}

impl From<Option<Duration>> for TimeoutValue {
    fn from(timeout: Option<Duration>) -> Self {
        match timeout {
            None => Self::INFINITE,
            Some(d) => Self {
                millis: i64::try_from(d.as_millis()).unwrap_or(i64::MAX),
            },
        }
    }
}

impl From<Duration> for TimeoutValue {
    fn from(timeout: Duration) -> Self {
        Self::from(Some(timeout))
    }
}

impl fmt::Display for TimeoutValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_duration() {
            None => f.write_str("infinite"),
            Some(d) => write!(f, "{}s", d.as_secs_f64()),
        }
    }
}
