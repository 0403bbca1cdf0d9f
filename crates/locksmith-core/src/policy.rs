//! Built-in loop policies.

use std::time::Duration;

use rand::Rng;

use crate::traits::LoopPolicy;

/// Sleeps the same amount between every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantDelay(pub Duration);

impl Default for ConstantDelay {
    fn default() -> Self {
        Self(Duration::from_millis(10))
    }
}

impl LoopPolicy for ConstantDelay {
    fn delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}

/// Exponential backoff with ±25% jitter.
///
/// The jitter spreads out waiters that started contending at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(10),
            max: Duration::from_secs(1),
            multiplier: 2,
        }
    }
}

impl ExponentialBackoff {
    /// Delay for `attempt` before jitter is applied.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let mut delay = self.initial.min(self.max);
        if self.multiplier <= 1 || delay.is_zero() {
            return delay;
        }
        for _ in 1..attempt {
            delay = match delay.checked_mul(self.multiplier) {
                Some(next) if next < self.max => next,
                _ => return self.max,
            };
        }
        delay
    }
}

impl LoopPolicy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let base_micros = u64::try_from(base.as_micros()).unwrap_or(u64::MAX);
        let jitter_range = base_micros / 4;
        if jitter_range == 0 {
            return base;
        }

        let offset = rand::thread_rng().gen_range(0..=jitter_range.saturating_mul(2));
        let micros = base_micros.saturating_add(offset).saturating_sub(jitter_range);
        Duration::from_micros(micros)
    }
}
