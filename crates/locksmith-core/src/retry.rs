//! Retry loop turning a non-blocking attempt into a blocking one.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{LockError, LockResult};
use crate::timeout::TimeoutValue;
use crate::traits::LoopPolicy;

/// Returns `true` once the caller has flipped its cancellation signal.
pub fn is_cancelled(cancel: Option<&watch::Receiver<bool>>) -> bool {
    cancel.is_some_and(|rx| *rx.borrow())
}

/// Resolves once the cancellation signal is `true`.
///
/// Never resolves if the sender is dropped without cancelling.
pub async fn cancelled(cancel: &watch::Receiver<bool>) {
    let mut cancel = cancel.clone();
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Sleeps for `delay`, waking early with [`LockError::Cancelled`] if the
/// cancellation signal fires.
pub async fn sleep_or_cancel(
    delay: Duration,
    cancel: Option<&watch::Receiver<bool>>,
) -> LockResult<()> {
    let Some(cancel) = cancel else {
        sleep_at_least_a_yield(delay).await;
        return Ok(());
    };

    let mut cancel = cancel.clone();
    let sleep = sleep_at_least_a_yield(delay);
    tokio::pin!(sleep);

    loop {
        if *cancel.borrow_and_update() {
            return Err(LockError::Cancelled);
        }
        tokio::select! {
            _ = &mut sleep => return Ok(()),
            changed = cancel.changed() => {
                if changed.is_err() {
                    // Sender dropped: nobody can cancel any more.
                    sleep.await;
                    return Ok(());
                }
            }
        }
    }
}

async fn sleep_at_least_a_yield(delay: Duration) {
    if delay.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(delay).await;
    }
}

/// Repeats `attempt` until it succeeds, the timeout runs out, or the caller
/// cancels.
///
/// # Returns
///
/// * `Ok(true)` - An attempt succeeded
/// * `Ok(false)` - The timeout expired (or the single attempt of a zero
///   timeout failed)
/// * `Err(LockError::Cancelled)` - The cancellation signal fired
/// * `Err(...)` - An attempt failed with an error; errors are not retried
///
/// Sleeps never extend past the remaining budget, so a bounded loop gives up
/// at most one attempt's latency after the timeout.
pub async fn with_retry<F, Fut>(
    timeout: TimeoutValue,
    policy: &dyn LoopPolicy,
    cancel: Option<&watch::Receiver<bool>>,
    mut attempt: F,
) -> LockResult<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LockResult<bool>>,
{
    let start = Instant::now();
    let budget = timeout.as_duration();
    let mut attempts: u32 = 0;

    loop {
        if is_cancelled(cancel) {
            return Err(LockError::Cancelled);
        }

        attempts = attempts.saturating_add(1);
        trace!(attempt = attempts, "attempting lock acquisition");
        if attempt().await? {
            debug!(
                attempts,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "lock acquisition attempt succeeded"
            );
            return Ok(true);
        }

        if timeout.is_zero() {
            return Ok(false);
        }

        let mut delay = policy.delay(attempts);
        if let Some(budget) = budget {
            let elapsed = start.elapsed();
            if elapsed >= budget {
                debug!(attempts, "lock acquisition budget exhausted");
                return Ok(false);
            }
            delay = delay.min(budget - elapsed);
        }

        sleep_or_cancel(delay, cancel).await?;

        if let Some(budget) = budget
            && start.elapsed() >= budget
        {
            debug!(attempts, "lock acquisition budget exhausted");
            return Ok(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ConstantDelay;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting_attempt(
        counter: Arc<AtomicU32>,
        succeed_on: Option<u32>,
    ) -> impl FnMut() -> std::future::Ready<LockResult<bool>> {
        move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(Ok(succeed_on == Some(n)))
        }
    }

    #[tokio::test]
    async fn test_zero_timeout_attempts_exactly_once() {
        let counter = Arc::new(AtomicU32::new(0));
        let acquired = with_retry(
            TimeoutValue::ZERO,
            &ConstantDelay(Duration::from_millis(1)),
            None,
            counting_attempt(counter.clone(), None),
        )
        .await
        .unwrap();

        assert!(!acquired);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_infinite_timeout_retries_until_success() {
        let counter = Arc::new(AtomicU32::new(0));
        let acquired = with_retry(
            TimeoutValue::INFINITE,
            &ConstantDelay(Duration::from_millis(1)),
            None,
            counting_attempt(counter.clone(), Some(7)),
        )
        .await
        .unwrap();

        assert!(acquired);
        assert_eq!(counter.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn test_bounded_timeout_gives_up() {
        let counter = Arc::new(AtomicU32::new(0));
        let start = std::time::Instant::now();
        let acquired = with_retry(
            TimeoutValue::from(Duration::from_millis(100)),
            &ConstantDelay(Duration::from_millis(10)),
            None,
            counting_attempt(counter.clone(), None),
        )
        .await
        .unwrap();

        let elapsed = start.elapsed();
        assert!(!acquired);
        assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(500), "{elapsed:?}");
        assert!(counter.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_sleep_never_exceeds_remaining_budget() {
        let counter = Arc::new(AtomicU32::new(0));
        let start = std::time::Instant::now();
        let acquired = with_retry(
            TimeoutValue::from(Duration::from_millis(50)),
            &ConstantDelay(Duration::from_secs(10)),
            None,
            counting_attempt(counter.clone(), None),
        )
        .await
        .unwrap();

        assert!(!acquired);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_errors_are_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let result = with_retry(
            TimeoutValue::INFINITE,
            &ConstantDelay(Duration::from_millis(1)),
            None,
            move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err(LockError::unavailable("test", "down")))
            },
        )
        .await;

        assert!(matches!(result, Err(LockError::BackendUnavailable { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_infinite_wait() {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let counter = Arc::new(AtomicU32::new(0));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = cancel_tx.send(true);
        });

        let result = with_retry(
            TimeoutValue::INFINITE,
            &ConstantDelay(Duration::from_secs(60)),
            Some(&cancel_rx),
            counting_attempt(counter.clone(), None),
        )
        .await;

        assert!(matches!(result, Err(LockError::Cancelled)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_signal() {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = cancel_tx.send(true);
        });

        tokio::time::timeout(Duration::from_secs(5), cancelled(&cancel_rx))
            .await
            .expect("cancellation was not observed");
    }

    #[tokio::test]
    async fn test_already_cancelled_makes_no_attempt() {
        let (_cancel_tx, cancel_rx) = watch::channel(true);
        let counter = Arc::new(AtomicU32::new(0));

        let result = with_retry(
            TimeoutValue::INFINITE,
            &ConstantDelay(Duration::from_millis(1)),
            Some(&cancel_rx),
            counting_attempt(counter.clone(), None),
        )
        .await;

        assert!(matches!(result, Err(LockError::Cancelled)));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
