//! Integration tests for the mutex facade.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use common::MemoryStore;
use locksmith::*;
use tokio::time::Instant;

fn locker() -> Locker {
    Locker::builder()
        .loop_policy(ConstantDelay(Duration::from_millis(5)))
        .build()
        .unwrap()
}

fn locker_with_ttl(ttl: Duration) -> Locker {
    Locker::builder()
        .ttl(ttl)
        .loop_policy(ConstantDelay(Duration::from_millis(5)))
        .build()
        .unwrap()
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("payment declined")]
    Declined,
}

async fn explode() -> Result<(), LockError> {
    panic!("business logic panicked")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_never_overlap() {
    let locker = locker();
    let store = Arc::new(MemoryStore::new());
    let inside = Arc::new(AtomicBool::new(false));
    let entered = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let locker = locker.clone();
        let store = Arc::clone(&store);
        let inside = Arc::clone(&inside);
        let entered = Arc::clone(&entered);
        tasks.push(tokio::spawn(async move {
            locker
                .with_lock(store, "counter", INFINITE_TIMEOUT, None, || async {
                    assert!(!inside.swap(true, Ordering::SeqCst), "two holders at once");
                    entered.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    inside.store(false, Ordering::SeqCst);
                    Ok::<_, LockError>(())
                })
                .await
        }));
    }

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(entered.load(Ordering::SeqCst), 8);
    assert!(store.holder("counter").is_none());
}

#[tokio::test]
async fn test_second_caller_waits_for_first() {
    let locker = locker();
    let store = Arc::new(MemoryStore::new());
    let first_done = Arc::new(AtomicBool::new(false));

    let first = {
        let locker = locker.clone();
        let store = Arc::clone(&store);
        let first_done = Arc::clone(&first_done);
        tokio::spawn(async move {
            locker
                .with_lock(store, "order:1", 2.0, None, || async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    first_done.store(true, Ordering::SeqCst);
                    Ok::<_, LockError>("first")
                })
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = locker
        .with_lock(Arc::clone(&store), "order:1", 2.0, None, || async {
            assert!(first_done.load(Ordering::SeqCst));
            Ok::<_, LockError>("second")
        })
        .await
        .unwrap();

    assert_eq!(first.await.unwrap().unwrap(), "first");
    assert_eq!(second, "second");
}

#[tokio::test]
async fn test_zero_timeout_tries_exactly_once() {
    let locker = locker();
    let store = Arc::new(MemoryStore::new());
    store.insert("job", &Token::from("other"), Duration::from_secs(30));

    let result: Result<(), LockError> = locker
        .with_lock(Arc::clone(&store), "job", 0.0, None, || async { Ok(()) })
        .await;

    assert!(matches!(result, Err(LockError::Timeout(t)) if t.is_zero()));
    assert_eq!(store.acquire_calls(), 1);
}

#[tokio::test]
async fn test_positive_timeout_bounds_the_wait() {
    let locker = locker();
    let store = Arc::new(MemoryStore::new());
    store.insert("job", &Token::from("other"), Duration::from_secs(30));

    let start = Instant::now();
    let result: Result<(), LockError> = locker
        .with_lock(Arc::clone(&store), "job", 0.2, None, || async { Ok(()) })
        .await;
    let elapsed = start.elapsed();

    assert!(matches!(result, Err(LockError::Timeout(_))));
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_millis(600));
    assert!(store.acquire_calls() > 1);
}

#[tokio::test]
async fn test_negative_timeout_waits_for_expiry() {
    let locker = locker();
    let store = Arc::new(MemoryStore::new());
    store.insert("job", &Token::from("other"), Duration::from_millis(100));

    let value = locker
        .with_lock(Arc::clone(&store), "job", -1.0, None, || async {
            Ok::<_, LockError>(7)
        })
        .await
        .unwrap();

    assert_eq!(value, 7);
}

#[tokio::test]
async fn test_business_error_propagates_after_release() {
    let locker = locker();
    let store = Arc::new(MemoryStore::new());

    let result: Result<(), AppError> = locker
        .with_lock(Arc::clone(&store), "payment", 0.0, None, || async {
            Err(AppError::Declined)
        })
        .await;

    assert!(matches!(result, Err(AppError::Declined)));
    assert!(store.holder("payment").is_none());
    assert_eq!(store.release_calls(), 1);
}

#[tokio::test]
async fn test_lock_errors_convert_into_caller_error() {
    let locker = locker();
    let store = Arc::new(MemoryStore::new());
    store.insert("payment", &Token::from("other"), Duration::from_secs(30));

    let result: Result<(), AppError> = locker
        .with_lock(Arc::clone(&store), "payment", 0.0, None, || async { Ok(()) })
        .await;

    assert!(matches!(result, Err(AppError::Lock(LockError::Timeout(_)))));
}

#[tokio::test]
async fn test_panicking_business_logic_releases_lock() {
    let locker = locker();
    let store = Arc::new(MemoryStore::new());

    let task = {
        let locker = locker.clone();
        let store = Arc::clone(&store);
        tokio::spawn(async move { locker.with_lock(store, "job", 0.0, None, explode).await })
    };

    assert!(task.await.unwrap_err().is_panic());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.holder("job").is_none());
}

#[tokio::test]
async fn test_aborted_business_logic_releases_lock() {
    let locker = locker();
    let store = Arc::new(MemoryStore::new());
    let started = Arc::new(tokio::sync::Notify::new());

    let task = {
        let locker = locker.clone();
        let store = Arc::clone(&store);
        let started = Arc::clone(&started);
        tokio::spawn(async move {
            locker
                .with_lock(store, "job", 0.0, None, || async move {
                    started.notify_one();
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<_, LockError>(())
                })
                .await
        })
    };

    started.notified().await;
    assert!(store.holder("job").is_some());
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.holder("job").is_none());
}

#[tokio::test]
async fn test_expired_holder_cannot_release_new_owner() {
    let locker = locker_with_ttl(Duration::from_millis(50));
    let store = Arc::new(MemoryStore::new());

    let stale = locker
        .acquire(Arc::clone(&store), "job", 0.0, Some("first"))
        .await
        .unwrap();
    assert_eq!(stale.validity(), Some(Duration::from_millis(50)));

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(stale.is_expired());

    let current = locker
        .acquire(Arc::clone(&store), "job", 0.0, Some("second"))
        .await
        .unwrap();

    assert!(!stale.release().await.unwrap());
    assert_eq!(store.holder("job"), Some(Token::from("second")));
    assert!(current.release().await.unwrap());
}

#[tokio::test]
async fn test_overrunning_logic_still_returns_result() {
    let locker = locker_with_ttl(Duration::from_millis(20));
    let store = Arc::new(MemoryStore::new());

    let value = locker
        .with_lock(Arc::clone(&store), "job", 0.0, None, || async {
            tokio::time::sleep(Duration::from_millis(60)).await;
            Ok::<_, LockError>("late")
        })
        .await
        .unwrap();

    assert_eq!(value, "late");
}

#[tokio::test]
async fn test_redis_lock_without_store_is_configuration_error() {
    let locker = locker();

    let result: Result<(), LockError> = locker
        .redis_lock("job", DEFAULT_STORE_TIMEOUT, None, || async { Ok(()) })
        .await;

    assert!(matches!(result, Err(LockError::Configuration(_))));
}

#[tokio::test]
async fn test_flock_excludes_other_lockers_on_same_directory() {
    let dir = tempfile::tempdir().unwrap();
    let first = Locker::builder().file_directory(dir.path()).build().unwrap();
    let second = Locker::builder().file_directory(dir.path()).build().unwrap();

    let nested = first
        .flock("report", 0.0, || async {
            second
                .flock("report", 0.0, || async { Ok::<_, LockError>(()) })
                .await
        })
        .await;

    assert!(matches!(nested, Err(LockError::Timeout(_))));

    second
        .flock("report", 0.0, || async { Ok::<_, LockError>(()) })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_channel_lock_is_shared_between_clones() {
    let locker = locker();
    let clone = locker.clone();

    let nested = locker
        .channel_lock("job", INFINITE_TIMEOUT, || async {
            clone
                .channel_lock("job", 0.0, || async { Ok::<_, LockError>(()) })
                .await
        })
        .await;

    assert!(matches!(nested, Err(LockError::Timeout(_))));
}
