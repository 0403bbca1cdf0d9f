//! Runs one job under a RedLock spread over the Redis servers in `REDIS_URLS`.
//!
//! ```text
//! REDIS_URLS=redis://127.0.0.1:6379,redis://127.0.0.1:6380,redis://127.0.0.1:6381 \
//!     RUST_LOG=locksmith=debug cargo run --example redlock_demo
//! ```

use std::time::Duration;

use locksmith::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), LockError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let urls: Vec<String> = std::env::var("REDIS_URLS")
        .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
        .split(',')
        .map(|url| url.trim().to_string())
        .collect();

    let nodes = RedisNodeBuilder::new().urls(&urls).build().await?;
    let locker = Locker::builder()
        .ttl(Duration::from_secs(10))
        .loop_policy(ExponentialBackoff::default())
        .quorum_nodes(nodes)
        .build()?;

    let receipt = locker
        .red_lock("demo:invoice", DEFAULT_STORE_TIMEOUT, None, || async {
            info!("holding the quorum lock, doing work");
            tokio::time::sleep(Duration::from_millis(250)).await;
            Ok::<_, LockError>("invoice sent")
        })
        .await?;

    info!(receipt, "done");
    Ok(())
}
