//! Runs against a real Redis. Needs `REDIS_URL`:
//!
//! ```sh
//! REDIS_URL=redis://127.0.0.1/ cargo test -p convene-store -- --ignored
//! ```

use convene_store::RedisClient;
use std::time::Duration;

fn redis_url() -> String {
    std::env::var("REDIS_URL").expect("REDIS_URL must be set")
}

async fn ttl(key: &str) -> i64 {
    let client = redis::Client::open(redis_url()).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    redis::cmd("TTL").arg(key).query_async(&mut conn).await.unwrap()
}

#[tokio::test]
#[ignore]
async fn test_window_expiry_is_not_pushed_back_by_later_hits() {
    let limiter = RedisClient::new(&redis_url()).unwrap();
    let key = format!("ratelimit:test-{}", uuid::Uuid::new_v4());

    assert!(limiter.check_rate_limit(&key, 2, 60).await.unwrap());
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(limiter.check_rate_limit(&key, 2, 60).await.unwrap());

    // Still counting down from the first hit.
    assert!(ttl(&key).await < 60);

    assert!(!limiter.check_rate_limit(&key, 2, 60).await.unwrap());
}

#[tokio::test]
#[ignore]
async fn test_window_resets_after_expiry() {
    let limiter = RedisClient::new(&redis_url()).unwrap();
    let key = format!("ratelimit:test-{}", uuid::Uuid::new_v4());

    assert!(limiter.check_rate_limit(&key, 1, 1).await.unwrap());
    assert!(!limiter.check_rate_limit(&key, 1, 1).await.unwrap());
    tokio::time::sleep(Duration::from_millis(2100)).await;

    assert!(limiter.check_rate_limit(&key, 1, 1).await.unwrap());
}
