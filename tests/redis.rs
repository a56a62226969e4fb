//! Tests against a live Redis server.
//!
//! Run with `REDIS_URL=redis://127.0.0.1:6379 cargo test -- --ignored`.

use std::time::Duration;

use redrate::config::{RedrateConfig, StoreConfig};
use redrate::store::RedisStore;
use redrate::{Limit, RateLimiter, RedrateError};

fn redis_config(prefix: &str) -> RedrateConfig {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let mut config = RedrateConfig::default();
    config.stores = vec![StoreConfig::with_url(url)];
    config.limiter.key_prefix = format!("redrate-test:{}:{}:", prefix, std::process::id());
    config
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn test_redis_scenario_per_second_two() {
    let limiter = RateLimiter::connect(&redis_config("scenario")).await.unwrap();
    let limit = Limit::per_second(2);
    limiter.reset("u1").await.unwrap();

    let first = limiter.allow("u1", limit).await.unwrap();
    assert_eq!((first.allowed, first.remaining), (1, 1));
    assert_eq!(first.retry_after, None);

    let second = limiter.allow("u1", limit).await.unwrap();
    assert_eq!((second.allowed, second.remaining), (1, 0));

    let third = limiter.allow("u1", limit).await.unwrap();
    assert_eq!((third.allowed, third.remaining), (0, 0));
    let retry = third.retry_after.unwrap();
    assert!(retry > Duration::from_millis(400) && retry <= Duration::from_millis(500));

    limiter.reset("u1").await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn test_redis_allow_at_most_and_reset() {
    let limiter = RateLimiter::connect(&redis_config("at-most")).await.unwrap();
    let limit = Limit::per_minute(100);
    limiter.reset("bulk").await.unwrap();

    let result = limiter.allow_at_most("bulk", limit, 1000).await.unwrap();
    assert_eq!(result.allowed, 100);

    assert_eq!(limiter.allow("bulk", limit).await.unwrap().allowed, 0);
    limiter.reset("bulk").await.unwrap();
    assert_eq!(limiter.allow("bulk", limit).await.unwrap().allowed, 1);

    limiter.reset("bulk").await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn test_redis_reset_after_single_allow() {
    let limiter = RateLimiter::connect(&redis_config("reset-after")).await.unwrap();
    limiter.reset("once").await.unwrap();

    let result = limiter.allow("once", Limit::per_second(1)).await.unwrap();
    let reset = result.reset_after.as_secs_f64();
    assert!((reset - 1.0).abs() < 1e-6, "reset_after was {}", reset);

    limiter.reset("once").await.unwrap();
}

#[tokio::test]
async fn test_unreachable_store_fails_fast() {
    let mut store = StoreConfig::with_url("redis://127.0.0.1:1");
    store.connect_timeout_ms = 500;
    let result = RedisStore::connect(&store).await;
    assert!(matches!(
        result,
        Err(RedrateError::Store(_)) | Err(RedrateError::Timeout(_))
    ));
}

#[tokio::test]
async fn test_out_of_range_store_index() {
    let mut config = RedrateConfig::default();
    config.limiter.store = 2;
    let result = RateLimiter::connect(&config).await;
    assert!(matches!(result, Err(RedrateError::Config(_))));
}
