//! Integration tests against a real Redis server.
//!
//! Ignored by default. Run them with `TURNSTILE_REDIS_URL` pointing at a
//! server, e.g.
//! `TURNSTILE_REDIS_URL=redis://127.0.0.1:6379/ cargo test -- --ignored`.

use std::sync::Arc;
use std::time::Duration;

use turnstile::ratelimit::{Backend, KeyBuilder, RateLimiter, RateSpec};
use turnstile::store::RedisBackend;

fn redis_url() -> String {
    std::env::var("TURNSTILE_REDIS_URL")
        .expect("TURNSTILE_REDIS_URL must point at a Redis server to run ignored tests")
}

async fn backend() -> Arc<RedisBackend> {
    Arc::new(
        RedisBackend::connect(&redis_url())
            .await
            .expect("Failed to connect to Redis"),
    )
}

/// A prefix per test run so reruns never see each other's windows.
fn limiter(backend: Arc<RedisBackend>) -> RateLimiter<RedisBackend> {
    let prefix = format!("turnstile-test-{}", uuid::Uuid::new_v4());
    RateLimiter::with_keys(backend, KeyBuilder::new(prefix).unwrap())
}

#[tokio::test]
#[ignore = "needs a Redis server at TURNSTILE_REDIS_URL"]
async fn test_quota_then_denial() {
    let backend = backend().await;
    let limiter = limiter(backend);
    let spec = RateSpec::new(5, Duration::from_secs(60)).unwrap();

    for i in 1..=5 {
        let decision = limiter.try_acquire("burst", &spec).await.unwrap();
        assert!(decision.admitted, "Request {} should be admitted", i);
        assert_eq!(decision.in_window, i);
    }

    let denied = limiter.try_acquire("burst", &spec).await.unwrap();
    assert!(!denied.admitted);
    assert!(denied.retry_after > Duration::from_secs(55));
    assert!(denied.retry_after <= Duration::from_secs(60));

    // Denial left the window untouched
    assert_eq!(limiter.window_count("burst", &spec).await.unwrap(), 5);
    let again = limiter.try_acquire("burst", &spec).await.unwrap();
    assert!(again.retry_after <= denied.retry_after);
}

#[tokio::test]
#[ignore = "needs a Redis server at TURNSTILE_REDIS_URL"]
async fn test_window_expiry_discards_stale_entries() {
    let backend = backend().await;
    let limiter = limiter(backend);
    let spec = RateSpec::new(3, Duration::from_millis(300)).unwrap();

    for _ in 0..3 {
        assert!(limiter.try_acquire("expiry", &spec).await.unwrap().admitted);
    }
    assert!(!limiter.try_acquire("expiry", &spec).await.unwrap().admitted);

    tokio::time::sleep(Duration::from_millis(350)).await;

    let decision = limiter.try_acquire("expiry", &spec).await.unwrap();
    assert!(decision.admitted);
    assert_eq!(decision.in_window, 1);
}

#[tokio::test]
#[ignore = "needs a Redis server at TURNSTILE_REDIS_URL"]
async fn test_acquire_waits_for_free_slot() {
    let backend = backend().await;
    let limiter = limiter(backend);
    let spec = RateSpec::new(1, Duration::from_millis(500)).unwrap();

    let first = limiter.acquire("wait", &spec).await.unwrap();
    assert_eq!(first.attempts, 1);

    let second = limiter.acquire("wait", &spec).await.unwrap();
    assert!(second.attempts >= 2);
    assert!(second.waited >= Duration::from_millis(400));
}

#[tokio::test]
#[ignore = "needs a Redis server at TURNSTILE_REDIS_URL"]
async fn test_concurrent_limiters_never_over_admit() {
    let backend = backend().await;
    let prefix = format!("turnstile-test-{}", uuid::Uuid::new_v4());
    let spec = RateSpec::new(10, Duration::from_secs(60)).unwrap();

    // Separate limiters, as separate processes would have
    let handles: Vec<_> = (0..40)
        .map(|_| {
            let limiter =
                RateLimiter::with_keys(backend.clone(), KeyBuilder::new(prefix.clone()).unwrap());
            tokio::spawn(async move { limiter.try_acquire("crowd", &spec).await })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().admitted {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 10);
}

#[tokio::test]
#[ignore = "needs a Redis server at TURNSTILE_REDIS_URL"]
async fn test_keys_do_not_share_quota() {
    let backend = backend().await;
    let limiter = limiter(backend);
    let spec = RateSpec::new(1, Duration::from_secs(60)).unwrap();

    assert!(limiter.try_acquire("left", &spec).await.unwrap().admitted);
    assert!(!limiter.try_acquire("left", &spec).await.unwrap().admitted);
    assert!(limiter.try_acquire("right", &spec).await.unwrap().admitted);
}

#[tokio::test]
#[ignore = "needs a Redis server at TURNSTILE_REDIS_URL"]
async fn test_key_ttl_set_on_admission() {
    let backend = backend().await;
    let url = redis_url();
    let limiter = limiter(backend);
    let spec = RateSpec::new(2, Duration::from_secs(30)).unwrap();

    limiter.try_acquire("ttl", &spec).await.unwrap();

    let key = limiter.keys().build("ttl").unwrap();
    let client = redis::Client::open(url).unwrap();
    let mut con = client.get_multiplexed_tokio_connection().await.unwrap();
    let ttl_ms: i64 = redis::cmd("PTTL")
        .arg(key.as_str())
        .query_async(&mut con)
        .await
        .unwrap();
    assert!(ttl_ms > 25_000 && ttl_ms <= 30_000, "unexpected TTL {}", ttl_ms);
}

#[tokio::test]
#[ignore = "needs a Redis server at TURNSTILE_REDIS_URL"]
async fn test_server_time_is_recent() {
    let backend = backend().await;
    let now = backend.server_time().await.unwrap();
    // After 2020-01-01
    assert!(now > Duration::from_secs(1_577_836_800));
}
