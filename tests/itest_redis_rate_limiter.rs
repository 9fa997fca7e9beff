#![cfg(feature = "redis-tokio")]

use std::{env, sync::Arc, time::Duration};

use redis::AsyncCommands;

use quotaline::redis::{RedisWindowClient, RedisWindowStore};
use quotaline::{QuotalineError, RateLimitDecision, RateLimiter, RateLimiterOptions, RedisKey};

fn redis_url() -> Option<String> {
    env::var("REDIS_URL").ok()
}

fn unique_prefix() -> RedisKey {
    let n: u64 = rand::random();
    RedisKey::try_from(format!("quotaline_test_{n}")).unwrap()
}

async fn build_rate_limiter(
    url: &str,
    prefix: RedisKey,
    limit: u64,
    window: Duration,
    worker_count: usize,
) -> Arc<RateLimiter<RedisWindowStore>> {
    let client = redis::Client::open(url).unwrap();
    let client = RedisWindowClient::from_client(client, 2).await.unwrap();

    Arc::new(
        RateLimiter::redis(
            client,
            RateLimiterOptions {
                prefix: Some(prefix),
                limit,
                window,
                task_timeout: Duration::from_secs(5),
                worker_count,
                ..Default::default()
            },
        )
        .unwrap(),
    )
}

#[test]
fn first_call_allowed_rest_rejected_within_window() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let rl = build_rate_limiter(&url, unique_prefix(), 1, Duration::from_secs(1), 1).await;

        assert_eq!(rl.allow("k").await.unwrap(), RateLimitDecision::Allowed);

        for _ in 0..3 {
            let d = rl.allow("k").await.unwrap();
            assert!(matches!(d, RateLimitDecision::Rejected { .. }));
        }
    });
}

#[test]
fn window_expiry_admits_again() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let rl = build_rate_limiter(&url, unique_prefix(), 1, Duration::from_millis(200), 1).await;

        assert!(rl.allow("k").await.unwrap().is_allowed());
        assert!(!rl.allow("k").await.unwrap().is_allowed());

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(rl.allow("k").await.unwrap().is_allowed());
    });
}

#[test]
fn hundred_concurrent_callers_one_admission() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap();

    rt.block_on(async {
        let rl = build_rate_limiter(&url, unique_prefix(), 1, Duration::from_secs(5), 16).await;

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let rl = Arc::clone(&rl);
                tokio::spawn(async move { rl.allow("hot").await })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_allowed() {
                allowed += 1;
            }
        }

        assert_eq!(allowed, 1);
    });
}

#[test]
fn two_limiters_share_one_budget() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let prefix = unique_prefix();
        let a = build_rate_limiter(&url, prefix.clone(), 2, Duration::from_secs(5), 2).await;
        let b = build_rate_limiter(&url, prefix, 2, Duration::from_secs(5), 2).await;

        assert!(a.allow("k").await.unwrap().is_allowed());
        assert!(b.allow("k").await.unwrap().is_allowed());
        assert!(!a.allow("k").await.unwrap().is_allowed());
        assert!(!b.allow("k").await.unwrap().is_allowed());
    });
}

#[test]
fn start_marker_and_count_share_expiry() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let prefix = unique_prefix();
        let rl = build_rate_limiter(&url, prefix.clone(), 5, Duration::from_secs(10), 1).await;

        rl.allow("k").await.unwrap();
        rl.allow("k").await.unwrap();

        let client = redis::Client::open(url.as_str()).unwrap();
        let mut conn = client.get_multiplexed_async_connection().await.unwrap();

        let start_key = format!("{}:k:time", &**prefix);
        let count_key = format!("{}:k:count", &**prefix);

        let start_ttl: i64 = conn.pttl(&start_key).await.unwrap();
        let count_ttl: i64 = conn.pttl(&count_key).await.unwrap();
        let len: u64 = conn.llen(&count_key).await.unwrap();

        assert!(start_ttl > 0 && start_ttl <= 10_000);
        assert!((start_ttl - count_ttl).abs() < 50);
        assert_eq!(len, 2);
    });
}

#[test]
fn zero_connections_is_rejected() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let client = redis::Client::open("redis://127.0.0.1:6379/").unwrap();
        let result = RedisWindowClient::from_client(client, 0).await;

        assert!(matches!(
            result,
            Err(QuotalineError::InvalidRedisClientConnectionCount(_))
        ));
    });
}
