//! Cross-backend conformance tests against a real Redis server.
//!
//! Gated behind the `redis-tests` feature and a reachable `REDIS_URL`
//! so `cargo test` stays hermetic by default:
//!
//! ```text
//! REDIS_URL=redis://localhost cargo test --features redis-tests --test redis_backends
//! ```

#![cfg(feature = "redis-tests")]

use redbucket::backends::{RedisScriptRateLimiter, RedisTransactionalRateLimiter};
use redbucket::model::{RateLimit, Zone};
use redbucket::rate_limiter::RateLimiter;
use std::collections::HashMap;

fn redis_url() -> Option<String> {
    std::env::var("REDIS_URL").ok()
}

fn unique_key_format(label: &str) -> String {
    format!("redbucket-test:{label}:{{zone}}:{{key}}", label = label)
}

#[test]
fn transactional_backend_admits_burst_then_rejects() {
    let Some(url) = redis_url() else {
        eprintln!("skipping: REDIS_URL not set");
        return;
    };

    let limiter = RedisTransactionalRateLimiter::with_codec_and_key_format(
        &url,
        "struct",
        Some(&unique_key_format("tx")),
    )
    .expect("connect");

    limiter
        .configure(vec![RateLimit::new("k1", Zone::new("z1", 1.0)).with_burst(1.0)])
        .expect("configure");

    let mut keys = HashMap::new();
    keys.insert("k1".to_string(), "client".to_string());

    assert!(limiter.request(&keys).unwrap().accepted);
    assert!(limiter.request(&keys).unwrap().accepted);
    assert!(!limiter.request(&keys).unwrap().accepted);
}

#[test]
fn scripted_backend_matches_transactional_backend_on_the_same_sequence() {
    let Some(url) = redis_url() else {
        eprintln!("skipping: REDIS_URL not set");
        return;
    };

    let limiter = RedisScriptRateLimiter::with_codec_and_key_format(
        &url,
        "json",
        Some(&unique_key_format("script")),
    )
    .expect("connect");

    limiter
        .configure(vec![RateLimit::new("k1", Zone::new("z1", 1.0)).with_burst(1.0)])
        .expect("configure");

    let mut keys = HashMap::new();
    keys.insert("k1".to_string(), "client".to_string());

    assert!(limiter.request(&keys).unwrap().accepted);
    assert!(limiter.request(&keys).unwrap().accepted);
    assert!(!limiter.request(&keys).unwrap().accepted);
}

#[test]
fn get_state_reflects_the_most_recent_request() {
    let Some(url) = redis_url() else {
        eprintln!("skipping: REDIS_URL not set");
        return;
    };

    let limiter = RedisTransactionalRateLimiter::with_codec_and_key_format(
        &url,
        "struct",
        Some(&unique_key_format("state")),
    )
    .expect("connect");

    limiter
        .configure(vec![RateLimit::new("k1", Zone::new("z1", 1.0)).with_burst(3.0)])
        .expect("configure");

    assert!(limiter.get_state("z1", "client").unwrap().is_none());

    let mut keys = HashMap::new();
    keys.insert("k1".to_string(), "client".to_string());
    limiter.request(&keys).unwrap();

    assert!(limiter.get_state("z1", "client").unwrap().is_some());
}
