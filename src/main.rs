//! A thin, synchronous demo of the library: configures one zone with
//! a burst allowance and fires a handful of requests against it,
//! printing each decision. Not a server -- embedders call the crate
//! directly from their own request path.

use clap::Parser;
use redbucket::backends::{InMemoryRateLimiter, RedisScriptRateLimiter, RedisTransactionalRateLimiter};
use redbucket::model::{RateLimit, Zone};
use redbucket::rate_limiter::RateLimiter;
use std::collections::HashMap;

#[derive(Parser)]
#[command(about = "Demonstrates the redbucket leaky-bucket rate limiter")]
struct Args {
    /// Redis connection URL. When omitted, runs the in-process backend.
    #[arg(long)]
    redis_url: Option<String>,

    /// Use the server-side Lua script backend instead of the
    /// optimistic transaction backend. Only meaningful with --redis-url.
    #[arg(long)]
    scripted: bool,

    /// Requests per second the demo zone admits at steady state.
    #[arg(long, default_value_t = 1.0)]
    rate: f64,

    /// Extra requests admitted immediately above the steady rate.
    #[arg(long, default_value_t = 2.0)]
    burst: f64,

    /// How many requests to fire in a row.
    #[arg(long, default_value_t = 5)]
    requests: u32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let limits = vec![RateLimit::new("demo", Zone::new("demo-zone", args.rate)).with_burst(args.burst)];

    let limiter: Box<dyn RateLimiter> = match &args.redis_url {
        None => Box::new(InMemoryRateLimiter::new()),
        Some(url) if args.scripted => Box::new(RedisScriptRateLimiter::new(url)?),
        Some(url) => Box::new(RedisTransactionalRateLimiter::new(url)?),
    };

    let warnings = limiter.configure(limits)?;
    for warning in &warnings {
        tracing::warn!(%warning, "configuration warning");
    }

    let mut keys = HashMap::new();
    keys.insert("demo".to_string(), "client-1".to_string());

    for i in 0..args.requests {
        let response = limiter.request(&keys)?;
        println!(
            "request {i}: accepted={} delay={:?}",
            response.accepted, response.delay
        );
    }

    Ok(())
}
