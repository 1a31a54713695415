//! # redbucket - a multi-zone leaky-bucket rate limiter
//!
//! A leaky-bucket admission controller with pluggable backends that
//! all implement the identical [`core::apply`] formula: an in-process
//! backend for single-instance use, and two Redis-backed backends
//! ([`backends::RedisTransactionalRateLimiter`] using optimistic
//! WATCH/MULTI/EXEC transactions, [`backends::RedisScriptRateLimiter`]
//! using a single server-side Lua script) for coordinating across
//! processes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     RateLimiter (trait)                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │   InMemoryRateLimiter   │  RedisTransactional  │  RedisScript │
//! │   per-zone Mutex        │  WATCH/MGET/MULTI     │  one Lua    │
//! │   stable zone-id        │  /SETEX/EXEC, bounded │  script,    │
//! │   lock ordering         │  retry with backoff   │  no retry   │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                 core::apply (shared admission formula)
//! ```
//!
//! ## Core Components
//!
//! - [`model`] - `Zone`, `RateLimit`, `State`, `Response`
//! - [`codec`] - pluggable wire encodings (`struct`, `json`) with Lua equivalents
//! - [`core`] - the leaky-bucket admission formula, backend-agnostic
//! - [`config`] - `configure`-time validation shared by every backend
//! - [`rate_limiter`] - the `RateLimiter` trait and lifecycle errors
//! - [`backends`] - the three concrete implementations
//! - [`redis_support`] - key-format rendering and server version checks
//! - [`error`] - the error and warning types every operation returns
//!
//! ## Quick Start
//!
//! ```rust
//! use redbucket::backends::InMemoryRateLimiter;
//! use redbucket::model::{RateLimit, Zone};
//! use redbucket::rate_limiter::RateLimiter;
//! use std::collections::HashMap;
//!
//! let limiter = InMemoryRateLimiter::new();
//! limiter
//!     .configure(vec![RateLimit::new("api", Zone::new("per-user", 1.0)).with_burst(5.0)])
//!     .unwrap();
//!
//! let mut keys = HashMap::new();
//! keys.insert("api".to_string(), "user-42".to_string());
//! let response = limiter.request(&keys).unwrap();
//! assert!(response.accepted);
//! ```

pub mod backends;
pub mod codec;
pub mod config;
pub mod core;
pub mod error;
pub mod model;
pub mod rate_limiter;
pub mod redis_support;

pub use error::{ConfigWarning, RateLimiterError, Result};
pub use model::{RateLimit, Response, State, Zone};
pub use rate_limiter::RateLimiter;

/// Version of the redbucket library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
