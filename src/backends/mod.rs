//! The three interchangeable backends, all implementing
//! [`crate::rate_limiter::RateLimiter`] against the same
//! [`crate::core::apply`] admission rule.

pub mod in_memory;
pub mod scripted;
pub mod transactional;

pub use in_memory::InMemoryRateLimiter;
pub use scripted::RedisScriptRateLimiter;
pub use transactional::RedisTransactionalRateLimiter;
