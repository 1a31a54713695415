//! The common contract every backend implements, and the two-phase
//! configure-then-request lifecycle shared by all of them.
//!
//! A limiter starts unconfigured. `configure` validates and installs a
//! limit set exactly once; calling it again, or calling `request`/
//! `get_state` before it has run, is a lifecycle error rather than a
//! panic -- callers get a normal `Result` back either way.

use crate::error::{ConfigWarning, RateLimiterError, Result};
use crate::model::{RateLimit, Response, State};
use std::collections::HashMap;

/// Implemented by every backend (in-process, Redis transactional,
/// Redis scripted). `request` takes a caller-supplied map from limit
/// name to the per-caller key that limit should be evaluated against;
/// a request may reference any subset of the configured limits.
pub trait RateLimiter {
    fn configure(&self, limits: Vec<RateLimit>) -> Result<Vec<ConfigWarning>>;
    fn request(&self, keys: &HashMap<String, String>) -> Result<Response>;
    fn get_state(&self, zone: &str, key: &str) -> Result<Option<State>>;
}

/// Error text shared verbatim across backends so the lifecycle errors
/// a caller sees don't vary by which backend they picked.
pub fn already_configured_error() -> RateLimiterError {
    RateLimiterError::Lifecycle("Rate limiter already configured".to_string())
}

pub fn not_configured_error() -> RateLimiterError {
    RateLimiterError::Lifecycle("Rate limiter not configured".to_string())
}
