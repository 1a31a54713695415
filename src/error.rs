//! Error types returned by rate limiter configuration and requests.

use thiserror::Error;

/// Errors produced while configuring or operating a rate limiter.
#[derive(Debug, Error)]
pub enum RateLimiterError {
    /// The limit set passed to `configure` is internally inconsistent
    /// (e.g. two limits name the same zone, or a key format string
    /// references the wrong placeholders).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// `configure` was called on an already-configured limiter, or
    /// `request`/`get_state` was called before `configure`.
    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    /// A request referenced a limit name that was never configured.
    #[error("unknown limit name: {0:?}")]
    UnknownLimit(String),

    /// The remote store is reachable but does not satisfy a hard
    /// requirement of the backend (e.g. below `MIN_VERSION`).
    #[error("environment error: {0}")]
    Environment(String),

    /// Opaque pass-through of a transport-level failure talking to the
    /// remote store.
    #[error("transport error: {0}")]
    Transport(#[from] redis::RedisError),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RateLimiterError>;

/// A non-fatal finding surfaced by `configure` out-of-band from the
/// error channel: the limiter still configures successfully, but the
/// caller should know about it.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigWarning {
    /// A zone's expiry is shorter than the minimum needed to hold a
    /// limit's worst-case backlog, so state could be evicted from the
    /// store before it naturally drains.
    ExpiryBelowRecommended {
        zone: String,
        limit: String,
        expiry: u64,
        recommended: u64,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::ExpiryBelowRecommended {
                zone,
                limit,
                expiry,
                recommended,
            } => write!(
                f,
                "Expiry for zone '{zone}' is less than recommended minimum for limit '{limit}': expiry={expiry}, recommended={recommended}"
            ),
        }
    }
}
