//! Pieces shared by both Redis-backed backends: remote key formatting
//! and the minimum-server-version probe the scripted backend needs for
//! `redis.replicate_commands()` support.

use crate::config::validate_key_format;
use crate::error::{RateLimiterError, Result};

pub const DEFAULT_KEY_FORMAT: &str = "redbucket:{zone}:{key}";

/// `(major, minor)` -- the oldest server version known to support
/// `redis.replicate_commands()`, required by the scripted backend.
pub const MIN_VERSION: (u32, u32) = (3, 2);

/// Renders `{zone}`/`{key}` placeholders into a backend's remote key
/// namespace, validated once at construction time.
#[derive(Debug, Clone)]
pub struct KeyFormatter {
    template: String,
}

impl KeyFormatter {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        validate_key_format(&template)?;
        Ok(KeyFormatter { template })
    }

    pub fn format(&self, zone: &str, key: &str) -> String {
        self.template.replace("{zone}", zone).replace("{key}", key)
    }
}

impl Default for KeyFormatter {
    fn default() -> Self {
        KeyFormatter::new(DEFAULT_KEY_FORMAT).expect("default key format is always valid")
    }
}

/// Queries `INFO server` and parses the `redis_version:` line into a
/// `(major, minor)` tuple for a lexicographic comparison against
/// [`MIN_VERSION`].
pub fn check_min_version(conn: &mut redis::Connection, min: (u32, u32)) -> Result<()> {
    let info: String = redis::cmd("INFO").arg("server").query(conn)?;
    let version = parse_redis_version(&info).ok_or_else(|| {
        RateLimiterError::Environment("could not determine redis_version from INFO".to_string())
    })?;
    if version < min {
        return Err(RateLimiterError::Environment(format!(
            "redis server version {}.{} is below the required minimum {}.{}",
            version.0, version.1, min.0, min.1
        )));
    }
    Ok(())
}

fn parse_redis_version(info: &str) -> Option<(u32, u32)> {
    for line in info.lines() {
        if let Some(rest) = line.strip_prefix("redis_version:") {
            let mut parts = rest.trim().split('.');
            let major: u32 = parts.next()?.parse().ok()?;
            let minor: u32 = parts.next()?.parse().ok()?;
            return Some((major, minor));
        }
    }
    None
}
