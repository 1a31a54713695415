//! An optimistic-transaction Redis backend: WATCH the relevant keys,
//! read them plus the server's own clock, compute the new states
//! locally, then commit with MULTI/EXEC. A concurrent writer touching
//! any watched key aborts the EXEC; we retry with a bounded,
//! exponentially-backed-off number of attempts rather than spinning
//! forever, surfacing a transport error once exhausted.

use crate::codec::{get_codec, FullCodec};
use crate::config::LimitTable;
use crate::core::{self, LeakResult};
use crate::error::{ConfigWarning, RateLimiterError, Result};
use crate::model::{RateLimit, Response, State};
use crate::rate_limiter::{already_configured_error, not_configured_error, RateLimiter};
use crate::redis_support::KeyFormatter;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::thread;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 8;
const BASE_BACKOFF: Duration = Duration::from_millis(2);

pub struct RedisTransactionalRateLimiter {
    client: redis::Client,
    key_formatter: KeyFormatter,
    codec: Box<dyn FullCodec>,
    table: OnceLock<LimitTable>,
    conn: Mutex<Option<redis::Connection>>,
}

impl RedisTransactionalRateLimiter {
    pub fn new(redis_url: &str) -> Result<Self> {
        Self::with_codec_and_key_format(redis_url, crate::codec::DEFAULT_CODEC, None)
    }

    pub fn with_codec_and_key_format(
        redis_url: &str,
        codec: &str,
        key_format: Option<&str>,
    ) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let codec = get_codec(codec)
            .ok_or_else(|| RateLimiterError::Configuration(format!("unknown codec '{codec}'")))?;
        let key_formatter = match key_format {
            Some(fmt) => KeyFormatter::new(fmt)?,
            None => KeyFormatter::default(),
        };
        Ok(RedisTransactionalRateLimiter {
            client,
            key_formatter,
            codec,
            table: OnceLock::new(),
            conn: Mutex::new(None),
        })
    }

    fn with_connection<T>(&self, f: impl FnOnce(&mut redis::Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.conn.lock().unwrap();
        if guard.is_none() {
            *guard = Some(self.client.get_connection()?);
        }
        f(guard.as_mut().unwrap())
    }
}

struct Req<'a> {
    limit: &'a RateLimit,
    rkey: String,
}

impl RateLimiter for RedisTransactionalRateLimiter {
    fn configure(&self, limits: Vec<RateLimit>) -> Result<Vec<ConfigWarning>> {
        let (table, warnings) = LimitTable::build(limits)?;
        if self.table.set(table).is_err() {
            return Err(already_configured_error());
        }
        tracing::info!("transactional redis rate limiter configured");
        Ok(warnings)
    }

    fn request(&self, keys: &HashMap<String, String>) -> Result<Response> {
        if keys.is_empty() {
            return Ok(Response::accepted(0.0));
        }

        let table = self.table.get().ok_or_else(not_configured_error)?;

        let mut reqs = Vec::with_capacity(keys.len());
        for (limit_name, key) in keys {
            let limit = table.get(limit_name)?;
            let rkey = self.key_formatter.format(&limit.zone.name, key);
            reqs.push(Req { limit, rkey });
        }
        let rkeys: Vec<&str> = reqs.iter().map(|r| r.rkey.as_str()).collect();

        self.with_connection(|conn| {
            for attempt in 0..MAX_ATTEMPTS {
                redis::cmd("WATCH").arg(&rkeys).query::<()>(conn)?;

                let raws: Vec<Option<Vec<u8>>> = redis::cmd("MGET").arg(&rkeys).query(conn)?;
                let (t_s, t_us): (i64, i64) = redis::cmd("TIME").query(conn)?;
                let now = t_s as f64 + (t_us as f64) / 1_000_000.0;

                let mut delay = 0.0_f64;
                let mut writes: Vec<(&str, State, u64)> = Vec::with_capacity(reqs.len());
                let mut rejected = false;
                for (req, raw) in reqs.iter().zip(raws.iter()) {
                    let prior = self.codec.decode(raw.as_deref());
                    match core::apply(req.limit, prior, now) {
                        LeakResult::Rejected => {
                            rejected = true;
                            break;
                        }
                        LeakResult::Accepted { new_state, delay: d } => {
                            delay = delay.max(d);
                            writes.push((req.rkey.as_str(), new_state, req.limit.zone.expiry));
                        }
                    }
                }

                if rejected {
                    redis::cmd("UNWATCH").query::<()>(conn)?;
                    return Ok(Response::rejected());
                }

                let mut pipe = redis::pipe();
                pipe.atomic();
                for (rkey, state, expiry) in &writes {
                    pipe.cmd("SETEX")
                        .arg(*rkey)
                        .arg(*expiry)
                        .arg(self.codec.encode(*state))
                        .ignore();
                }

                let committed: Option<()> = pipe.query(conn)?;
                match committed {
                    Some(()) => return Ok(Response::accepted(delay)),
                    None => {
                        tracing::warn!(attempt, "watch conflict, retrying transaction");
                        thread::sleep(BASE_BACKOFF * 2u32.saturating_pow(attempt));
                    }
                }
            }

            Err(RateLimiterError::Environment(format!(
                "exhausted {MAX_ATTEMPTS} attempts to commit rate-limit transaction under contention"
            )))
        })
    }

    fn get_state(&self, zone: &str, key: &str) -> Result<Option<State>> {
        let rkey = self.key_formatter.format(zone, key);
        self.with_connection(|conn| {
            let raw: Option<Vec<u8>> = redis::cmd("GET").arg(&rkey).query(conn)?;
            Ok(self.codec.decode(raw.as_deref()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_codec_name_as_configuration_error() {
        let err = RedisTransactionalRateLimiter::with_codec_and_key_format(
            "redis://127.0.0.1/",
            "bogus",
            None,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "configuration error: unknown codec 'bogus'");
    }

    #[test]
    fn rejects_malformed_key_format_at_construction() {
        let err = RedisTransactionalRateLimiter::with_codec_and_key_format(
            "redis://127.0.0.1/",
            "struct",
            Some("nozone:{key}"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("missing required placeholder"));
    }
}
