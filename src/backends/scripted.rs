//! A server-side Lua backend: one round trip per request, no retry
//! loop needed because the whole admission decision runs atomically
//! inside Redis.
//!
//! All configured limits are baked into the script body as a literal
//! Lua table keyed by limit name; the script looks each one up by the
//! name passed in `ARGV`, so a single compiled script serves any
//! subset of limits a `request` call references.

use crate::codec::{get_codec, lua_escape, FullCodec};
use crate::config::LimitTable;
use crate::error::{ConfigWarning, RateLimiterError, Result};
use crate::model::{RateLimit, Response, State};
use crate::rate_limiter::{already_configured_error, not_configured_error, RateLimiter};
use crate::redis_support::{check_min_version, KeyFormatter, MIN_VERSION};
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

pub struct RedisScriptRateLimiter {
    client: redis::Client,
    key_formatter: KeyFormatter,
    codec: Box<dyn FullCodec>,
    table: OnceLock<LimitTable>,
    request_script: OnceLock<redis::Script>,
    get_script: OnceLock<redis::Script>,
    conn: Mutex<Option<redis::Connection>>,
}

impl RedisScriptRateLimiter {
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
        Ok(RedisScriptRateLimiter {
            client,
            key_formatter,
            codec,
            table: OnceLock::new(),
            request_script: OnceLock::new(),
            get_script: OnceLock::new(),
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

    fn build_request_script(table: &LimitTable, codec: &dyn FullCodec) -> redis::Script {
        let limits_table = render_limits_table(table);
        let decode = codec.lua_decode("raw", "t0", "v0");
        let encode = codec.lua_encode("t1", "nstates[i]");

        let source = format!(
            r#"assert(redis.replicate_commands(), "failed to enable effects replication")
local limits = {limits_table}
local values = redis.call("MGET", unpack(KEYS))
local time_result = redis.call("TIME")
local t1 = tonumber(time_result[1]) + tonumber(time_result[2]) / 1000000
local delay = 0
local nstates = {{}}
for i = 1, #KEYS do
  local name = ARGV[i]
  local limit = limits[name]
  local raw = values[i]
  {decode}
  if t0 == nil then t0 = t1 end
  if v0 == nil then v0 = 0 end
  local elapsed = t1 - t0
  local v1 = math.max(v0 - elapsed * limit.rate, 0) + 1
  local c = limit.burst + 1 - v1
  if c < -limit.delay then
    return false
  end
  if c < 0 then
    local d = -c / limit.rate
    if d > delay then delay = d end
  end
  nstates[i] = v1
end
for i = 1, #KEYS do
  local name = ARGV[i]
  local limit = limits[name]
  local encoded = {encode}
  redis.call("SETEX", KEYS[i], limit.expiry, encoded)
end
return tostring(delay)
"#,
            limits_table = limits_table,
            decode = decode,
            encode = encode,
        );

        redis::Script::new(&source)
    }

    fn build_get_script(codec: &dyn FullCodec) -> redis::Script {
        let decode = codec.lua_decode("raw", "t0", "v0");
        let source = format!(
            r#"local raw = redis.call("GET", KEYS[1])
{decode}
if t0 == nil then
  return false
end
return {{tostring(t0), tostring(v0)}}
"#,
            decode = decode,
        );
        redis::Script::new(&source)
    }
}

fn render_limits_table(table: &LimitTable) -> String {
    let mut entries = Vec::new();
    for name in table.limit_names() {
        let limit = table.get(name).expect("name came from this table");
        entries.push(format!(
            r#"["{name}"]={{rate={rate},burst={burst},delay={delay},expiry={expiry}}}"#,
            name = lua_escape(&limit.name),
            rate = limit.zone.rate,
            burst = limit.burst,
            delay = limit.delay,
            expiry = limit.zone.expiry,
        ));
    }
    format!("{{{}}}", entries.join(","))
}

impl RateLimiter for RedisScriptRateLimiter {
    fn configure(&self, limits: Vec<RateLimit>) -> Result<Vec<ConfigWarning>> {
        let (table, warnings) = LimitTable::build(limits)?;

        self.with_connection(|conn| check_min_version(conn, MIN_VERSION))?;

        let request_script = Self::build_request_script(&table, self.codec.as_ref());
        let get_script = Self::build_get_script(self.codec.as_ref());

        if self.table.set(table).is_err() {
            return Err(already_configured_error());
        }
        self.request_script
            .set(request_script)
            .expect("request_script initialized exactly once alongside table");
        self.get_script
            .set(get_script)
            .expect("get_script initialized exactly once alongside table");

        tracing::info!("scripted redis rate limiter configured");
        Ok(warnings)
    }

    fn request(&self, keys: &HashMap<String, String>) -> Result<Response> {
        if keys.is_empty() {
            return Ok(Response::accepted(0.0));
        }

        let table = self.table.get().ok_or_else(not_configured_error)?;
        let script = self.request_script.get().ok_or_else(not_configured_error)?;

        let mut rkeys = Vec::with_capacity(keys.len());
        let mut names = Vec::with_capacity(keys.len());
        for (limit_name, key) in keys {
            let limit = table.get(limit_name)?;
            rkeys.push(self.key_formatter.format(&limit.zone.name, key));
            names.push(limit_name.clone());
        }

        self.with_connection(|conn| {
            let mut invocation = script.prepare_invoke();
            for rkey in &rkeys {
                invocation = invocation.key(rkey);
            }
            for name in &names {
                invocation = invocation.arg(name);
            }
            let result: redis::Value = invocation.invoke(conn)?;
            match result {
                redis::Value::Nil => Ok(Response::rejected()),
                other => {
                    let text: String = redis::FromRedisValue::from_redis_value(&other)?;
                    let delay: f64 = text.parse().map_err(|_| {
                        RateLimiterError::Environment(format!(
                            "script returned non-numeric delay: {text:?}"
                        ))
                    })?;
                    Ok(Response::accepted(delay))
                }
            }
        })
    }

    fn get_state(&self, zone: &str, key: &str) -> Result<Option<State>> {
        let script = self.get_script.get().ok_or_else(not_configured_error)?;
        let rkey = self.key_formatter.format(zone, key);

        self.with_connection(|conn| {
            let result: redis::Value = script.key(&rkey).invoke(conn)?;
            match result {
                redis::Value::Nil => Ok(None),
                redis::Value::Bulk(items) if items.len() == 2 => {
                    let timestamp: String = redis::FromRedisValue::from_redis_value(&items[0])?;
                    let value: String = redis::FromRedisValue::from_redis_value(&items[1])?;
                    let timestamp: f64 = timestamp.parse().map_err(|_| {
                        RateLimiterError::Environment("malformed timestamp from get script".into())
                    })?;
                    let value: f64 = value.parse().map_err(|_| {
                        RateLimiterError::Environment("malformed value from get script".into())
                    })?;
                    Ok(Some(State::new(timestamp, value)))
                }
                other => Err(RateLimiterError::Environment(format!(
                    "unexpected get-state script result shape: {other:?}"
                ))),
            }
        })
    }
}
