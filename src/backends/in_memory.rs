//! A single-process backend: one `Mutex`-guarded bucket map per zone.
//!
//! A request may need to touch several zones at once. To stay
//! deadlock-free under concurrent multi-zone requests, every zone is
//! assigned a stable id at `configure` time and locks are always
//! acquired in ascending id order, regardless of the order limit names
//! were passed in.

use crate::config::LimitTable;
use crate::core::{self, LeakResult};
use crate::error::{ConfigWarning, Result};
use crate::model::{RateLimit, Response, State};
use crate::rate_limiter::{already_configured_error, not_configured_error, RateLimiter};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::Instant;

type ZoneBuckets = HashMap<String, State>;

pub struct InMemoryRateLimiter {
    table: OnceLock<LimitTable>,
    zones: OnceLock<Vec<Mutex<ZoneBuckets>>>,
    start: Instant,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        InMemoryRateLimiter {
            table: OnceLock::new(),
            zones: OnceLock::new(),
            start: Instant::now(),
        }
    }

    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for InMemoryRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

struct Req<'a> {
    limit: &'a RateLimit,
    zone_id: usize,
    key: String,
}

impl RateLimiter for InMemoryRateLimiter {
    fn configure(&self, limits: Vec<RateLimit>) -> Result<Vec<ConfigWarning>> {
        let (table, warnings) = LimitTable::build(limits)?;
        let zone_count = table.zone_count();
        if self.table.set(table).is_err() {
            return Err(already_configured_error());
        }
        let zones = (0..zone_count).map(|_| Mutex::new(HashMap::new())).collect();
        self.zones
            .set(zones)
            .expect("zones initialized exactly once alongside table");
        tracing::info!(zones = zone_count, "in-process rate limiter configured");
        Ok(warnings)
    }

    fn request(&self, keys: &HashMap<String, String>) -> Result<Response> {
        if keys.is_empty() {
            return Ok(Response::accepted(0.0));
        }

        let table = self.table.get().ok_or_else(not_configured_error)?;
        let zones = self.zones.get().expect("zones set alongside table");

        let mut reqs = Vec::with_capacity(keys.len());
        for (limit_name, key) in keys {
            let limit = table.get(limit_name)?;
            let zone_id = table.zone_id(&limit.zone.name);
            reqs.push(Req {
                limit,
                zone_id,
                key: key.clone(),
            });
        }

        let mut zone_ids: Vec<usize> = reqs.iter().map(|r| r.zone_id).collect();
        zone_ids.sort_unstable();
        zone_ids.dedup();

        let mut guards: HashMap<usize, MutexGuard<'_, ZoneBuckets>> = HashMap::new();
        for zone_id in zone_ids {
            guards.insert(zone_id, zones[zone_id].lock().unwrap());
        }

        let now = self.now();
        let mut delay = 0.0_f64;
        let mut writes = Vec::with_capacity(reqs.len());
        for req in &reqs {
            let guard = guards.get(&req.zone_id).unwrap();
            let prior = guard.get(&req.key).copied();
            match core::apply(req.limit, prior, now) {
                LeakResult::Rejected => {
                    tracing::debug!(limit = %req.limit.name, "request rejected");
                    return Ok(Response::rejected());
                }
                LeakResult::Accepted { new_state, delay: d } => {
                    delay = delay.max(d);
                    writes.push((req.zone_id, req.key.clone(), new_state));
                }
            }
        }

        for (zone_id, key, state) in writes {
            guards.get_mut(&zone_id).unwrap().insert(key, state);
        }

        Ok(Response::accepted(delay))
    }

    fn get_state(&self, zone: &str, key: &str) -> Result<Option<State>> {
        let table = self.table.get().ok_or_else(not_configured_error)?;
        let zones = self.zones.get().expect("zones set alongside table");
        let Some(zone_id) = table.zone_id_opt(zone) else {
            return Ok(None);
        };
        let guard = zones[zone_id].lock().unwrap();
        Ok(guard.get(key).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Zone;

    fn limits() -> Vec<RateLimit> {
        vec![RateLimit::new("k1", Zone::new("z1", 1.0)).with_burst(1.0)]
    }

    #[test]
    fn request_before_configure_is_a_lifecycle_error() {
        let limiter = InMemoryRateLimiter::new();
        // empty keys would short-circuit before the lifecycle check,
        // so use a non-empty map here.
        let mut keys = HashMap::new();
        keys.insert("k1".to_string(), "u1".to_string());
        let err = limiter.request(&keys).unwrap_err();
        assert_eq!(err.to_string(), "lifecycle error: Rate limiter not configured");
    }

    #[test]
    fn reconfigure_is_a_lifecycle_error() {
        let limiter = InMemoryRateLimiter::new();
        limiter.configure(limits()).unwrap();
        let err = limiter.configure(limits()).unwrap_err();
        assert_eq!(err.to_string(), "lifecycle error: Rate limiter already configured");
    }

    #[test]
    fn empty_request_is_accepted_with_no_delay() {
        let limiter = InMemoryRateLimiter::new();
        limiter.configure(limits()).unwrap();
        let response = limiter.request(&HashMap::new()).unwrap();
        assert!(response.accepted);
        assert_eq!(response.delay, Some(0.0));
    }

    #[test]
    fn unknown_limit_name_is_rejected_with_precondition_error() {
        let limiter = InMemoryRateLimiter::new();
        limiter.configure(limits()).unwrap();
        let mut keys = HashMap::new();
        keys.insert("k2".to_string(), "u1".to_string());
        let err = limiter.request(&keys).unwrap_err();
        assert_eq!(err.to_string(), "unknown limit name: \"k2\"");
    }

    #[test]
    fn basic_drain_sequence_matches_burst_of_one() {
        let limiter = InMemoryRateLimiter::new();
        limiter.configure(limits()).unwrap();
        let mut keys = HashMap::new();
        keys.insert("k1".to_string(), "u1".to_string());

        let first = limiter.request(&keys).unwrap();
        assert!(first.accepted);
        let second = limiter.request(&keys).unwrap();
        assert!(!second.accepted);
    }

    #[test]
    fn independent_keys_within_a_zone_do_not_interfere() {
        let limiter = InMemoryRateLimiter::new();
        limiter.configure(limits()).unwrap();
        let mut keys_a = HashMap::new();
        keys_a.insert("k1".to_string(), "a".to_string());
        let mut keys_b = HashMap::new();
        keys_b.insert("k1".to_string(), "b".to_string());

        assert!(limiter.request(&keys_a).unwrap().accepted);
        assert!(limiter.request(&keys_b).unwrap().accepted);
    }

    #[test]
    fn multi_zone_delay_is_the_max_across_limits() {
        let limiter = InMemoryRateLimiter::new();
        let limits = vec![
            RateLimit::new("k1", Zone::new("z1", 1.0)).with_delay(5.0),
            RateLimit::new("k2", Zone::new("z2", 1.0)).with_delay(1.0),
        ];
        limiter.configure(limits).unwrap();

        let mut keys = HashMap::new();
        keys.insert("k1".to_string(), "u1".to_string());
        keys.insert("k2".to_string(), "u1".to_string());
        limiter.request(&keys).unwrap();
        let second = limiter.request(&keys).unwrap();
        assert!(second.accepted);
        assert!(second.delay.unwrap() > 0.0);
    }
}
