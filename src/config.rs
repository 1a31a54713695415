//! Shared `configure`-time validation: duplicate-zone detection,
//! deadlock-free zone id assignment, and expiry-vs-recommended-minimum
//! warnings. Every backend builds one of these from its `Vec<RateLimit>`
//! before doing anything backend-specific.

use crate::error::{ConfigWarning, RateLimiterError, Result};
use crate::model::RateLimit;
use std::collections::HashMap;

/// The validated, queryable form of a `configure` call's limit set.
///
/// Zones are assigned a stable integer id in first-seen order. Backends
/// that must lock more than one zone at a time (the in-process one)
/// acquire locks in ascending id order, which is enough to rule out
/// deadlock between concurrent multi-zone requests.
#[derive(Debug)]
pub struct LimitTable {
    limits: HashMap<String, RateLimit>,
    zone_ids: HashMap<String, usize>,
    zone_count: usize,
}

impl LimitTable {
    /// Validates and indexes a limit set, returning any non-fatal
    /// warnings alongside the table.
    pub fn build(limits: Vec<RateLimit>) -> Result<(LimitTable, Vec<ConfigWarning>)> {
        let mut by_name = HashMap::new();
        let mut zone_ids = HashMap::new();
        let mut warnings = Vec::new();

        for limit in limits {
            if by_name.contains_key(&limit.name) {
                return Err(RateLimiterError::Configuration(format!(
                    "duplicate limit name '{}'",
                    limit.name
                )));
            }

            if zone_ids.contains_key(&limit.zone.name) {
                return Err(RateLimiterError::Configuration(format!(
                    "Multiple rate limits for zone '{}'",
                    limit.zone.name
                )));
            }
            let id = zone_ids.len();
            zone_ids.insert(limit.zone.name.clone(), id);

            let recommended = limit.recommended_expiry();
            if limit.zone.expiry < recommended {
                warnings.push(ConfigWarning::ExpiryBelowRecommended {
                    zone: limit.zone.name.clone(),
                    limit: limit.name.clone(),
                    expiry: limit.zone.expiry,
                    recommended,
                });
            }

            by_name.insert(limit.name.clone(), limit);
        }

        let zone_count = zone_ids.len();
        Ok((
            LimitTable {
                limits: by_name,
                zone_ids,
                zone_count,
            },
            warnings,
        ))
    }

    pub fn get(&self, name: &str) -> Result<&RateLimit> {
        self.limits
            .get(name)
            .ok_or_else(|| RateLimiterError::UnknownLimit(name.to_string()))
    }

    pub fn zone_id(&self, zone_name: &str) -> usize {
        self.zone_ids[zone_name]
    }

    pub fn zone_id_opt(&self, zone_name: &str) -> Option<usize> {
        self.zone_ids.get(zone_name).copied()
    }

    pub fn zone_count(&self) -> usize {
        self.zone_count
    }

    pub fn limit_names(&self) -> impl Iterator<Item = &str> {
        self.limits.keys().map(String::as_str)
    }
}

/// Validates a remote-backend key-format template: it must reference
/// exactly the placeholders `{zone}` and `{key}`, nothing more or
/// less.
pub fn validate_key_format(format: &str) -> Result<()> {
    let mut seen = Vec::new();
    let mut chars = format.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '{' {
            let start = i + 1;
            let end = format[start..]
                .find('}')
                .map(|offset| start + offset)
                .ok_or_else(|| {
                    RateLimiterError::Configuration(format!(
                        "unterminated placeholder in key format '{format}'"
                    ))
                })?;
            seen.push(&format[start..end]);
            while let Some(&(j, _)) = chars.peek() {
                if j <= end {
                    chars.next();
                } else {
                    break;
                }
            }
        }
    }

    let required = ["zone", "key"];
    for field in &required {
        if !seen.contains(field) {
            return Err(RateLimiterError::Configuration(format!(
                "key format '{format}' is missing required placeholder '{{{field}}}'"
            )));
        }
    }
    for field in &seen {
        if !required.contains(field) {
            return Err(RateLimiterError::Configuration(format!(
                "key format '{format}' has unexpected placeholder '{{{field}}}'"
            )));
        }
    }

    Ok(())
}
