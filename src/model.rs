//! Core data types shared by every backend: zones, limits, stored state
//! and request responses.

/// A named admission domain sharing one leak rate.
///
/// Every [`RateLimit`] binds to exactly one zone, and a zone's `name`
/// must be unique within a single `configure` call -- no two limits may
/// reference the same zone.
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    /// Identifies the zone across `request`/`get_state` calls and, for
    /// remote backends, in the store's key space.
    pub name: String,
    /// Leak rate in units per second.
    pub rate: f64,
    /// Seconds the backing store should retain a key with no further
    /// requests before it may be evicted. Only meaningful for remote
    /// backends; the in-process backend ignores it.
    pub expiry: u64,
}

impl Zone {
    pub fn new(name: impl Into<String>, rate: f64) -> Self {
        Zone {
            name: name.into(),
            rate,
            expiry: 60,
        }
    }

    pub fn with_expiry(mut self, expiry: u64) -> Self {
        self.expiry = expiry;
        self
    }
}

/// A single named rule: how much burst and delay a zone's bucket
/// tolerates before rejecting.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimit {
    /// Unique name a caller references in `request`.
    pub name: String,
    pub zone: Zone,
    /// Extra capacity above the steady leak rate admitted immediately.
    pub burst: f64,
    /// Extra capacity beyond `burst` admitted with a caller-observed
    /// delay rather than rejection.
    pub delay: f64,
}

impl RateLimit {
    pub fn new(name: impl Into<String>, zone: Zone) -> Self {
        RateLimit {
            name: name.into(),
            zone,
            burst: 0.0,
            delay: 0.0,
        }
    }

    pub fn with_burst(mut self, burst: f64) -> Self {
        self.burst = burst;
        self
    }

    pub fn with_delay(mut self, delay: f64) -> Self {
        self.delay = delay;
        self
    }

    /// Minimum expiry (seconds, rounded up) a zone needs to guarantee a
    /// fully-drained backlog isn't evicted mid-leak.
    pub fn recommended_expiry(&self) -> u64 {
        let backlog = self.burst + self.delay + 1.0;
        (backlog / self.zone.rate).ceil() as u64
    }
}

/// The persisted state of one bucket: a timestamp and the
/// time-adjusted count sampled at that timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct State {
    pub timestamp: f64,
    pub value: f64,
}

impl State {
    pub fn new(timestamp: f64, value: f64) -> Self {
        State { timestamp, value }
    }
}

/// The outcome of a `request` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Response {
    pub accepted: bool,
    /// `Some(seconds)` the caller should wait before proceeding, only
    /// ever present alongside `accepted == true`. `None` means the
    /// request was rejected.
    pub delay: Option<f64>,
}

impl Response {
    pub fn accepted(delay: f64) -> Self {
        Response {
            accepted: true,
            delay: Some(delay),
        }
    }

    pub fn rejected() -> Self {
        Response {
            accepted: false,
            delay: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recommended_expiry_matches_ceil_formula() {
        let zone = Zone::new("z1", 2.0);
        let limit = RateLimit::new("k1", zone).with_burst(4.0).with_delay(6.0);
        assert_eq!(limit.recommended_expiry(), 6);
    }

    #[test]
    fn response_constructors() {
        let r = Response::accepted(1.5);
        assert!(r.accepted);
        assert_eq!(r.delay, Some(1.5));

        let r = Response::rejected();
        assert!(!r.accepted);
        assert_eq!(r.delay, None);
    }
}
