//! The leaky-bucket admission formula, shared verbatim by every backend
//! (in-process, optimistic Redis transaction, and the Redis Lua
//! script generator).
//!
//! Each limit tracks a time-adjusted count `v`: a hypothetical bucket
//! level that would have been reached by leaking continuously at
//! `rate` since the last observed timestamp. A request nudges `v` up
//! by one unit of work and is admitted immediately if that stays
//! within `burst`, admitted with a delay if it overflows into the
//! `delay` band, and rejected outright past that.

use crate::model::{RateLimit, State};

/// The result of applying one limit's admission rule at a single
/// sampled instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LeakResult {
    /// Past the delay band: no new state should be written for this
    /// limit (or for any other limit in the same request).
    Rejected,
    /// Within the burst or delay band. `new_state` is what should be
    /// persisted if every limit in the request accepts; `delay` is
    /// this limit's contribution to the request's overall wait.
    Accepted { new_state: State, delay: f64 },
}

/// Applies one limit's leaky-bucket rule given its prior state (`None`
/// for a bucket that has never been written) and the instant `now`
/// sampled once for the whole request.
pub fn apply(limit: &RateLimit, prior: Option<State>, now: f64) -> LeakResult {
    let (t0, v0) = match prior {
        Some(state) => (state.timestamp, state.value),
        None => (now, 0.0),
    };

    let elapsed = now - t0;
    let v1 = (v0 - elapsed * limit.zone.rate).max(0.0) + 1.0;
    let headroom = limit.burst + 1.0 - v1;

    if headroom < -limit.delay {
        return LeakResult::Rejected;
    }

    let delay = if headroom < 0.0 {
        -headroom / limit.zone.rate
    } else {
        0.0
    };

    LeakResult::Accepted {
        new_state: State::new(now, v1),
        delay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Zone;

    fn limit(rate: f64, burst: f64, delay: f64) -> RateLimit {
        RateLimit::new("k1", Zone::new("z1", rate)).with_burst(burst).with_delay(delay)
    }

    #[test]
    fn first_request_is_admitted_with_no_delay() {
        let limit = limit(1.0, 0.0, 0.0);
        match apply(&limit, None, 100.0) {
            LeakResult::Accepted { new_state, delay } => {
                assert_eq!(new_state, State::new(100.0, 1.0));
                assert_eq!(delay, 0.0);
            }
            LeakResult::Rejected => panic!("expected acceptance"),
        }
    }

    #[test]
    fn exhausting_burst_without_delay_band_rejects() {
        let limit = limit(1.0, 0.0, 0.0);
        let prior = State::new(100.0, 1.0);
        match apply(&limit, Some(prior), 100.0) {
            LeakResult::Rejected => {}
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn burst_allows_immediate_admission_above_one() {
        let limit = limit(1.0, 2.0, 0.0);
        let prior = State::new(100.0, 1.0);
        match apply(&limit, Some(prior), 100.0) {
            LeakResult::Accepted { delay, .. } => assert_eq!(delay, 0.0),
            LeakResult::Rejected => panic!("expected acceptance"),
        }
    }

    #[test]
    fn delay_band_produces_positive_wait_instead_of_rejecting() {
        let limit = limit(1.0, 0.0, 2.0);
        let prior = State::new(100.0, 1.0);
        match apply(&limit, Some(prior), 100.0) {
            LeakResult::Accepted { delay, .. } => assert!(delay > 0.0 && delay <= 2.0),
            LeakResult::Rejected => panic!("expected acceptance with delay"),
        }
    }

    #[test]
    fn elapsed_time_leaks_the_bucket_back_down() {
        let limit = limit(2.0, 0.0, 0.0);
        let prior = State::new(100.0, 1.0);
        // one second later at rate=2/s, v0 has fully drained before the +1
        match apply(&limit, Some(prior), 101.0) {
            LeakResult::Accepted { new_state, delay } => {
                assert_eq!(new_state.value, 1.0);
                assert_eq!(delay, 0.0);
            }
            LeakResult::Rejected => panic!("expected acceptance"),
        }
    }
}
