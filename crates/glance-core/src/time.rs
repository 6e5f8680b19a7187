//! Millisecond timestamps for the engine.
//!
//! The engine never reads the clock itself — every operation takes an
//! explicit `now` so selection and expiry are reproducible in tests. The
//! runtime layer samples the wall clock once per tick and threads it
//! through.

use std::time::{SystemTime, UNIX_EPOCH};

/// Unix milliseconds. All item timestamps, TTLs, and durations use this.
pub type Millis = u64;

/// Current wall-clock time as Unix milliseconds.
pub fn now_unix_millis() -> Millis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Millis
}

/// Saturating elapsed time between two timestamps. Clock skew between an
/// adapter-supplied event timestamp and the scheduler's `now` must not
/// underflow into a huge age.
pub fn age_millis(now: Millis, then: Millis) -> Millis {
    now.saturating_sub(then)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_past_2020() {
        // 2020-01-01T00:00:00Z in millis
        assert!(now_unix_millis() > 1_577_836_800_000);
    }

    #[test]
    fn test_age_saturates() {
        assert_eq!(age_millis(1_000, 4_000), 0);
        assert_eq!(age_millis(4_000, 1_000), 3_000);
    }
}
