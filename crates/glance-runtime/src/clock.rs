//! Tokio-aware clock.
//!
//! The core takes explicit unix-milli timestamps. We anchor them to a
//! tokio [`Instant`] taken at engine start, so elapsed time follows
//! tokio's clock — which means paused-time tests drive TTLs, decay, and
//! staleness deterministically along with the tick interval.

use glance_core::{Millis, now_unix_millis};
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Clock {
    wall_base: Millis,
    instant_base: Instant,
}

impl Clock {
    /// Anchor to the current wall and tokio clocks. Must be called inside
    /// a tokio runtime.
    pub fn anchor() -> Self {
        Self {
            wall_base: now_unix_millis(),
            instant_base: Instant::now(),
        }
    }

    pub fn now(&self) -> Millis {
        self.wall_base + self.instant_base.elapsed().as_millis() as Millis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_follows_tokio_time() {
        let clock = Clock::anchor();
        let before = clock.now();
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(clock.now(), before + 30_000);
    }
}
