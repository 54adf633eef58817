//! Decorrelated-jitter retry delays.
//!
//! Each delay is drawn uniformly from a range scaled by the previous
//! delay, so independent clients that fail together do not retry
//! together. Based on Marc Brooker's exponential backoff and jitter
//! write-up: <https://aws.amazon.com/blogs/architecture/exponential-backoff-and-jitter/>

use std::time::Duration;

use rand::Rng;

/// Draw the next retry delay from the previous one.
///
/// Returns `min(cap, uniform(base, prev * 3))`, clamped so the result is
/// always within `[base, cap]` for any `prev`.
pub fn decorrelated_jitter(prev: Duration, base: Duration, cap: Duration) -> Duration {
    let base_ms = base.as_millis() as u64;
    let cap_ms = cap.as_millis() as u64;
    let high = (prev.as_millis() as u64).saturating_mul(3).max(base_ms);
    let drawn = rand::thread_rng().gen_range(base_ms..=high);
    Duration::from_millis(drawn.min(cap_ms))
}

/// Backoff state for one continuous retry run.
///
/// The previous delay is an explicit field threaded through successive
/// failures, reset to zero when the run restarts from a network outage
/// (an offline failure does not count toward the sequence).
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    prev: Duration,
}

impl Backoff {
    /// Create a backoff with the given delay bounds and no history.
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            prev: Duration::ZERO,
        }
    }

    /// Draw the next delay and record it as the new previous delay.
    pub fn next(&mut self) -> Duration {
        self.prev = decorrelated_jitter(self.prev, self.base, self.cap);
        self.prev
    }

    /// Forget the sequence so far; the next delay starts from the base.
    pub fn reset(&mut self) {
        self.prev = Duration::ZERO;
    }
}
