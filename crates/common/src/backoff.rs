//! Bounded exponential backoff for transient failures, used by the poller
//! and by the per-provider control loop's `Transient` error handling.

use std::time::Duration;

/// Strategy for turning a current delay into the next one. Split out from
/// [`RetryTracker`] so alternative strategies (e.g. constant delay in
/// tests) can reuse the same bookkeeping.
pub trait BackoffStrategy {
    fn next_duration(&self, current: Duration) -> Duration;
}

/// Multiplies the current delay by a constant factor, capped by the
/// tracker's `max_duration`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    multiplier: f64,
}

impl ExponentialBackoff {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn next_duration(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier)
    }
}

/// Tracks retry count and current delay across repeated transient failures
/// of the same operation. `reset` on success, `advance` on failure.
#[derive(Debug, Clone)]
pub struct RetryTracker<B> {
    base: Duration,
    max: Duration,
    current: Duration,
    attempts: u32,
    strategy: B,
}

impl<B: BackoffStrategy> RetryTracker<B> {
    pub fn new(base: Duration, max: Duration, strategy: B) -> Self {
        Self {
            base,
            max,
            current: base,
            attempts: 0,
            strategy,
        }
    }

    /// Resets to the base delay after a successful call.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current = self.base;
    }

    /// Advances the delay after a failed call and returns the delay to wait
    /// before the next attempt.
    pub fn advance(&mut self) -> Duration {
        self.attempts += 1;
        self.current = self.strategy.next_duration(self.current).min(self.max);
        self.current
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// True once `attempts` has reached `limit` since the last reset.
    pub fn exhausted(&self, limit: u32) -> bool {
        self.attempts >= limit
    }
}
