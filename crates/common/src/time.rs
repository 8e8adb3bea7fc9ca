//! Wall-clock helpers. Kept behind a trait so tests can supply a fake clock
//! instead of sleeping real time.

use std::time::{SystemTime, UNIX_EPOCH};

pub trait ClockProvider: Send + Sync {
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockProvider for SystemClock {
    fn now_millis(&self) -> u64 {
        now_millis()
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    UNIX_EPOCH.elapsed().unwrap_or_default().as_millis() as u64
}
