//! Ambient utilities shared across the daemon's crates: logging setup,
//! retry/backoff bookkeeping, and clock access.

pub mod backoff;
pub mod logging;
pub mod time;
