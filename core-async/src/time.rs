//! Time-related abstractions.
//!
//! Timers are Tokio's so that sleeps and intervals cooperate with the
//! executor. `Instant` is Tokio's monotonic instant, so hold times and
//! download speed measurements follow paused test clocks too.

pub use tokio::time::{
    interval, interval_at, sleep, sleep_until, timeout, Instant, Interval, MissedTickBehavior,
    Sleep, Timeout,
};

pub use tokio::time::error::Elapsed;

pub use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Computes an exponential backoff delay, `base * 2^attempt`, capped at `max`.
///
/// `attempt` is zero-based, so the first retry waits `base`.
pub fn backoff_delay(base: Duration, attempt: u32, max: Duration) -> Duration {
    let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}
