//! Bandwidth throttler
//!
//! Token bucket holding at most one second of tokens. A request larger than
//! the bucket is admitted once the bucket is full and leaves it in debt, so
//! the long-run rate still holds for any chunk size.

use core_async::time::{sleep, Duration, Instant};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
struct Bucket {
    rate: u64,
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate as f64).min(self.rate as f64);
        self.last_refill = now;
    }
}

/// Shared rate limiter for all download workers.
#[derive(Debug, Clone)]
pub struct BandwidthThrottler {
    bucket: Arc<Mutex<Bucket>>,
}

impl BandwidthThrottler {
    /// `bytes_per_second == 0` disables throttling.
    pub fn new(bytes_per_second: u64) -> Self {
        Self {
            bucket: Arc::new(Mutex::new(Bucket {
                rate: bytes_per_second,
                tokens: bytes_per_second as f64,
                last_refill: Instant::now(),
            })),
        }
    }

    pub fn rate(&self) -> u64 {
        self.bucket.lock().rate
    }

    /// Changes the rate; accumulated tokens are clamped to the new size.
    pub fn set_rate(&self, bytes_per_second: u64) {
        let mut bucket = self.bucket.lock();
        if bucket.rate == bytes_per_second {
            return;
        }
        bucket.refill(Instant::now());
        bucket.rate = bytes_per_second;
        bucket.tokens = bucket.tokens.min(bytes_per_second as f64);
    }

    /// Waits until `bytes` may be transferred.
    pub async fn acquire(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }
        loop {
            let wait = {
                let mut bucket = self.bucket.lock();
                if bucket.rate == 0 {
                    return;
                }
                bucket.refill(Instant::now());

                let needed = (bytes as f64).min(bucket.rate as f64);
                if bucket.tokens >= needed {
                    bucket.tokens -= bytes as f64;
                    return;
                }
                Duration::from_secs_f64((needed - bucket.tokens) / bucket.rate as f64)
            };
            sleep(wait.max(Duration::from_millis(1))).await;
        }
    }
}
