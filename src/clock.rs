//! Time sources.
//!
//! [`Clock`] supplies wall-clock timestamps for peer liveness. [`RetryTimer`]
//! supplies the monotonic time and the pause used by the bind retry loop, so
//! tests can drive a five minute loop without sleeping.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub trait RetryTimer: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimer;

impl RetryTimer for SystemTimer {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
