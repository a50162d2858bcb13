use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Wall-clock source and blocking sleep, swappable in tests.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Time left until the next whole second after `now`.
pub fn until_next_second(now: DateTime<Utc>) -> Duration {
    let nanos = now.timestamp_subsec_nanos().min(999_999_999);
    Duration::from_nanos(u64::from(1_000_000_000 - nanos))
}
