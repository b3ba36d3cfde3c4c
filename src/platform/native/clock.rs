use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::timestamp::Timestamp;

/// Wall-clock time at construction, advanced by a monotonic clock after.
pub struct MonotonicClock {
    reference: Instant,
    reference_us: u64,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        let reference_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .and_then(|d| u64::try_from(d.as_micros()).ok())
            .unwrap_or(0);
        let reference = Instant::now();
        Self {
            reference,
            reference_us,
        }
    }

    pub fn now(&self) -> Timestamp {
        let micros = u64::try_from(Instant::now().duration_since(self.reference).as_micros())
            .unwrap_or(u64::MAX);
        Timestamp::from_micros(self.reference_us.saturating_add(micros))
    }
}
