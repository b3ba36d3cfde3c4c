use core::time::Duration;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub us_since_epoch: u64,
}

impl Timestamp {
    pub const fn from_micros(us: u64) -> Self {
        Self { us_since_epoch: us }
    }

    pub const fn from_millis(ms: u64) -> Self {
        Self {
            us_since_epoch: ms.saturating_mul(1_000),
        }
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self {
            us_since_epoch: secs.saturating_mul(1_000_000),
        }
    }

    pub fn adding(&self, us: u64) -> Self {
        Self {
            us_since_epoch: self.us_since_epoch.saturating_add(us),
        }
    }

    pub fn adding_secs(&self, secs: u64) -> Self {
        self.adding(secs.saturating_mul(1_000_000))
    }

    pub fn adding_duration(&self, duration: Duration) -> Self {
        self.adding(u64::try_from(duration.as_micros()).unwrap_or(u64::MAX))
    }

    pub fn removing(&self, us: u64) -> Self {
        Self {
            us_since_epoch: self.us_since_epoch.saturating_sub(us),
        }
    }

    // None if `other` is later than `self`
    pub fn difference(&self, other: &Self) -> Option<u64> {
        self.us_since_epoch.checked_sub(other.us_since_epoch)
    }

    pub fn min(&self, other: Self) -> Self {
        Timestamp {
            us_since_epoch: self.us_since_epoch.min(other.us_since_epoch),
        }
    }

    pub fn max(&self, other: Self) -> Self {
        Timestamp {
            us_since_epoch: self.us_since_epoch.max(other.us_since_epoch),
        }
    }

    pub fn as_secs(&self) -> u64 {
        self.us_since_epoch / 1_000_000
    }
}
