use core::fmt;

use crate::{face::FaceAddress, hash::Sha256Digest, prefix::Prefix, timestamp::Timestamp};

#[cfg(feature = "poller")]
mod native;

#[cfg(feature = "poller")]
pub use native::*;

#[cfg(test)]
pub(crate) mod testing;

// The relay core performs no I/O of its own. Everything it needs from the
//  outside world (time, timers, sending bytes, reaching the local application)
//  goes through a Platform, and the embedder feeds events back in through
//  Relay::receive and Relay::on_timer.

/// What a timer fires for; passed back to `Relay::on_timer`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TimerEvent {
    /// The periodic sweep over all tables.
    Ageing,
    /// The paced interface with this index may send its next unit.
    InterfaceCts(usize),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle(pub u64);

pub trait Platform {
    fn now(&mut self) -> Timestamp;

    /// Arranges for `event` to be fed to `Relay::on_timer` after `delay_us`.
    /// None if no timer could be armed.
    fn set_timer(&mut self, delay_us: u64, event: TimerEvent) -> Option<TimerHandle>;

    fn cancel_timer(&mut self, handle: TimerHandle);

    /// Best effort, the relay does not learn whether the bytes left.
    fn transmit(&mut self, ifndx: usize, destination: &FaceAddress, bytes: &[u8]);

    /// Content that answered an interest of the local application.
    fn deliver_to_application(&mut self, name: &Prefix, chunk: Option<u32>, payload: &[u8]);

    /// An interest routed to a tap FIB rule.
    fn tap_interest(&mut self, _name: &Prefix, _bytes: &[u8]) {}

    fn log(&mut self, level: log::Level, args: fmt::Arguments<'_>) {
        log::log!(level, "{}", args);
    }

    /// SHA-256 over `bytes`, None if the platform cannot hash.
    fn sha256(&mut self, bytes: &[u8]) -> Option<Sha256Digest> {
        #[cfg(feature = "sha2")]
        {
            use crate::hash::Hasher;
            let mut hasher = sha::Sha256Hasher::new();
            hasher.update(bytes);
            Some(hasher.finalize_reset())
        }
        #[cfg(not(feature = "sha2"))]
        {
            let _ = bytes;
            None
        }
    }
}

#[cfg(feature = "sha2")]
pub mod sha {
    use sha2::{Digest, Sha256};

    use crate::hash::{Hasher, Sha256Digest};

    pub struct Sha256Hasher {
        inner: Sha256,
    }

    impl Default for Sha256Hasher {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Sha256Hasher {
        pub fn new() -> Self {
            Self {
                inner: Sha256::new(),
            }
        }
    }

    impl Hasher for Sha256Hasher {
        type Digest = Sha256Digest;

        fn reset(&mut self) {
            self.inner.reset();
        }

        fn update(&mut self, input: &[u8]) {
            self.inner.update(input);
        }

        fn finalize_reset(&mut self) -> Self::Digest {
            Sha256Digest(self.inner.finalize_reset().into())
        }
    }

}
