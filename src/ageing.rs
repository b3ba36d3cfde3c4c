use alloc::vec::Vec;

use crate::{
    face::FaceFlags,
    platform::Platform,
    relay::Relay,
    tables::{ContentFlags, DisplayName, FaceToken},
    timestamp::Timestamp,
};

// Microseconds from `then` to `now`, zero if the clock went backwards
fn elapsed(now: Timestamp, then: Timestamp) -> u64 {
    now.difference(&then).unwrap_or(0)
}

impl<P: Platform> Relay<P> {
    /// One sweep over the tables, run on every ageing tick.
    ///
    /// Cached content that went unused for the content timeout is dropped,
    /// and content past its freshness period is marked stale. Interests idle
    /// for the interest timeout, or retransmitted too often, are dropped;
    /// the others are sent upstream again once per ageing interval. Faces
    /// that are not static and went silent for the face timeout are torn
    /// down.
    pub(crate) fn age(&mut self) {
        let now = self.now();
        self.age_content(now);
        self.age_interests(now);
        self.age_faces(now);
    }

    fn age_content(&mut self, now: Timestamp) {
        let timeout = self.timeouts.content_us;
        let expired = self.cs.expire(|entry| {
            !entry.flags.contains(ContentFlags::STATIC) && elapsed(now, entry.last_used) >= timeout
        });
        for entry in &expired {
            relay_log!(self, Debug, "Content {} timed out", DisplayName(&entry.packet));
        }

        for (_, entry) in self.cs.iter_mut() {
            if entry.flags.contains(ContentFlags::STALE) {
                continue;
            }
            let Some(period_ms) = entry.packet.freshness_period() else {
                continue;
            };
            if elapsed(now, entry.inserted) >= period_ms.saturating_mul(1_000) {
                entry.flags.insert(ContentFlags::STALE);
            }
        }
    }

    fn age_interests(&mut self, now: Timestamp) {
        let timeout = self.timeouts.interest_us;
        let max_retries = self.timeouts.max_interest_retransmit;
        let expired = self.pit.expire(|entry| {
            elapsed(now, entry.last_used) >= timeout || entry.retries > max_retries
        });
        for (_, entry) in &expired {
            relay_log!(
                self,
                Debug,
                "Interest {} timed out after {} retries",
                DisplayName(&entry.packet),
                entry.retries
            );
        }

        let interval = self.timeouts.ageing_interval_us;
        let due: Vec<_> = self
            .pit
            .iter()
            .filter(|(_, entry)| elapsed(now, entry.last_attempt) >= interval)
            .filter(|(_, entry)| {
                self.codecs
                    .get(entry.packet.suite())
                    .is_some_and(|codec| codec.may_forward(&entry.packet))
            })
            .map(|(token, _)| token)
            .collect();
        for token in due {
            match self.propagate(token) {
                Ok(0) => {}
                Ok(_) => {
                    if let Some(entry) = self.pit.get_mut(token) {
                        entry.retries += 1;
                    }
                }
                Err(e) => relay_log!(self, Debug, "Retransmission failed: {}", e),
            }
        }
    }

    fn age_faces(&mut self, now: Timestamp) {
        let timeout = self.timeouts.face_us;
        let idle: Vec<FaceToken> = self
            .faces()
            .filter(|(_, face)| !face.flags.contains(FaceFlags::STATIC))
            .filter(|(_, face)| elapsed(now, face.last_used) >= timeout)
            .map(|(token, _)| token)
            .collect();
        for face in idle {
            if let Err(e) = self.remove_face(face) {
                relay_log!(self, Warn, "Could not remove idle face: {}", e);
            }
        }
    }
}
