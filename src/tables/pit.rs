use alloc::vec::Vec;

use super::{FaceToken, InterestToken, Slots};
use crate::{packet::Packet, timestamp::Timestamp};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PendingFace {
    pub face: FaceToken,
    pub last_used: Timestamp,
}

#[derive(Clone, Debug)]
pub struct InterestEntry {
    pub packet: Packet,
    pub from: FaceToken,
    pub pending: Vec<PendingFace>,
    pub retries: u32,
    pub last_used: Timestamp,
    // Last time the interest was handed to the FIB, successfully or not
    pub last_attempt: Timestamp,
}

impl InterestEntry {
    pub fn new(packet: Packet, from: FaceToken, now: Timestamp) -> Self {
        Self {
            packet,
            from,
            pending: alloc::vec![PendingFace {
                face: from,
                last_used: now,
            }],
            retries: 0,
            last_used: now,
            last_attempt: now,
        }
    }

    /// Adds `face` to the pending set. A face already waiting only has its
    /// timestamp refreshed; returns whether the face was new.
    pub fn add_pending(&mut self, face: FaceToken, now: Timestamp) -> bool {
        self.last_used = now;
        match self.pending.iter_mut().find(|p| p.face == face) {
            Some(pending) => {
                pending.last_used = now;
                false
            }
            None => {
                self.pending.push(PendingFace {
                    face,
                    last_used: now,
                });
                true
            }
        }
    }

    pub fn is_pending_on(&self, face: FaceToken) -> bool {
        self.pending.iter().any(|p| p.face == face)
    }

    pub fn pending_faces(&self) -> impl Iterator<Item = FaceToken> + '_ {
        self.pending.iter().map(|p| p.face)
    }
}

/// Pending interest table.
#[derive(Default)]
pub struct Pit {
    entries: Slots<InterestEntry>,
}

impl Pit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, entry: InterestEntry) -> InterestToken {
        InterestToken(self.entries.insert(entry))
    }

    pub fn get(&self, token: InterestToken) -> Option<&InterestEntry> {
        self.entries.get(token.0)
    }

    pub fn get_mut(&mut self, token: InterestToken) -> Option<&mut InterestEntry> {
        self.entries.get_mut(token.0)
    }

    pub fn remove(&mut self, token: InterestToken) -> Option<InterestEntry> {
        self.entries.remove(token.0)
    }

    /// First entry whose interest satisfies `same`.
    pub fn find<F>(&self, mut same: F) -> Option<InterestToken>
    where
        F: FnMut(&Packet) -> bool,
    {
        self.iter()
            .find(|(_, entry)| same(&entry.packet))
            .map(|(token, _)| token)
    }

    pub fn iter(&self) -> impl Iterator<Item = (InterestToken, &InterestEntry)> + '_ {
        self.entries
            .iter()
            .map(|(key, entry)| (InterestToken(key), entry))
    }

    pub fn tokens(&self) -> Vec<InterestToken> {
        self.entries.keys().into_iter().map(InterestToken).collect()
    }

    /// Takes `face` out of every pending set and drops the entries nobody is
    /// waiting on anymore. Returns the number of entries dropped.
    pub fn remove_face(&mut self, face: FaceToken) -> usize {
        self.entries
            .drain_where(|_, entry| {
                entry.pending.retain(|p| p.face != face);
                entry.pending.is_empty()
            })
            .len()
    }

    /// Drops every entry `expired` selects and returns them.
    pub fn expire<F>(&mut self, mut expired: F) -> Vec<(InterestToken, InterestEntry)>
    where
        F: FnMut(&InterestEntry) -> bool,
    {
        self.entries
            .drain_where(|_, entry| expired(entry))
            .into_iter()
            .map(|(key, entry)| (InterestToken(key), entry))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::{ndntlv::NdnTlvCodec, SuiteCodec},
        packet::InterestOptions,
        prefix::Prefix,
        suite::Suite,
        tables::SlotKey,
    };

    fn face(index: u32) -> FaceToken {
        FaceToken(SlotKey {
            index,
            generation: 0,
        })
    }

    fn interest(uri: &str) -> Packet {
        let prefix = Prefix::from_uri(uri, Suite::NdnTlv).unwrap();
        let bytes = NdnTlvCodec
            .encode_interest(&prefix, &InterestOptions::default())
            .unwrap();
        NdnTlvCodec.decode(&bytes).unwrap().0
    }

    #[test]
    fn test_pending_set_has_no_duplicates() {
        let mut entry = InterestEntry::new(interest("/a/b"), face(1), Timestamp::from_secs(1));
        assert!(!entry.add_pending(face(1), Timestamp::from_secs(2)));
        assert!(entry.add_pending(face(2), Timestamp::from_secs(3)));
        assert_eq!(entry.pending.len(), 2);
        assert_eq!(entry.pending[0].last_used, Timestamp::from_secs(2));
        assert_eq!(entry.last_used, Timestamp::from_secs(3));
        assert!(entry.is_pending_on(face(2)));
        assert!(!entry.is_pending_on(face(3)));
    }

    #[test]
    fn test_remove_face() {
        let mut pit = Pit::new();
        let now = Timestamp::from_secs(1);
        let only_one = pit.insert(InterestEntry::new(interest("/a"), face(1), now));
        let mut shared = InterestEntry::new(interest("/b"), face(1), now);
        shared.add_pending(face(2), now);
        let shared = pit.insert(shared);

        assert_eq!(pit.remove_face(face(1)), 1);
        assert!(pit.get(only_one).is_none());
        let left: Vec<FaceToken> = pit.get(shared).unwrap().pending_faces().collect();
        assert_eq!(left, [face(2)]);
    }

    #[test]
    fn test_find_and_expire() {
        let mut pit = Pit::new();
        let a = pit.insert(InterestEntry::new(interest("/a"), face(1), Timestamp::from_secs(1)));
        pit.insert(InterestEntry::new(interest("/b"), face(1), Timestamp::from_secs(5)));

        let wanted = interest("/a");
        assert_eq!(pit.find(|p| p.prefix() == wanted.prefix()), Some(a));

        let expired = pit.expire(|e| e.last_used < Timestamp::from_secs(3));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, a);
        assert_eq!(pit.len(), 1);
        assert_eq!(pit.tokens().len(), 1);
    }
}
