use alloc::vec::Vec;

use bitflags::bitflags;

use super::{ContentToken, Slots};
use crate::{
    error::RelayError,
    matching::{compare, MatchMode},
    packet::Packet,
    prefix::Prefix,
    timestamp::Timestamp,
};

bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ContentFlags: u8 {
        /// Pinned, never evicted or aged out.
        const STATIC = 0x01;
        const STALE = 0x02;
    }
}

#[derive(Clone, Debug)]
pub struct ContentEntry {
    pub packet: Packet,
    pub flags: ContentFlags,
    pub inserted: Timestamp,
    pub last_used: Timestamp,
    pub served: u32,
}

/// Content store with LRU eviction among the entries that are not pinned.
///
/// `max_entries` below zero means unbounded, zero means caching is disabled
/// and only pinned content is stored.
pub struct ContentStore {
    entries: Slots<ContentEntry>,
    max_entries: i64,
}

impl ContentStore {
    pub fn new(max_entries: i64) -> Self {
        Self {
            entries: Slots::new(),
            max_entries,
        }
    }

    pub fn max_entries(&self) -> i64 {
        self.max_entries
    }

    pub fn set_max_entries(&mut self, max_entries: i64) {
        self.max_entries = max_entries;
    }

    pub fn is_enabled(&self) -> bool {
        self.max_entries != 0
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, token: ContentToken) -> Option<&ContentEntry> {
        self.entries.get(token.0)
    }

    pub fn get_mut(&mut self, token: ContentToken) -> Option<&mut ContentEntry> {
        self.entries.get_mut(token.0)
    }

    pub fn remove(&mut self, token: ContentToken) -> Option<ContentEntry> {
        self.entries.remove(token.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ContentToken, &ContentEntry)> + '_ {
        self.entries
            .iter()
            .map(|(key, entry)| (ContentToken(key), entry))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ContentToken, &mut ContentEntry)> + '_ {
        self.entries
            .iter_mut()
            .map(|(key, entry)| (ContentToken(key), entry))
    }

    /// An entry holding exactly these wire bytes, if any.
    pub fn find_duplicate(&self, packet: &Packet) -> Option<ContentToken> {
        self.iter()
            .find(|(_, entry)| entry.packet.same_bytes(packet))
            .map(|(token, _)| token)
    }

    /// Records a cache hit.
    pub fn touch(&mut self, token: ContentToken, now: Timestamp) {
        if let Some(entry) = self.get_mut(token) {
            entry.last_used = now;
            entry.served = entry.served.saturating_add(1);
        }
    }

    /// Stores `packet`. Returns `Ok(None)` when nothing was stored because the
    /// bytes are already cached or caching is disabled, and `CacheFull` when
    /// the store is at its limit with only pinned entries left.
    pub fn insert(
        &mut self,
        packet: Packet,
        flags: ContentFlags,
        now: Timestamp,
    ) -> Result<Option<ContentToken>, RelayError> {
        if self.find_duplicate(&packet).is_some() {
            return Ok(None);
        }
        if self.max_entries == 0 && !flags.contains(ContentFlags::STATIC) {
            return Ok(None);
        }
        if self.max_entries > 0 && self.len() as i64 >= self.max_entries {
            match self.evict_lru() {
                Some(evicted) => log::debug!(
                    "Evicted {} from the content store",
                    DisplayName(&evicted.packet)
                ),
                None => {
                    log::warn!("Content store full, dropping {}", DisplayName(&packet));
                    return Err(RelayError::CacheFull);
                }
            }
        }
        let entry = ContentEntry {
            packet,
            flags,
            inserted: now,
            last_used: now,
            served: 0,
        };
        Ok(Some(ContentToken(self.entries.insert(entry))))
    }

    /// Removes the least recently used entry that is not pinned.
    pub fn evict_lru(&mut self) -> Option<ContentEntry> {
        let mut victim: Option<(ContentToken, Timestamp)> = None;
        for (token, entry) in self.iter() {
            if entry.flags.contains(ContentFlags::STATIC) {
                continue;
            }
            if victim.map_or(true, |(_, oldest)| entry.last_used < oldest) {
                victim = Some((token, entry.last_used));
            }
        }
        self.remove(victim?.0)
    }

    /// Removes every entry named exactly `prefix`.
    pub fn remove_prefix(&mut self, prefix: &Prefix) -> usize {
        self.entries
            .drain_where(|_, entry| {
                entry
                    .packet
                    .prefix()
                    .is_some_and(|name| compare(name, None, prefix, MatchMode::Exact).is_match())
            })
            .len()
    }

    /// Drops every entry `expired` selects and returns them.
    pub fn expire<F>(&mut self, mut expired: F) -> Vec<ContentEntry>
    where
        F: FnMut(&ContentEntry) -> bool,
    {
        self.entries
            .drain_where(|_, entry| expired(entry))
            .into_iter()
            .map(|(_, entry)| entry)
            .collect()
    }
}

pub(crate) struct DisplayName<'a>(pub &'a Packet);

impl core::fmt::Display for DisplayName<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.0.prefix() {
            Some(prefix) => write!(f, "{}", prefix),
            None => write!(f, "<unnamed {:?}>", self.0.kind()),
        }
    }
}
