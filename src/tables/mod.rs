//! Relay state tables.
//!
//! Entries live in generational [`Slots`] and refer to each other only by
//! handle. A handle to a removed entry never resolves again, even after its
//! slot has been reused, so dropping a face cannot leave a PIT or FIB entry
//! pointing at some unrelated newcomer.

mod cs;
mod fib;
mod nonce;
mod pit;

pub use cs::*;
pub use fib::*;
pub use nonce::*;
pub use pit::*;

use alloc::vec::Vec;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotKey {
    index: u32,
    generation: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FaceToken(pub(crate) SlotKey);

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterestToken(pub(crate) SlotKey);

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentToken(pub(crate) SlotKey);

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

pub struct Slots<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Slots<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, value: T) -> SlotKey {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return SlotKey {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        SlotKey {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, key: SlotKey) -> Option<&T> {
        let slot = self.slots.get(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, key: SlotKey) -> Option<&mut T> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.value.as_mut()
    }

    pub fn contains(&self, key: SlotKey) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: SlotKey) -> Option<T> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let value = slot.value.take()?;
        // Bumping the generation retires every outstanding key to this slot
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.len -= 1;
        Some(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotKey, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let key = SlotKey {
                index: index as u32,
                generation: slot.generation,
            };
            slot.value.as_ref().map(|value| (key, value))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SlotKey, &mut T)> + '_ {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let key = SlotKey {
                index: index as u32,
                generation: slot.generation,
            };
            slot.value.as_mut().map(|value| (key, value))
        })
    }

    pub fn keys(&self) -> Vec<SlotKey> {
        self.iter().map(|(key, _)| key).collect()
    }

    /// Removes every entry for which `remove` returns true and hands them back.
    pub fn drain_where<F>(&mut self, mut remove: F) -> Vec<(SlotKey, T)>
    where
        F: FnMut(SlotKey, &mut T) -> bool,
    {
        let doomed: Vec<SlotKey> = self
            .iter_mut()
            .filter_map(|(key, value)| remove(key, value).then_some(key))
            .collect();
        doomed
            .into_iter()
            .filter_map(|key| self.remove(key).map(|value| (key, value)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_keys_do_not_resolve() {
        let mut slots = Slots::new();
        let a = slots.insert("a");
        let b = slots.insert("b");
        assert_eq!(slots.len(), 2);

        assert_eq!(slots.remove(a), Some("a"));
        assert_eq!(slots.remove(a), None);
        assert!(!slots.contains(a));

        // The freed slot is reused under a new generation
        let c = slots.insert("c");
        assert_eq!(c.index, a.index);
        assert_ne!(c, a);
        assert_eq!(slots.get(a), None);
        assert_eq!(slots.get(c), Some(&"c"));
        assert_eq!(slots.get(b), Some(&"b"));
        assert_eq!(slots.len(), 2);
    }

    #[test]
    fn test_drain_where() {
        let mut slots = Slots::new();
        for i in 0..6 {
            slots.insert(i);
        }
        let removed = slots.drain_where(|_, v| *v % 2 == 0);
        let values: Vec<i32> = removed.into_iter().map(|(_, v)| v).collect();
        assert_eq!(values, [0, 2, 4]);
        assert_eq!(slots.len(), 3);
        let left: Vec<i32> = slots.iter().map(|(_, v)| *v).collect();
        assert_eq!(left, [1, 3, 5]);
    }
}
