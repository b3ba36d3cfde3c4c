use core::array;

/// Fixed-capacity FIFO. Pushing into a full ring hands the item back instead
/// of overwriting anything.
pub struct RingBuffer<T, const SIZE: usize> {
    storage: [Option<T>; SIZE],
    read: usize,
    len: usize,
}

impl<T, const SIZE: usize> Default for RingBuffer<T, SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const SIZE: usize> RingBuffer<T, SIZE> {
    pub fn new() -> Self {
        Self {
            storage: array::from_fn(|_| None),
            read: 0,
            len: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        SIZE
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == SIZE
    }

    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        // The write head is always `len` slots after the read head
        let write = (self.read + self.len) % SIZE;
        self.storage[write] = Some(item);
        self.len += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let item = self.storage[self.read].take();
        self.read = (self.read + 1) % SIZE;
        self.len -= 1;
        item
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |i| self.storage[(self.read + i) % SIZE].as_ref())
    }

    /// Drops every queued item `remove` selects, keeping the rest in order.
    pub fn remove_where<F>(&mut self, mut remove: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let mut kept = 0;
        let count = self.len;
        for i in 0..count {
            let from = (self.read + i) % SIZE;
            let Some(item) = self.storage[from].take() else {
                continue;
            };
            if remove(&item) {
                continue;
            }
            self.storage[(self.read + kept) % SIZE] = Some(item);
            kept += 1;
        }
        self.len = kept;
        count - kept
    }
}
