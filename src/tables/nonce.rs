use alloc::{collections::VecDeque, vec::Vec};

use crate::suite::Suite;

pub const MAX_NONCES: usize = 256;

/// Recently seen interest nonces, newest first. Once full, the oldest nonce
/// is forgotten to make room.
pub struct NonceRing {
    nonces: VecDeque<(Suite, Vec<u8>)>,
    capacity: usize,
}

impl Default for NonceRing {
    fn default() -> Self {
        Self::new(MAX_NONCES)
    }
}

impl NonceRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            nonces: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.nonces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nonces.is_empty()
    }

    pub fn contains(&self, suite: Suite, nonce: &[u8]) -> bool {
        self.nonces
            .iter()
            .any(|(s, n)| *s == suite && n.as_slice() == nonce)
    }

    /// Records the nonce and reports whether it had been seen before.
    pub fn seen_before(&mut self, suite: Suite, nonce: &[u8]) -> bool {
        if self.contains(suite, nonce) {
            return true;
        }
        if self.capacity == 0 {
            return false;
        }
        if self.nonces.len() >= self.capacity {
            self.nonces.pop_back();
        }
        self.nonces.push_front((suite, nonce.to_vec()));
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seen_before() {
        let mut ring = NonceRing::default();
        assert!(!ring.seen_before(Suite::NdnTlv, &[1, 2, 3, 4]));
        assert!(ring.seen_before(Suite::NdnTlv, &[1, 2, 3, 4]));
        // Nonces are scoped by suite
        assert!(!ring.seen_before(Suite::Ccnb, &[1, 2, 3, 4]));
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn test_oldest_is_forgotten() {
        let mut ring = NonceRing::new(3);
        for n in 0u8..4 {
            assert!(!ring.seen_before(Suite::NdnTlv, &[n]));
        }
        assert_eq!(ring.len(), 3);
        assert!(!ring.contains(Suite::NdnTlv, &[0]));
        assert!(ring.contains(Suite::NdnTlv, &[3]));
        assert!(ring.contains(Suite::NdnTlv, &[1]));
    }
}
