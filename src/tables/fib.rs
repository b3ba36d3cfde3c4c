use alloc::vec::Vec;

use super::FaceToken;
use crate::{
    matching::{compare, MatchMode, MatchResult},
    prefix::Prefix,
    suite::Suite,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FibDestination {
    Face(FaceToken),
    /// Hand matching interests to `Platform::tap_interest`.
    Tap,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FibEntry {
    pub prefix: Prefix,
    pub destination: FibDestination,
}

impl FibEntry {
    pub fn suite(&self) -> Suite {
        self.prefix.suite()
    }

    /// Whether every component of this rule's prefix leads `name`.
    pub fn covers(&self, name: &Prefix) -> bool {
        compare(name, None, &self.prefix, MatchMode::Longest)
            == MatchResult::Matched(self.prefix.component_count())
    }
}

/// Forwarding table, kept in insertion order.
#[derive(Default)]
pub struct Fib {
    entries: Vec<FibEntry>,
}

impl Fib {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Installs a rule. A rule for the exact same prefix keeps its place in the
    /// table and gets the new destination; returns whether that happened.
    pub fn insert(&mut self, prefix: Prefix, destination: FibDestination) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|e| compare(&e.prefix, None, &prefix, MatchMode::Exact).is_match())
        {
            Some(entry) => {
                entry.destination = destination;
                true
            }
            None => {
                self.entries.push(FibEntry {
                    prefix,
                    destination,
                });
                false
            }
        }
    }

    pub fn remove(&mut self, prefix: &Prefix) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|e| !compare(&e.prefix, None, prefix, MatchMode::Exact).is_match());
        self.entries.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &FibEntry> + '_ {
        self.entries.iter()
    }

    /// Every rule whose prefix covers `name`, in table order.
    pub fn matches<'a>(&'a self, name: &'a Prefix) -> impl Iterator<Item = &'a FibEntry> + 'a {
        self.entries.iter().filter(move |e| e.covers(name))
    }

    /// The covering rule with the most components. Ties go to the older rule.
    pub fn longest_match(&self, name: &Prefix) -> Option<&FibEntry> {
        let mut best: Option<&FibEntry> = None;
        for entry in self.entries.iter().filter(|e| e.covers(name)) {
            if best.map_or(true, |b| entry.prefix.component_count() > b.prefix.component_count()) {
                best = Some(entry);
            }
        }
        best
    }

    /// Drops every rule pointing at `face`, returns how many there were.
    pub fn remove_face(&mut self, face: FaceToken) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|e| e.destination != FibDestination::Face(face));
        before - self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::SlotKey;

    fn face(index: u32) -> FaceToken {
        FaceToken(SlotKey {
            index,
            generation: 0,
        })
    }

    fn ndn(uri: &str) -> Prefix {
        Prefix::from_uri(uri, Suite::NdnTlv).unwrap()
    }

    #[test]
    fn test_duplicate_rule_replaces_in_place() {
        let mut fib = Fib::new();
        assert!(!fib.insert(ndn("/a"), FibDestination::Face(face(1))));
        assert!(!fib.insert(ndn("/b"), FibDestination::Face(face(2))));
        assert!(fib.insert(ndn("/a"), FibDestination::Tap));
        assert_eq!(fib.len(), 2);
        let first = fib.iter().next().unwrap();
        assert_eq!(first.prefix, ndn("/a"));
        assert_eq!(first.destination, FibDestination::Tap);

        // Same components in another suite are a separate rule
        let ccnx = Prefix::from_uri("/a", Suite::CcnTlv).unwrap();
        assert!(!fib.insert(ccnx, FibDestination::Face(face(1))));
        assert_eq!(fib.len(), 3);
    }

    #[test]
    fn test_matches_and_longest() {
        let mut fib = Fib::new();
        fib.insert(ndn("/a"), FibDestination::Face(face(1)));
        fib.insert(ndn("/a/b"), FibDestination::Face(face(2)));
        fib.insert(ndn("/x"), FibDestination::Face(face(3)));
        fib.insert(ndn("/a/b"), FibDestination::Face(face(4)));

        let name = ndn("/a/b/c");
        let hits: Vec<FibDestination> = fib.matches(&name).map(|e| e.destination).collect();
        assert_eq!(hits, [FibDestination::Face(face(1)), FibDestination::Face(face(4))]);
        assert_eq!(
            fib.longest_match(&name).unwrap().destination,
            FibDestination::Face(face(4))
        );

        // A rule longer than the name does not cover it
        assert_eq!(fib.matches(&ndn("/a")).count(), 1);
        assert!(fib.longest_match(&ndn("/q")).is_none());
        let ccnx = Prefix::from_uri("/a/b/c", Suite::CcnTlv).unwrap();
        assert!(fib.longest_match(&ccnx).is_none());
    }

    #[test]
    fn test_longest_match_outlives_name() {
        let mut fib = Fib::new();
        fib.insert(ndn("/a"), FibDestination::Face(face(1)));
        fib.insert(ndn("/a/b"), FibDestination::Face(face(2)));
        let best = {
            let name = ndn("/a/b/c");
            fib.longest_match(&name)
        };
        assert_eq!(best.map(|e| e.destination), Some(FibDestination::Face(face(2))));
    }

    #[test]
    fn test_remove() {
        let mut fib = Fib::new();
        fib.insert(ndn("/a"), FibDestination::Face(face(1)));
        fib.insert(ndn("/b"), FibDestination::Face(face(1)));
        fib.insert(ndn("/c"), FibDestination::Face(face(2)));
        assert!(fib.remove(&ndn("/c")));
        assert!(!fib.remove(&ndn("/c")));
        assert_eq!(fib.remove_face(face(1)), 2);
        assert!(fib.is_empty());
    }
}
