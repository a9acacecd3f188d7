//! VersionChain - Generation-ordered history of one value
//!
//! Entries are ordered by strictly increasing generation. An entry whose
//! value is `None` is a tombstone. The value visible at generation G is the
//! entry with the largest generation <= G; a tombstone there means absent.

use std::sync::Arc;

use super::Generation;

/// One entry of a chain.
#[derive(Debug)]
pub struct ChainEntry<T> {
    pub generation: Generation,
    pub value: Option<Arc<T>>,
}

impl<T> Clone for ChainEntry<T> {
    fn clone(&self) -> Self {
        Self {
            generation: self.generation,
            value: self.value.clone(),
        }
    }
}

impl<T> ChainEntry<T> {
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

#[derive(Debug)]
pub struct VersionChain<T> {
    entries: Vec<ChainEntry<T>>,
}

impl<T> Default for VersionChain<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> VersionChain<T> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn entries(&self) -> &[ChainEntry<T>] {
        &self.entries
    }

    pub fn latest(&self) -> Option<&ChainEntry<T>> {
        self.entries.last()
    }

    /// Appends an entry.
    ///
    /// The caller holds the writer lock and passes a generation above every
    /// entry already in the chain.
    pub fn push(&mut self, generation: Generation, value: Option<Arc<T>>) {
        debug_assert!(
            self.entries.last().map_or(true, |e| e.generation < generation),
            "chain entries must be pushed in increasing generation order"
        );
        self.entries.push(ChainEntry { generation, value });
    }

    /// Returns the entry in effect at `generation`.
    pub fn visible(&self, generation: Generation) -> Option<&ChainEntry<T>> {
        let idx = self.entries.partition_point(|e| e.generation <= generation);
        idx.checked_sub(1).map(|i| &self.entries[i])
    }

    /// Returns the value at `generation`, `None` if absent or tombstoned.
    pub fn value_at(&self, generation: Generation) -> Option<&Arc<T>> {
        self.visible(generation).and_then(|e| e.value.as_ref())
    }

    /// Drops every entry superseded at or before `floor`.
    ///
    /// The entry in effect at `floor` and every later entry are kept.
    /// Returns the number of entries removed.
    pub fn collect(&mut self, floor: Generation) -> usize {
        let idx = self.entries.partition_point(|e| e.generation <= floor);
        if idx <= 1 {
            return 0;
        }
        self.entries.drain(..idx - 1).count()
    }

    /// Returns true if no reader at or above `floor` can see a value here.
    pub fn is_dead(&self, floor: Generation) -> bool {
        match self.entries.as_slice() {
            [only] => only.is_tombstone() && only.generation <= floor,
            _ => false,
        }
    }

    /// Returns true if generations are strictly increasing.
    pub fn is_ordered(&self) -> bool {
        self.entries
            .windows(2)
            .all(|w| w[0].generation < w[1].generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn g(v: u64) -> Generation {
        Generation::new(v)
    }

    fn chain(entries: &[(u64, Option<&'static str>)]) -> VersionChain<&'static str> {
        let mut c = VersionChain::new();
        for (gen, value) in entries {
            c.push(g(*gen), value.map(Arc::new));
        }
        c
    }

    #[test]
    fn test_visibility_picks_latest_at_or_below() {
        let c = chain(&[(2, Some("a")), (5, Some("b")), (9, None)]);

        assert!(c.value_at(g(1)).is_none());
        assert_eq!(**c.value_at(g(2)).unwrap(), "a");
        assert_eq!(**c.value_at(g(4)).unwrap(), "a");
        assert_eq!(**c.value_at(g(5)).unwrap(), "b");
        assert_eq!(**c.value_at(g(8)).unwrap(), "b");
        assert!(c.value_at(g(9)).is_none());
        assert!(c.visible(g(9)).unwrap().is_tombstone());
    }

    #[test]
    fn test_collect_keeps_entry_valid_at_floor() {
        let mut c = chain(&[(1, Some("a")), (3, Some("b")), (6, Some("c")), (10, Some("d"))]);

        assert_eq!(c.collect(g(7)), 2);
        assert_eq!(c.len(), 2);
        assert_eq!(**c.value_at(g(7)).unwrap(), "c");
        assert_eq!(**c.value_at(g(10)).unwrap(), "d");
    }

    #[test]
    fn test_collect_never_drops_latest() {
        let mut c = chain(&[(1, Some("a")), (2, Some("b"))]);
        assert_eq!(c.collect(g(100)), 1);
        assert_eq!(c.len(), 1);
        assert_eq!(**c.value_at(g(100)).unwrap(), "b");
    }

    #[test]
    fn test_collect_below_first_entry_is_noop() {
        let mut c = chain(&[(5, Some("a")), (6, Some("b"))]);
        assert_eq!(c.collect(g(4)), 0);
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn test_dead_chain_detection() {
        let mut c = chain(&[(1, Some("a")), (4, None)]);
        assert!(!c.is_dead(g(4)));
        c.collect(g(4));
        assert!(c.is_dead(g(4)));
        assert!(!c.is_dead(g(3)));

        let live = chain(&[(1, Some("a"))]);
        assert!(!live.is_dead(g(10)));
    }

    #[test]
    fn test_is_ordered() {
        assert!(chain(&[(1, Some("a")), (2, None)]).is_ordered());
        assert!(VersionChain::<&str>::new().is_ordered());
    }
}
