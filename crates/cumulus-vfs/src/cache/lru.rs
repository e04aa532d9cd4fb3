//! Bounded LRU keyed by record id, with one secondary lookup index.
//!
//! Recency is a monotonic tick per access; `recency` orders ticks so the
//! oldest entry is always `first`. Every access, lookups included, moves the
//! entry's tick, so callers need exclusive access even to read.
//!
//! Values carry a write generation. A replacement older than the resident
//! value is dropped, so a slow reader cannot put back a record that a
//! concurrent writer has already superseded.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::hash::Hash;

/// A value that can live in an [`IndexedLru`].
pub trait Indexed {
    /// Secondary lookup key.
    type Key: Hash + Eq + Clone + Debug;

    /// Primary key (record id).
    fn primary_key(&self) -> &str;

    /// Secondary key, if the value has one yet.
    fn index_key(&self) -> Option<Self::Key>;

    /// Write generation; higher is newer.
    fn generation(&self) -> u64;
}

/// Result of a secondary-index lookup.
#[derive(Debug)]
pub enum IndexLookup<T> {
    Hit(T),
    Miss,
    /// The index names an id the primary map no longer holds.
    Dangling(String),
}

#[derive(Debug)]
struct Slot<T> {
    value: T,
    tick: u64,
}

#[derive(Debug)]
pub struct IndexedLru<T: Indexed> {
    capacity: usize,
    next_tick: u64,
    entries: HashMap<String, Slot<T>>,
    recency: BTreeMap<u64, String>,
    index: HashMap<T::Key, String>,
}

impl<T: Indexed + Clone> IndexedLru<T> {
    /// Create a cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_tick: 0,
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Membership test without touching recency.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Look up by id, promoting the entry to most recently used.
    pub fn get(&mut self, id: &str) -> Option<T> {
        self.promote(id)?;
        self.entries.get(id).map(|slot| slot.value.clone())
    }

    /// Look up through the secondary index, promoting on hit.
    pub fn get_by_key(&mut self, key: &T::Key) -> IndexLookup<T> {
        let Some(id) = self.index.get(key).cloned() else {
            return IndexLookup::Miss;
        };
        match self.get(&id) {
            Some(value) => IndexLookup::Hit(value),
            None => IndexLookup::Dangling(id),
        }
    }

    /// Insert or replace a value, returning whatever was evicted to make room.
    ///
    /// Replacing drops the previous value's secondary binding first, so a
    /// renamed record is no longer reachable under its old key. A value
    /// older than the resident one is ignored.
    pub fn insert(&mut self, value: T) -> Vec<T> {
        let id = value.primary_key().to_string();
        let superseded = self
            .entries
            .get(&id)
            .is_some_and(|slot| slot.value.generation() > value.generation());
        if superseded {
            return Vec::new();
        }
        if let Some(old) = self.detach(&id) {
            self.unbind(&old);
        }

        if let Some(key) = value.index_key() {
            self.index.insert(key, id.clone());
        }
        let tick = self.bump();
        self.recency.insert(tick, id.clone());
        self.entries.insert(id, Slot { value, tick });

        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            match self.evict_oldest() {
                Some(value) => evicted.push(value),
                None => break,
            }
        }
        evicted
    }

    /// Drop an entry and its secondary binding.
    pub fn remove(&mut self, id: &str) -> Option<T> {
        let value = self.detach(id)?;
        self.unbind(&value);
        Some(value)
    }

    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn promote(&mut self, id: &str) -> Option<()> {
        let tick = self.bump();
        let slot = self.entries.get_mut(id)?;
        self.recency.remove(&slot.tick);
        slot.tick = tick;
        self.recency.insert(tick, id.to_string());
        Some(())
    }

    /// Remove from the primary map and recency order only.
    fn detach(&mut self, id: &str) -> Option<T> {
        let slot = self.entries.remove(id)?;
        self.recency.remove(&slot.tick);
        Some(slot.value)
    }

    /// Drop the value's secondary binding, unless another id has taken the key.
    fn unbind(&mut self, value: &T) {
        let Some(key) = value.index_key() else {
            return;
        };
        if self.index.get(&key).map(String::as_str) == Some(value.primary_key()) {
            self.index.remove(&key);
        }
    }

    fn evict_oldest(&mut self) -> Option<T> {
        let (_, id) = self.recency.pop_first()?;
        let slot = self.entries.remove(&id)?;
        self.unbind(&slot.value);
        Some(slot.value)
    }

    #[cfg(test)]
    fn index_len(&self) -> usize {
        self.index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: String,
        key: String,
        generation: u64,
    }

    impl Indexed for Item {
        type Key = String;

        fn primary_key(&self) -> &str {
            &self.id
        }

        fn index_key(&self) -> Option<String> {
            (!self.key.is_empty()).then(|| self.key.clone())
        }

        fn generation(&self) -> u64 {
            self.generation
        }
    }

    fn item(id: &str, key: &str) -> Item {
        item_at(id, key, 1)
    }

    fn item_at(id: &str, key: &str, generation: u64) -> Item {
        Item {
            id: id.into(),
            key: key.into(),
            generation,
        }
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut lru = IndexedLru::new(2);
        lru.insert(item("a", "/a"));
        lru.insert(item("b", "/b"));
        assert!(lru.get("a").is_some());

        let evicted = lru.insert(item("c", "/c"));
        assert_eq!(evicted, vec![item("b", "/b")]);
        assert_eq!(lru.len(), 2);
        assert!(lru.contains("a"));
        assert!(!lru.contains("b"));
        assert!(matches!(lru.get_by_key(&"/b".to_string()), IndexLookup::Miss));
        assert_eq!(lru.index_len(), 2);
    }

    #[test]
    fn test_lookup_by_key_promotes() {
        let mut lru = IndexedLru::new(2);
        lru.insert(item("a", "/a"));
        lru.insert(item("b", "/b"));
        assert!(matches!(lru.get_by_key(&"/a".to_string()), IndexLookup::Hit(_)));

        lru.insert(item("c", "/c"));
        assert!(lru.contains("a"));
        assert!(!lru.contains("b"));
    }

    #[test]
    fn test_replace_rebinds_key() {
        let mut lru = IndexedLru::new(4);
        lru.insert(item("a", "/old"));
        lru.insert(item("a", "/new"));

        assert_eq!(lru.len(), 1);
        assert!(matches!(lru.get_by_key(&"/old".to_string()), IndexLookup::Miss));
        match lru.get_by_key(&"/new".to_string()) {
            IndexLookup::Hit(v) => assert_eq!(v.id, "a"),
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[test]
    fn test_older_generation_does_not_replace() {
        let mut lru = IndexedLru::new(4);
        lru.insert(item_at("a", "/z", 2));

        // A reader that fetched "a" before its rename reports back late.
        assert!(lru.insert(item_at("a", "/a", 1)).is_empty());

        assert!(matches!(lru.get_by_key(&"/a".to_string()), IndexLookup::Miss));
        match lru.get_by_key(&"/z".to_string()) {
            IndexLookup::Hit(v) => assert_eq!(v.generation, 2),
            other => panic!("expected hit, got {other:?}"),
        }
        assert_eq!(lru.index_len(), 1);
    }

    #[test]
    fn test_eviction_keeps_rebound_key() {
        // "a" leaves /p, "b" takes it; evicting "a" must not unbind "b".
        let mut lru = IndexedLru::new(2);
        lru.insert(item("a", "/p"));
        lru.insert(item("b", "/p"));
        lru.insert(item("c", "/c"));

        assert!(!lru.contains("a"));
        match lru.get_by_key(&"/p".to_string()) {
            IndexLookup::Hit(v) => assert_eq!(v.id, "b"),
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[test]
    fn test_remove() {
        let mut lru = IndexedLru::new(2);
        lru.insert(item("a", "/a"));
        assert_eq!(lru.remove("a"), Some(item("a", "/a")));
        assert!(lru.is_empty());
        assert_eq!(lru.index_len(), 0);
        assert!(lru.remove("a").is_none());
    }

    #[test]
    fn test_zero_capacity_clamps_to_one() {
        let mut lru = IndexedLru::new(0);
        lru.insert(item("a", "/a"));
        assert_eq!(lru.len(), 1);
        assert_eq!(lru.capacity(), 1);
    }
}
