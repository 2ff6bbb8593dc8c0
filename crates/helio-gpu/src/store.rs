//! Associative store with generational eviction.
//!
//! The eviction policy is deliberately coarse: every entry carries a single
//! integer stamp, `collect()` walks all entries once, and nothing else is
//! bookkept per access. Pipeline-state objects are reused across many frames,
//! so an LRU list would be pure overhead for this access pattern.

use std::collections::hash_map::{Entry, HashMap};
use std::hash::Hash;

/// Counters for one [`GenerationalStore`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

#[derive(Debug)]
struct StoreEntry<V> {
    value: V,
    last_used_generation: u64,
}

/// Map from key to constructed value, swept by [`GenerationalStore::collect`].
///
/// The store exclusively owns every inserted value; eviction and
/// [`GenerationalStore::clear`] drop values, which is what releases the
/// underlying driver object for wgpu handle types. The generation counter is
/// per-instance, so independent caches never share eviction cadence.
///
/// A returned reference is live until the next `&mut self` call; callers that
/// need an object across a `collect()` must look it up again (which also
/// re-stamps it).
#[derive(Debug)]
pub struct GenerationalStore<K, V> {
    entries: HashMap<K, StoreEntry<V>>,
    generation: u64,
    max_age: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<K: Eq + Hash, V> GenerationalStore<K, V> {
    /// `max_age` is the number of generations an entry may go untouched before
    /// a sweep evicts it. Clamped to at least 1 so an entry created since the
    /// previous sweep always survives the next one; with a limit of 0 the
    /// sweep closing the frame that created an object would destroy it while
    /// the caller may still hold it.
    pub fn new(max_age: u64) -> Self {
        Self {
            entries: HashMap::new(),
            generation: 0,
            max_age: max_age.max(1),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Look up `key`; on a miss, invoke `create` and insert the result.
    ///
    /// A hit re-stamps the entry with the current generation. Once a mapping
    /// exists it is never replaced: a second insertion of an equal key is
    /// structurally impossible through this interface, it is a hit.
    pub fn get_or_create<F>(&mut self, key: K, create: F) -> &V
    where
        F: FnOnce(&K) -> V,
    {
        match self.entries.entry(key) {
            Entry::Occupied(entry) => {
                self.hits += 1;
                let entry = entry.into_mut();
                entry.last_used_generation = self.generation;
                &entry.value
            }
            Entry::Vacant(entry) => {
                self.misses += 1;
                let value = create(entry.key());
                &entry
                    .insert(StoreEntry {
                        value,
                        last_used_generation: self.generation,
                    })
                    .value
            }
        }
    }

    /// Like [`GenerationalStore::get_or_create`] with a constructor that can
    /// fail. A `None` from the constructor is returned to the caller and the
    /// slot stays vacant: the next lookup misses again, so a transient
    /// construction failure never poisons the mapping, and the store itself
    /// performs no retry.
    pub fn try_get_or_create<F>(&mut self, key: K, create: F) -> Option<&V>
    where
        F: FnOnce(&K) -> Option<V>,
    {
        match self.entries.entry(key) {
            Entry::Occupied(entry) => {
                self.hits += 1;
                let entry = entry.into_mut();
                entry.last_used_generation = self.generation;
                Some(&entry.value)
            }
            Entry::Vacant(entry) => {
                self.misses += 1;
                let value = create(entry.key())?;
                Some(
                    &entry
                        .insert(StoreEntry {
                            value,
                            last_used_generation: self.generation,
                        })
                        .value,
                )
            }
        }
    }

    /// Re-stamp `key`'s entry without touching the hit/miss counters,
    /// returning whether it exists. Used for internal cross-references (a
    /// pipeline build keeping its shader modules warm) that should not read
    /// as cache traffic.
    pub fn touch(&mut self, key: &K) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_used_generation = self.generation;
                true
            }
            None => false,
        }
    }

    /// Read `key`'s value without re-stamping it or counting traffic.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Advance the generation and evict every entry untouched for more than
    /// `max_age` generations. O(n); intended to be called once per frame or
    /// every few frames, never implicitly.
    pub fn collect(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        let max_age = self.max_age;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| generation <= entry.last_used_generation + max_age);
        self.evictions += (before - self.entries.len()) as u64;
    }

    /// Drop every entry unconditionally (teardown, device loss).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            entries: self.entries.len(),
        }
    }
}
