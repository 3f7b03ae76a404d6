//! Ordered, byte-budgeted LRU container
//!
//! The range descriptor cache only needs ordered inserts, deletes, ceiling
//! queries and key-range scans from its storage, so those operations are
//! captured by [`OrderedStore`] and the descriptor logic stays layered on
//! top. [`LruOrderedCache`] is the default implementation: a `BTreeMap` for
//! key order plus a logical-clock recency index for eviction.

use rangecache_common::{Key, RangeDescriptor};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Approximate in-memory footprint used for byte budgeting
pub trait Weigh {
    fn weigh(&self) -> usize;
}

impl Weigh for Key {
    fn weigh(&self) -> usize {
        self.len()
    }
}

/// Fixed per-descriptor overhead (struct, Arc header, replica vec header)
const DESCRIPTOR_OVERHEAD: usize = 96;

impl Weigh for RangeDescriptor {
    fn weigh(&self) -> usize {
        DESCRIPTOR_OVERHEAD
            + self.start_key.len()
            + self.end_key.len()
            + self.replicas.len() * std::mem::size_of::<rangecache_common::ReplicaDescriptor>()
    }
}

impl<T: Weigh + ?Sized> Weigh for Arc<T> {
    fn weigh(&self) -> usize {
        (**self).weigh()
    }
}

/// Storage capability the range descriptor cache is built on.
///
/// `get` and `ceiling` count as uses for recency; the `peek` variants and
/// `keys_in_range` do not.
pub trait OrderedStore<K: Ord + Clone, V: Clone> {
    /// Insert or replace `key`. Returns the number of other entries evicted
    /// to get back under the byte budget. An entry heavier than the whole
    /// budget is dropped instead of stored.
    fn insert(&mut self, key: K, value: V) -> usize;

    fn remove(&mut self, key: &K) -> Option<V>;

    fn get(&mut self, key: &K) -> Option<V>;

    /// Like `get` without touching recency
    fn peek(&self, key: &K) -> Option<V>;

    /// Smallest stored key `>= key`
    fn ceiling(&mut self, key: &K) -> Option<(K, V)>;

    /// Like `ceiling` without touching recency
    fn peek_ceiling(&self, key: &K) -> Option<(K, V)>;

    /// Stored keys in `[from, to)`, in order. Empty when `from >= to`.
    fn keys_in_range(&self, from: &K, to: &K) -> Vec<K>;

    /// All entries in key order
    fn entries(&self) -> Vec<(K, V)>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn size_bytes(&self) -> usize;

    fn clear(&mut self);
}

struct Slot<V> {
    value: V,
    weight: usize,
    /// Logical time of last use
    tick: u64,
}

/// Ordered map with least-recently-used eviction past a byte budget
pub struct LruOrderedCache<K, V> {
    entries: BTreeMap<K, Slot<V>>,
    /// tick -> key, oldest first
    recency: BTreeMap<u64, K>,
    clock: u64,
    size_bytes: usize,
    max_bytes: usize,
}

impl<K, V> LruOrderedCache<K, V>
where
    K: Ord + Clone + Weigh,
    V: Clone + Weigh,
{
    /// Create an empty cache holding at most `max_bytes` of entries
    #[must_use]
    pub const fn new(max_bytes: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            recency: BTreeMap::new(),
            clock: 0,
            size_bytes: 0,
            max_bytes,
        }
    }

    #[must_use]
    pub const fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    fn next_tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn touch(&mut self, key: &K) {
        let tick = self.next_tick();
        if let Some(slot) = self.entries.get_mut(key) {
            let old = std::mem::replace(&mut slot.tick, tick);
            self.recency.remove(&old);
            self.recency.insert(tick, key.clone());
        }
    }

    /// Evict least recently used entries until within budget
    fn evict_to_budget(&mut self) -> usize {
        let mut evicted = 0;
        while self.size_bytes > self.max_bytes {
            let Some((_, key)) = self.recency.pop_first() else {
                break;
            };
            if let Some(slot) = self.entries.remove(&key) {
                self.size_bytes -= slot.weight;
                evicted += 1;
            }
        }
        evicted
    }
}

impl<K, V> OrderedStore<K, V> for LruOrderedCache<K, V>
where
    K: Ord + Clone + Weigh,
    V: Clone + Weigh,
{
    fn insert(&mut self, key: K, value: V) -> usize {
        self.remove(&key);
        let weight = key.weigh() + value.weigh();
        // Never flush the whole cache for one entry that cannot fit anyway.
        if weight > self.max_bytes {
            return 0;
        }
        let tick = self.next_tick();
        self.recency.insert(tick, key.clone());
        self.entries.insert(
            key,
            Slot {
                value,
                weight,
                tick,
            },
        );
        self.size_bytes += weight;
        self.evict_to_budget()
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.entries.remove(key)?;
        self.recency.remove(&slot.tick);
        self.size_bytes -= slot.weight;
        Some(slot.value)
    }

    fn get(&mut self, key: &K) -> Option<V> {
        let value = self.entries.get(key)?.value.clone();
        self.touch(key);
        Some(value)
    }

    fn peek(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|slot| slot.value.clone())
    }

    fn ceiling(&mut self, key: &K) -> Option<(K, V)> {
        let (k, v) = self.peek_ceiling(key)?;
        self.touch(&k);
        Some((k, v))
    }

    fn peek_ceiling(&self, key: &K) -> Option<(K, V)> {
        self.entries
            .range(key.clone()..)
            .next()
            .map(|(k, slot)| (k.clone(), slot.value.clone()))
    }

    fn keys_in_range(&self, from: &K, to: &K) -> Vec<K> {
        if from >= to {
            return Vec::new();
        }
        self.entries
            .range(from.clone()..to.clone())
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn entries(&self) -> Vec<(K, V)> {
        self.entries
            .iter()
            .map(|(k, slot)| (k.clone(), slot.value.clone()))
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
        self.size_bytes = 0;
    }
}
