//! In-memory descriptor database
//!
//! A self-contained range hierarchy implementing [`DescriptorProvider`]. Every
//! descriptor is stored under its meta record key (`range_meta_key(end_key)`),
//! so a provider lookup is a scan over meta records exactly as a real meta
//! range would serve it. Used by tests and the diagnostic CLI.

use crate::provider::{DescriptorProvider, LookupOptions};
use async_trait::async_trait;
use parking_lot::Mutex;
use rangecache_common::{
    Error, KEY_MAX, KEY_MIN, Key, META1_PREFIX, META2_KEY_MAX, META2_PREFIX, MetaLevel, NodeId,
    RangeDescriptor, RangeId, ReplicaDescriptor, ReplicaId, Result, StoreId, meta_key_target,
    meta_level, range_meta_key,
};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Descriptors returned per lookup unless configured otherwise
pub const DEFAULT_LOOKUP_BATCH_SIZE: usize = 3;

const REPLICATION_FACTOR: u32 = 3;
const NODE_COUNT: u32 = 5;

struct DbState {
    /// meta record key -> descriptor
    records: BTreeMap<Key, RangeDescriptor>,
    first_range: RangeDescriptor,
    next_range_id: u64,
    unavailable: Option<String>,
}

impl DbState {
    fn allocate_range_id(&mut self) -> RangeId {
        let id = RangeId::new(self.next_range_id);
        self.next_range_id += 1;
        id
    }
}

/// Spread replicas of a range over the nodes round-robin
fn replicas_for(range_id: RangeId) -> Vec<ReplicaDescriptor> {
    let base = u32::try_from(range_id.as_u64() % u64::from(NODE_COUNT)).unwrap_or_default();
    (0..REPLICATION_FACTOR)
        .map(|i| {
            let node = (base + i) % NODE_COUNT + 1;
            ReplicaDescriptor::new(NodeId::from(node), StoreId::from(node), ReplicaId::from(i + 1))
        })
        .collect()
}

fn make_descriptor(range_id: RangeId, start_key: Key, end_key: Key) -> RangeDescriptor {
    RangeDescriptor::new(range_id, start_key, end_key).with_replicas(replicas_for(range_id))
}

/// In-memory two-level range hierarchy
pub struct InMemoryDescriptorDb {
    state: Mutex<DbState>,
    batch_size: usize,
    latency: Option<Duration>,
    lookups: AtomicUsize,
    first_range_lookups: AtomicUsize,
}

impl Default for InMemoryDescriptorDb {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDescriptorDb {
    /// A hierarchy of three ranges partitioning the whole keyspace: the first
    /// range (meta1 records), one meta2 range and one user range.
    #[must_use]
    pub fn new() -> Self {
        let mut state = DbState {
            records: BTreeMap::new(),
            first_range: RangeDescriptor::default(),
            next_range_id: 1,
            unavailable: None,
        };

        let first_id = state.allocate_range_id();
        state.first_range = make_descriptor(first_id, KEY_MIN, Key::new(META2_PREFIX));

        let meta2_id = state.allocate_range_id();
        let meta2 = make_descriptor(meta2_id, Key::new(META2_PREFIX), META2_KEY_MAX);
        state.records.insert(range_meta_key(&meta2.end_key), meta2);

        let user_id = state.allocate_range_id();
        let user = make_descriptor(user_id, META2_KEY_MAX, KEY_MAX);
        state.records.insert(range_meta_key(&user.end_key), user);

        Self {
            state: Mutex::new(state),
            batch_size: DEFAULT_LOOKUP_BATCH_SIZE,
            latency: None,
            lookups: AtomicUsize::new(0),
            first_range_lookups: AtomicUsize::new(0),
        }
    }

    /// Set the number of descriptors returned per lookup
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Delay every provider call, simulating a network round trip
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Split the range containing `key` so that a new range starts at `key`.
    ///
    /// Meta2 keys split the meta2 ranges, any other key splits the user
    /// ranges. Returns the left and right halves. The left half keeps the
    /// original range id.
    pub fn split_range(&self, key: &Key) -> Result<(RangeDescriptor, RangeDescriptor)> {
        if meta_level(key) == MetaLevel::Meta1 {
            return Err(Error::InvalidSplit {
                key: key.clone(),
                reason: "the first range is never split".into(),
            });
        }

        let mut state = self.state.lock();
        let record_key = range_meta_key(key);
        let (existing_record, existing) = state
            .records
            .range((Bound::Excluded(record_key.clone()), Bound::Unbounded))
            .next()
            .filter(|(_, desc)| desc.contains_key(key))
            .map(|(k, desc)| (k.clone(), desc.clone()))
            .ok_or_else(|| Error::InvalidSplit {
                key: key.clone(),
                reason: "no range contains the key".into(),
            })?;
        if existing.start_key == *key {
            return Err(Error::InvalidSplit {
                key: key.clone(),
                reason: "key is already a range boundary".into(),
            });
        }

        let left = RangeDescriptor {
            end_key: key.clone(),
            ..existing.clone()
        };
        let right_id = state.allocate_range_id();
        let right = make_descriptor(right_id, key.clone(), existing.end_key);

        state.records.insert(record_key, left.clone());
        state.records.insert(existing_record, right.clone());
        debug!(%key, left = %left, right = %right, "split range");
        Ok((left, right))
    }

    /// Authoritative descriptor containing `key` (user or meta2 key)
    #[must_use]
    pub fn range_for(&self, key: &Key) -> Option<RangeDescriptor> {
        if meta_level(key) == MetaLevel::Meta1 {
            return Some(self.state.lock().first_range.clone());
        }
        let state = self.state.lock();
        state
            .records
            .range((Bound::Excluded(range_meta_key(key)), Bound::Unbounded))
            .next()
            .map(|(_, desc)| desc.clone())
            .filter(|desc| desc.contains_key(key))
    }

    /// All descriptors in meta record order (meta2 ranges first)
    #[must_use]
    pub fn descriptors(&self) -> Vec<RangeDescriptor> {
        self.state.lock().records.values().cloned().collect()
    }

    /// Make every provider call fail with `ServiceUnavailable`, or heal it
    pub fn set_unavailable(&self, reason: Option<String>) {
        self.state.lock().unavailable = reason;
    }

    /// Number of `range_lookup` calls served so far
    #[must_use]
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Return the `range_lookup` count and reset it to zero
    pub fn take_lookup_count(&self) -> usize {
        self.lookups.swap(0, Ordering::SeqCst)
    }

    #[must_use]
    pub fn first_range_count(&self) -> usize {
        self.first_range_lookups.load(Ordering::SeqCst)
    }

    fn scan(&self, meta_key: &Key, options: LookupOptions) -> Result<Vec<RangeDescriptor>> {
        let state = self.state.lock();
        if let Some(reason) = &state.unavailable {
            return Err(Error::ServiceUnavailable(reason.clone()));
        }
        if meta_key_target(meta_key).is_none() {
            return Err(Error::InvalidKey(format!("\"{meta_key}\" is not a meta record key")));
        }
        // Records never leave the meta level they were asked for.
        let level_prefix = if meta_key.has_prefix(META2_PREFIX) {
            META2_PREFIX
        } else {
            META1_PREFIX
        };
        let same_level = |k: &Key| k.has_prefix(level_prefix);

        let descs: Vec<RangeDescriptor> = if options.use_reverse_scan {
            match state.records.range(meta_key.clone()..).next() {
                Some((first_key, first)) if same_level(first_key) => std::iter::once(first.clone())
                    .chain(
                        state
                            .records
                            .range(..first_key.clone())
                            .rev()
                            .take_while(|(k, _)| same_level(k))
                            .map(|(_, desc)| desc.clone()),
                    )
                    .take(self.batch_size)
                    .collect(),
                _ => Vec::new(),
            }
        } else {
            state
                .records
                .range((Bound::Excluded(meta_key.clone()), Bound::Unbounded))
                .take_while(|(k, _)| same_level(k))
                .take(self.batch_size)
                .map(|(_, desc)| desc.clone())
                .collect()
        };

        if descs.is_empty() {
            return Err(Error::RangeNotFound {
                key: meta_key.clone(),
            });
        }
        Ok(descs)
    }
}

#[async_trait]
impl DescriptorProvider for InMemoryDescriptorDb {
    async fn range_lookup(
        &self,
        meta_key: &Key,
        options: LookupOptions,
        _meta_desc: &RangeDescriptor,
    ) -> Result<Vec<RangeDescriptor>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let descs = self.scan(meta_key, options)?;
        debug!(%meta_key, count = descs.len(), "served range lookup");
        Ok(descs)
    }

    async fn first_range(&self) -> Result<RangeDescriptor> {
        self.first_range_lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let state = self.state.lock();
        if let Some(reason) = &state.unavailable {
            return Err(Error::ServiceUnavailable(reason.clone()));
        }
        Ok(state.first_range.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Key {
        Key::from(s)
    }

    #[test]
    fn test_initial_hierarchy() {
        let db = InMemoryDescriptorDb::new();
        let descs = db.descriptors();
        assert_eq!(descs.len(), 2);
        assert_eq!(descs[0].start_key, Key::new(META2_PREFIX));
        assert_eq!(descs[0].end_key, META2_KEY_MAX);
        assert_eq!(descs[1].start_key, META2_KEY_MAX);
        assert_eq!(descs[1].end_key, KEY_MAX);
        assert_eq!(descs[1].replicas.len(), 3);
    }

    #[test]
    fn test_split_range() {
        let db = InMemoryDescriptorDb::new();
        let (left, right) = db.split_range(&key("m")).unwrap();
        assert_eq!((left.start_key.clone(), left.end_key.clone()), (META2_KEY_MAX, key("m")));
        assert_eq!((right.start_key.clone(), right.end_key.clone()), (key("m"), KEY_MAX));
        assert_ne!(left.range_id, right.range_id);

        assert_eq!(db.range_for(&key("a")), Some(left));
        assert_eq!(db.range_for(&key("m")), Some(right.clone()));
        assert_eq!(db.range_for(&key("zz")), Some(right));
    }

    #[test]
    fn test_split_at_boundary_rejected() {
        let db = InMemoryDescriptorDb::new();
        db.split_range(&key("m")).unwrap();
        let err = db.split_range(&key("m")).unwrap_err();
        assert!(matches!(err, Error::InvalidSplit { .. }));
        assert!(db.split_range(&Key::with_prefix(META1_PREFIX, b"m")).is_err());
        assert!(db.split_range(&Key::from(&b"\x00\x01"[..])).is_err());
    }

    #[test]
    fn test_keys_below_meta2_records_belong_to_first_range() {
        let db = InMemoryDescriptorDb::new();
        let first = db.range_for(&KEY_MIN).unwrap();
        assert_eq!(first.end_key, Key::new(META2_PREFIX));
        for raw in [&b"\x00"[..], b"\x00\x01", b"\x00\x00meta1m"] {
            assert_eq!(db.range_for(&Key::from(raw)), Some(first.clone()));
        }
    }

    #[test]
    fn test_meta_split_only_touches_meta_level() {
        let db = InMemoryDescriptorDb::new();
        db.split_range(&range_meta_key(&key("g"))).unwrap();
        let descs = db.descriptors();
        assert_eq!(descs.len(), 3);
        assert_eq!(descs[0].end_key, range_meta_key(&key("g")));
        assert_eq!(descs[1].start_key, range_meta_key(&key("g")));
        assert_eq!(descs[2].end_key, KEY_MAX);
    }

    #[tokio::test]
    async fn test_forward_lookup_prefetches_following_ranges() {
        let db = InMemoryDescriptorDb::new();
        for k in ["b", "c", "d", "e"] {
            db.split_range(&key(k)).unwrap();
        }
        let descs = db
            .range_lookup(
                &range_meta_key(&key("bb")),
                LookupOptions::default(),
                &RangeDescriptor::default(),
            )
            .await
            .unwrap();
        let starts: Vec<_> = descs.iter().map(|d| d.start_key.clone()).collect();
        assert_eq!(starts, vec![key("b"), key("c"), key("d")]);
        assert_eq!(db.take_lookup_count(), 1);
        assert_eq!(db.lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_reverse_lookup_walks_backwards() {
        let db = InMemoryDescriptorDb::new();
        for k in ["b", "c", "d", "e"] {
            db.split_range(&key(k)).unwrap();
        }
        let descs = db
            .range_lookup(
                &range_meta_key(&key("d")),
                LookupOptions::reverse(),
                &RangeDescriptor::default(),
            )
            .await
            .unwrap();
        let ends: Vec<_> = descs.iter().map(|d| d.end_key.clone()).collect();
        assert_eq!(ends, vec![key("d"), key("c"), key("b")]);
    }

    #[tokio::test]
    async fn test_lookup_stays_within_meta_level() {
        let db = InMemoryDescriptorDb::new();
        db.split_range(&range_meta_key(&key("m"))).unwrap();
        let descs = db
            .range_lookup(
                &range_meta_key(&range_meta_key(&key("a"))),
                LookupOptions::default(),
                &RangeDescriptor::default(),
            )
            .await
            .unwrap();
        // Two meta2 ranges exist; the user range record must not leak in.
        assert_eq!(descs.len(), 2);
        assert!(descs.iter().all(|d| d.start_key.has_prefix(META2_PREFIX)));
    }

    #[tokio::test]
    async fn test_unavailable_fails_lookups() {
        let db = InMemoryDescriptorDb::new();
        db.set_unavailable(Some("partitioned".into()));
        let err = db.first_range().await.unwrap_err();
        assert_eq!(err, Error::ServiceUnavailable("partitioned".into()));
        assert!(
            db.range_lookup(&range_meta_key(&key("a")), LookupOptions::default(), &RangeDescriptor::default())
                .await
                .is_err()
        );

        db.set_unavailable(None);
        assert!(db.first_range().await.is_ok());
    }

    #[tokio::test]
    async fn test_non_meta_key_rejected() {
        let db = InMemoryDescriptorDb::new();
        let err = db
            .range_lookup(&key("a"), LookupOptions::default(), &RangeDescriptor::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
    }
}
