//! Range descriptor cache
//!
//! Descriptors are indexed by the meta key of their end key, so a ceiling
//! query on `meta(key)` lands on the only cached range that can contain
//! `key`. Misses walk up the meta hierarchy until a cached (or the first)
//! range is found, then resolve back down one provider round trip per level.

use crate::inflight::InflightLookups;
use crate::ordered::{LruOrderedCache, OrderedStore};
use crate::provider::{DescriptorProvider, LookupOptions};
use crate::stats::CacheStats;
use parking_lot::Mutex;
use rangecache_common::{CacheConfig, Error, Key, RangeDescriptor, Result, range_meta_key};
use std::sync::Arc;
use tracing::{debug, trace};

/// Default container: descriptors in meta key order under a byte budget
pub type DescriptorStore = LruOrderedCache<Key, Arc<RangeDescriptor>>;

/// Meta levels a lookup may climb before giving up
pub const MAX_META_DEPTH: usize = 2;

/// First cache key the lower overlap scan may touch.
///
/// The start key is encoded first and the encoded key advanced, never the
/// reverse. Entries cached at the start key's own meta key end where `desc`
/// begins and never overlap it.
fn lower_scan_start(desc: &RangeDescriptor) -> Key {
    range_meta_key(&desc.start_key).next()
}

/// Client-side cache of range descriptors
pub struct RangeDescriptorCache<P, S = DescriptorStore> {
    provider: P,
    store: Mutex<S>,
    inflight: Option<InflightLookups>,
    stats: CacheStats,
}

impl<P: DescriptorProvider> RangeDescriptorCache<P> {
    /// Create a cache holding at most `max_bytes` of descriptors
    pub fn new(provider: P, max_bytes: usize) -> Self {
        Self::with_store(provider, LruOrderedCache::new(max_bytes), true)
    }

    pub fn with_config(provider: P, config: &CacheConfig) -> Self {
        Self::with_store(
            provider,
            LruOrderedCache::new(config.max_bytes),
            config.coalesce_lookups,
        )
    }
}

impl<P, S> RangeDescriptorCache<P, S>
where
    P: DescriptorProvider,
    S: OrderedStore<Key, Arc<RangeDescriptor>>,
{
    /// Build on a custom container. With `coalesce` set, concurrent misses
    /// resolving the same meta key share one provider round trip.
    pub fn with_store(provider: P, store: S, coalesce: bool) -> Self {
        Self {
            provider,
            store: Mutex::new(store),
            inflight: coalesce.then(InflightLookups::default),
            stats: CacheStats::default(),
        }
    }

    pub const fn provider(&self) -> &P {
        &self.provider
    }

    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.store.lock().size_bytes()
    }

    pub fn clear(&self) {
        self.store.lock().clear();
    }

    /// Cached entries in cache key order
    pub fn dump(&self) -> Vec<(Key, Arc<RangeDescriptor>)> {
        self.store.lock().entries()
    }

    /// Resolve the descriptor of the range containing `key`.
    ///
    /// With `options.use_reverse_scan` the range that ends at `key` is
    /// returned instead (`start < key <= end`). Provider errors are returned
    /// unchanged.
    pub async fn lookup_range_descriptor(
        &self,
        key: &Key,
        options: LookupOptions,
    ) -> Result<Arc<RangeDescriptor>> {
        if let Some((_, desc)) = self.get_cached_range_descriptor(key, options.use_reverse_scan) {
            CacheStats::incr(&self.stats.hits);
            trace!(%key, range = %desc, "range cache hit");
            return Ok(desc);
        }
        CacheStats::incr(&self.stats.misses);
        trace!(%key, "range cache miss");

        // Keys whose meta level still has to be resolved, innermost first.
        let mut pending: Vec<Key> = Vec::new();
        let mut current = key.clone();
        let mut desc = loop {
            let meta_key = range_meta_key(&current);
            if meta_key.is_min() {
                CacheStats::incr(&self.stats.first_range_lookups);
                break Arc::new(self.provider.first_range().await?);
            }
            if current != *key {
                if let Some((_, cached)) = self.get_cached_range_descriptor(&current, false) {
                    break cached;
                }
            }
            if pending.len() >= MAX_META_DEPTH {
                return Err(Error::MetaDepthExceeded {
                    key: key.clone(),
                    depth: MAX_META_DEPTH,
                });
            }
            pending.push(current);
            current = meta_key;
        };

        while let Some(target) = pending.pop() {
            let level_options = if target == *key {
                options
            } else {
                LookupOptions::default()
            };
            desc = self.resolve_level(&target, level_options, &desc).await?;
        }

        debug!(%key, range = %desc, "resolved range descriptor");
        Ok(desc)
    }

    /// Find the cached descriptor for `key` together with its cache key.
    ///
    /// Exclusive mode looks for `start <= key < end`; inclusive mode for
    /// `start < key <= end`.
    pub fn get_cached_range_descriptor(
        &self,
        key: &Key,
        inclusive: bool,
    ) -> Option<(Key, Arc<RangeDescriptor>)> {
        let mut store = self.store.lock();
        Self::lookup_locked(&mut store, key, inclusive)
    }

    /// Evict the cached descriptor for `key` and the meta descriptor that
    /// addresses it.
    ///
    /// When `seen` is given the eviction only happens if the cached
    /// descriptor still equals it; a mismatch (or nothing cached) means
    /// someone already replaced the stale entry. Without `seen` both levels
    /// are evicted whatever is cached. Returns true if any entry was removed.
    pub fn evict_cached_range_descriptor(
        &self,
        key: &Key,
        seen: Option<&RangeDescriptor>,
        inclusive: bool,
    ) -> bool {
        let mut store = self.store.lock();
        let cached = Self::lookup_locked(&mut store, key, inclusive);
        if let Some(seen) = seen {
            match &cached {
                Some((_, current)) if **current == *seen => {}
                Some((_, current)) => {
                    debug!(%key, cached = %current, seen = %seen, "cached descriptor changed, skipping eviction");
                    return false;
                }
                None => {
                    trace!(%key, "nothing cached to evict");
                    return false;
                }
            }
        }

        let mut removed = false;
        if let Some((cache_key, desc)) = cached {
            store.remove(&cache_key);
            CacheStats::incr(&self.stats.evictions);
            debug!(%key, range = %desc, "evicted range descriptor");
            removed = true;
        }

        let meta_key = range_meta_key(key);
        if !meta_key.is_min() {
            if let Some((meta_cache_key, meta_desc)) =
                Self::lookup_locked(&mut store, &meta_key, false)
            {
                store.remove(&meta_cache_key);
                CacheStats::incr(&self.stats.evictions);
                debug!(key = %meta_key, range = %meta_desc, "evicted meta range descriptor");
                removed = true;
            }
        }
        removed
    }

    /// Insert descriptors learned elsewhere, replacing any cached entries
    /// they overlap.
    pub fn insert_range_descriptors(&self, descs: impl IntoIterator<Item = RangeDescriptor>) {
        let mut store = self.store.lock();
        for desc in descs {
            self.insert_locked(&mut store, Arc::new(desc));
        }
    }

    /// Resolve `target` given the descriptor of the meta range indexing it
    async fn resolve_level(
        &self,
        target: &Key,
        options: LookupOptions,
        meta_desc: &RangeDescriptor,
    ) -> Result<Arc<RangeDescriptor>> {
        let inclusive = options.use_reverse_scan;
        let meta_key = range_meta_key(target);

        let _guard = match &self.inflight {
            Some(inflight) => {
                let guard = inflight.acquire(&meta_key).await;
                if let Some((_, desc)) = self.get_cached_range_descriptor(target, inclusive) {
                    CacheStats::incr(&self.stats.coalesced);
                    trace!(key = %target, "lookup satisfied by concurrent resolution");
                    return Ok(desc);
                }
                Some(guard)
            }
            None => None,
        };

        CacheStats::incr(&self.stats.provider_lookups);
        let descs = self
            .provider
            .range_lookup(&meta_key, options, meta_desc)
            .await?;
        trace!(key = %target, %meta_key, count = descs.len(), "provider returned descriptors");
        self.insert_and_find(target, inclusive, descs)
    }

    /// Cache a provider response and pick the descriptor covering `target`
    fn insert_and_find(
        &self,
        target: &Key,
        inclusive: bool,
        descs: Vec<RangeDescriptor>,
    ) -> Result<Arc<RangeDescriptor>> {
        if descs.is_empty() {
            return Err(Error::protocol_violation(target, "empty lookup response"));
        }
        let descs: Vec<Arc<RangeDescriptor>> = descs.into_iter().map(Arc::new).collect();

        let cached = {
            let mut store = self.store.lock();
            for desc in &descs {
                self.insert_locked(&mut store, Arc::clone(desc));
            }
            Self::lookup_locked(&mut store, target, inclusive)
        };
        if let Some((_, desc)) = cached {
            return Ok(desc);
        }

        // Not cached: the budget may have pushed it out already.
        descs
            .iter()
            .find(|desc| desc.contains_key_for_mode(target, inclusive))
            .cloned()
            .ok_or_else(|| {
                Error::protocol_violation(
                    target,
                    format!("none of {} returned descriptors covers the key", descs.len()),
                )
            })
    }

    fn lookup_locked(
        store: &mut S,
        key: &Key,
        inclusive: bool,
    ) -> Option<(Key, Arc<RangeDescriptor>)> {
        let meta_key = if inclusive {
            range_meta_key(key)
        } else {
            range_meta_key(&key.next())
        };
        let (cache_key, desc) = store.ceiling(&meta_key)?;

        if !desc.contains_key(key) {
            // Inclusive mode also accepts the range ending exactly at `key`.
            if inclusive && desc.end_key == *key {
                return Some((cache_key, desc));
            }
            return None;
        }
        // The range ending at `key` precedes this one and is not cached.
        if inclusive && desc.start_key == *key {
            return None;
        }
        Some((cache_key, desc))
    }

    fn insert_locked(&self, store: &mut S, desc: Arc<RangeDescriptor>) {
        let cache_key = range_meta_key(&desc.end_key);
        let cleared = Self::clear_overlapping_locked(store, &cache_key, &desc);
        CacheStats::add(&self.stats.overlap_evictions, cleared);

        trace!(%cache_key, range = %desc, cleared, "caching range descriptor");
        let evicted = store.insert(cache_key, desc);
        CacheStats::incr(&self.stats.inserts);
        CacheStats::add(&self.stats.capacity_evictions, evicted);
    }

    /// Remove every cached entry whose interval intersects `desc`.
    ///
    /// Cached intervals are disjoint, so the intersecting entries are
    /// contiguous around `cache_key`: scan upward from it, then downward
    /// below it, stopping at the first disjoint neighbor each way.
    fn clear_overlapping_locked(store: &mut S, cache_key: &Key, desc: &RangeDescriptor) -> usize {
        if desc.end_key.is_min() {
            return 0;
        }
        let mut removed = 0;

        while let Some((key, existing)) = store.peek_ceiling(cache_key) {
            if !existing.overlaps(desc) {
                break;
            }
            trace!(%key, range = %existing, "clearing overlapping descriptor");
            store.remove(&key);
            removed += 1;
        }

        let from = lower_scan_start(desc);
        for key in store.keys_in_range(&from, cache_key).into_iter().rev() {
            match store.peek(&key) {
                Some(existing) if existing.overlaps(desc) => {
                    trace!(%key, range = %existing, "clearing overlapping descriptor");
                    store.remove(&key);
                    removed += 1;
                }
                _ => break,
            }
        }
        removed
    }
}
