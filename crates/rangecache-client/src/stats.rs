//! Range cache statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Cache statistics for monitoring
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: AtomicU64,
    /// Lookups that needed at least one provider call
    pub misses: AtomicU64,
    /// `range_lookup` calls issued to the provider
    pub provider_lookups: AtomicU64,
    /// `first_range` calls issued to the provider
    pub first_range_lookups: AtomicU64,
    /// Descriptors inserted
    pub inserts: AtomicU64,
    /// Entries removed because a newer descriptor overlapped them
    pub overlap_evictions: AtomicU64,
    /// Entries removed by explicit eviction
    pub evictions: AtomicU64,
    /// Entries removed to stay within the byte budget
    pub capacity_evictions: AtomicU64,
    /// Provider calls skipped because a concurrent lookup already fetched the range
    pub coalesced: AtomicU64,
}

impl CacheStats {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        if n > 0 {
            counter.fetch_add(n as u64, Ordering::Relaxed);
        }
    }

    /// Calculate hit ratio (0.0 to 1.0)
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            provider_lookups: self.provider_lookups.load(Ordering::Relaxed),
            first_range_lookups: self.first_range_lookups.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            overlap_evictions: self.overlap_evictions.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            capacity_evictions: self.capacity_evictions.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }

    /// Reset all statistics
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.provider_lookups,
            &self.first_range_lookups,
            &self.inserts,
            &self.overlap_evictions,
            &self.evictions,
            &self.capacity_evictions,
            &self.coalesced,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Plain copy of [`CacheStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub provider_lookups: u64,
    pub first_range_lookups: u64,
    pub inserts: u64,
    pub overlap_evictions: u64,
    pub evictions: u64,
    pub capacity_evictions: u64,
    pub coalesced: u64,
}
