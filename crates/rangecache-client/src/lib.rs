//! RangeCache Client - Range descriptor resolution
//!
//! This crate provides the client-side range descriptor cache:
//! - Lookup through the two meta levels with cache short-circuiting
//! - Overlap clearing when split or merged ranges are learned
//! - Compare-and-evict of stale descriptors
//! - Optional coalescing of concurrent lookups per meta key
//! - An in-memory descriptor database for tests and tooling

pub mod cache;
mod inflight;
pub mod memory;
pub mod ordered;
pub mod provider;
pub mod stats;

// Re-exports
pub use cache::{DescriptorStore, MAX_META_DEPTH, RangeDescriptorCache};
pub use memory::{DEFAULT_LOOKUP_BATCH_SIZE, InMemoryDescriptorDb};
pub use ordered::{LruOrderedCache, OrderedStore, Weigh};
pub use provider::{DescriptorProvider, LookupOptions};
pub use stats::{CacheStats, StatsSnapshot};
