//! Descriptor provider: the backing store's range lookup API

use async_trait::async_trait;
use rangecache_common::{Key, RangeDescriptor, Result};
use std::sync::Arc;

/// Options forwarded with a lookup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupOptions {
    /// Look for the range that ends at the key (containment `start < key <= end`)
    /// instead of the range that contains it. Providers prefetch the preceding
    /// ranges rather than the following ones.
    pub use_reverse_scan: bool,
}

impl LookupOptions {
    /// Options for a reverse-scan lookup
    #[must_use]
    pub const fn reverse() -> Self {
        Self {
            use_reverse_scan: true,
        }
    }
}

/// Source of authoritative range descriptors.
///
/// Errors returned here are handed back to the cache's caller unchanged;
/// the cache performs no retries.
#[async_trait]
pub trait DescriptorProvider: Send + Sync {
    /// Scan the meta records starting at `meta_key` and return the
    /// descriptor covering it followed by up to a small batch of neighbors.
    ///
    /// `meta_desc` is the descriptor of the meta range holding `meta_key`.
    async fn range_lookup(
        &self,
        meta_key: &Key,
        options: LookupOptions,
        meta_desc: &RangeDescriptor,
    ) -> Result<Vec<RangeDescriptor>>;

    /// Descriptor of the first range, which holds the meta1 records
    async fn first_range(&self) -> Result<RangeDescriptor>;
}

#[async_trait]
impl<T: DescriptorProvider + ?Sized> DescriptorProvider for Arc<T> {
    async fn range_lookup(
        &self,
        meta_key: &Key,
        options: LookupOptions,
        meta_desc: &RangeDescriptor,
    ) -> Result<Vec<RangeDescriptor>> {
        (**self).range_lookup(meta_key, options, meta_desc).await
    }

    async fn first_range(&self) -> Result<RangeDescriptor> {
        (**self).first_range().await
    }
}
