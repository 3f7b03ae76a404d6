//! Per-meta-key lookup coalescing
//!
//! Concurrent misses that resolve through the same meta key queue behind one
//! async lock. The holder performs the provider round trip; the others wake
//! up afterwards, re-check the cache and usually find their answer there.

use parking_lot::Mutex;
use rangecache_common::Key;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub(crate) struct InflightLookups {
    table: Mutex<HashMap<Key, Arc<AsyncMutex<()>>>>,
}

impl InflightLookups {
    /// Wait until no other lookup for `meta_key` is in flight
    pub(crate) async fn acquire(&self, meta_key: &Key) -> InflightGuard<'_> {
        let lock = {
            let mut table = self.table.lock();
            Arc::clone(table.entry(meta_key.clone()).or_default())
        };
        let guard = Arc::clone(&lock).lock_owned().await;
        InflightGuard {
            owner: self,
            key: meta_key.clone(),
            lock,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.table.lock().len()
    }
}

pub(crate) struct InflightGuard<'a> {
    owner: &'a InflightLookups,
    key: Key,
    lock: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut table = self.owner.table.lock();
        // Only the table and this guard still reference the lock: no waiters.
        if Arc::strong_count(&self.lock) == 2 {
            table.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_entry_removed_after_last_holder() {
        let inflight = InflightLookups::default();
        {
            let _guard = inflight.acquire(&Key::from("m")).await;
            assert_eq!(inflight.len(), 1);
        }
        assert_eq!(inflight.len(), 0);
    }

    #[tokio::test]
    async fn test_second_acquirer_waits() {
        let inflight = Arc::new(InflightLookups::default());
        let first = inflight.acquire(&Key::from("m")).await;

        let waiter = {
            let inflight = Arc::clone(&inflight);
            tokio::spawn(async move {
                let _guard = inflight.acquire(&Key::from("m")).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap();
        assert_eq!(inflight.len(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let inflight = InflightLookups::default();
        let _a = inflight.acquire(&Key::from("a")).await;
        let _b = inflight.acquire(&Key::from("b")).await;
        assert_eq!(inflight.len(), 2);
    }
}
