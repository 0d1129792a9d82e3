use std::sync::{
    RwLock,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;

use crate::domain::collections::SystemCollectionMap;

use super::{
    CacheError, FreshnessCache,
    lock::{rw_read, rw_write},
};

const SOURCE: &str = "cache::memory";

/// Process-local freshness cache.
#[derive(Debug, Default)]
pub struct MemoryFreshnessCache {
    map: RwLock<Option<SystemCollectionMap>>,
    writes: AtomicUsize,
}

impl MemoryFreshnessCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache that already reports fresh with `map`.
    pub fn with_map(map: SystemCollectionMap) -> Self {
        Self {
            map: RwLock::new(Some(map)),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn snapshot(&self) -> Option<SystemCollectionMap> {
        rw_read(&self.map, SOURCE, "snapshot").clone()
    }

    /// Number of successful `write` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl FreshnessCache for MemoryFreshnessCache {
    async fn is_fresh(&self) -> Result<bool, CacheError> {
        Ok(rw_read(&self.map, SOURCE, "is_fresh").is_some())
    }

    async fn invalidate(&self) -> Result<(), CacheError> {
        *rw_write(&self.map, SOURCE, "invalidate") = None;
        Ok(())
    }

    async fn write(&self, map: &SystemCollectionMap) -> Result<(), CacheError> {
        *rw_write(&self.map, SOURCE, "write") = Some(map.clone());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn read(&self) -> Result<SystemCollectionMap, CacheError> {
        rw_read(&self.map, SOURCE, "read")
            .clone()
            .ok_or(CacheError::Missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::collections::CollectionId;

    #[tokio::test]
    async fn starts_stale_and_becomes_fresh_after_write() {
        let cache = MemoryFreshnessCache::new();
        assert!(!cache.is_fresh().await.expect("is_fresh"));
        assert!(matches!(cache.read().await, Err(CacheError::Missing)));

        let mut map = SystemCollectionMap::new();
        map.insert("root", CollectionId::new_v4());
        cache.write(&map).await.expect("write");

        assert!(cache.is_fresh().await.expect("is_fresh"));
        assert_eq!(cache.read().await.expect("read"), map);
        assert_eq!(cache.write_count(), 1);
    }

    #[tokio::test]
    async fn invalidate_drops_the_map() {
        let cache = MemoryFreshnessCache::with_map(SystemCollectionMap::new());
        assert!(cache.is_fresh().await.expect("is_fresh"));

        cache.invalidate().await.expect("invalidate");
        assert!(!cache.is_fresh().await.expect("is_fresh"));
        assert!(cache.snapshot().is_none());
    }
}
