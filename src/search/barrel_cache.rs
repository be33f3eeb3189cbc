//! Bounded cache of loaded barrel files.
//!
//! Barrels are shared out as `Arc` so a bulk eviction cannot invalidate a
//! posting list a query is still walking. When the cache reaches capacity,
//! the least recently touched half is dropped in one sweep.

use std::collections::VecDeque;
use std::sync::Arc;

use ahash::AHashMap;

use crate::index::BarrelMap;

/// LRU-style cache keyed by barrel id.
#[derive(Debug)]
pub struct BarrelCache {
    capacity: usize,
    entries: AHashMap<usize, Arc<BarrelMap>>,
    order: VecDeque<usize>,
}

impl BarrelCache {
    pub fn new(capacity: usize) -> Self {
        BarrelCache {
            capacity: capacity.max(1),
            entries: AHashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Fetch a barrel, loading it on a miss. A hit refreshes recency.
    pub fn get_or_load<F>(&mut self, barrel_id: usize, load: F) -> Arc<BarrelMap>
    where
        F: FnOnce() -> BarrelMap,
    {
        if let Some(barrel) = self.entries.get(&barrel_id) {
            let barrel = Arc::clone(barrel);
            self.touch(barrel_id);
            return barrel;
        }

        if self.entries.len() >= self.capacity {
            self.evict_oldest_half();
        }

        let barrel = Arc::new(load());
        self.entries.insert(barrel_id, Arc::clone(&barrel));
        self.order.push_back(barrel_id);
        barrel
    }

    /// Drop every cached barrel (after a delta merge rewrites them on disk).
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touch(&mut self, barrel_id: usize) {
        if let Some(pos) = self.order.iter().position(|&id| id == barrel_id) {
            self.order.remove(pos);
            self.order.push_back(barrel_id);
        }
    }

    fn evict_oldest_half(&mut self) {
        let keep = self.capacity / 2;
        while self.entries.len() > keep {
            match self.order.pop_front() {
                Some(old) => {
                    self.entries.remove(&old);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn barrel() -> BarrelMap {
        BarrelMap::new()
    }

    #[test]
    fn test_hit_does_not_reload() {
        let mut cache = BarrelCache::new(4);
        let mut loads = 0;
        cache.get_or_load(1, || {
            loads += 1;
            barrel()
        });
        cache.get_or_load(1, || {
            loads += 1;
            barrel()
        });
        assert_eq!(loads, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_bulk_eviction_bounds_size() {
        let mut cache = BarrelCache::new(4);
        for id in 0..10 {
            cache.get_or_load(id, barrel);
            assert!(cache.len() <= 4);
        }
    }

    #[test]
    fn test_recent_entries_survive_eviction() {
        let mut cache = BarrelCache::new(4);
        for id in 0..4 {
            cache.get_or_load(id, barrel);
        }
        // touch 0 so it is the most recent, then overflow
        cache.get_or_load(0, barrel);
        cache.get_or_load(9, barrel);

        let mut reloaded = false;
        cache.get_or_load(0, || {
            reloaded = true;
            barrel()
        });
        assert!(!reloaded, "most recently used barrel was evicted");
    }

    #[test]
    fn test_clear() {
        let mut cache = BarrelCache::new(4);
        cache.get_or_load(2, barrel);
        cache.clear();
        assert!(cache.is_empty());
    }
}
