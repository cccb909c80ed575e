//! In-process search result cache.
//!
//! Maps a normalized query string to a previously computed product list.
//! Entries expire after a fixed TTL and the cache holds at most a fixed
//! number of entries, evicting the oldest insertion first (strict FIFO, not
//! LRU - a read never refreshes an entry's position).

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::time::Instant;

use crate::model::Product;

const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_CAPACITY: usize = 50;

struct CacheEntry {
    results: Vec<Product>,
    // page size the list was computed for; a short list may simply be all
    // that exists for a small request, so len() alone cannot tell
    limit: u32,
    inserted_at: Instant,
}

/// Time- and size-bounded query cache. Process-lifetime only.
pub struct SearchCache {
    entries: HashMap<String, CacheEntry>,
    // insertion order, oldest first
    order: VecDeque<String>,
    ttl: Duration,
    capacity: usize,
}

impl SearchCache {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_TTL, DEFAULT_CAPACITY)
    }

    pub fn with_limits(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            ttl,
            capacity,
        }
    }

    fn normalize_key(query: &str) -> String {
        query.trim().to_lowercase()
    }

    /// Look up a cached result list for a request of up to `limit` items.
    /// An entry computed for a smaller page size reads as absent so that an
    /// early small request cannot pin larger ones to its page for the TTL
    /// window. An expired entry also reads as absent but is not evicted
    /// here; `cleanup` is the explicit sweep.
    pub fn get(&self, query: &str, limit: u32) -> Option<&[Product]> {
        let key = Self::normalize_key(query);
        let entry = self.entries.get(&key)?;
        if entry.inserted_at.elapsed() >= self.ttl || entry.limit < limit {
            return None;
        }
        Some(&entry.results)
    }

    pub fn set(&mut self, query: &str, limit: u32, results: Vec<Product>) {
        let key = Self::normalize_key(query);
        // re-inserting an existing key counts as a fresh insertion
        if self.entries.remove(&key).is_some() {
            self.order.retain(|k| k != &key);
        }
        self.entries.insert(
            key.clone(),
            CacheEntry {
                results,
                limit,
                inserted_at: Instant::now(),
            },
        );
        self.order.push_back(key);
        while self.entries.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            } else {
                break;
            }
        }
    }

    /// Drop every expired entry.
    pub fn cleanup(&mut self) {
        let ttl = self.ttl;
        self.entries.retain(|_, e| e.inserted_at.elapsed() < ttl);
        let live: std::collections::HashSet<&String> = self.entries.keys().collect();
        self.order = self
            .order
            .iter()
            .filter(|k| live.contains(k))
            .cloned()
            .collect();
    }

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
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Source;

    fn product(name: &str) -> Product {
        Product {
            id: None,
            name: name.to_string(),
            brand: None,
            barcode: None,
            calories_per_100g: 52.0,
            protein_per_100g: 0.3,
            fats_per_100g: 0.2,
            carbs_per_100g: 13.8,
            source: Source::OpenFoodFacts,
            source_id: Some("1".to_string()),
            image_url: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn get_normalizes_query() {
        let mut cache = SearchCache::new();
        cache.set("  Apple  ", 10, vec![product("apple")]);
        assert!(cache.get("apple", 10).is_some());
        assert!(cache.get("APPLE ", 10).is_some());
        assert!(cache.get("banana", 10).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_at_ttl() {
        let mut cache = SearchCache::new();
        cache.set("apple", 10, vec![product("apple")]);

        tokio::time::advance(Duration::from_secs(5 * 60 - 1)).await;
        assert!(cache.get("apple", 10).is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("apple", 10).is_none());
        // expired but not evicted until cleanup runs
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_sweeps_expired_entries() {
        let mut cache = SearchCache::new();
        cache.set("old", 10, vec![product("old")]);
        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        cache.set("fresh", 10, vec![product("fresh")]);
        tokio::time::advance(Duration::from_secs(90)).await;

        cache.cleanup();
        assert_eq!(cache.len(), 1);
        assert!(cache.get("fresh", 10).is_some());
        assert!(cache.get("old", 10).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn evicts_oldest_insertion_beyond_capacity() {
        let mut cache = SearchCache::new();
        for i in 0..60 {
            cache.set(&format!("query-{i}"), 10, vec![product(&format!("p{i}"))]);
        }
        assert_eq!(cache.len(), 50);
        for i in 0..10 {
            assert!(cache.get(&format!("query-{i}"), 10).is_none(), "query-{i}");
        }
        for i in 10..60 {
            assert!(cache.get(&format!("query-{i}"), 10).is_some(), "query-{i}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_is_fifo_not_lru() {
        let mut cache = SearchCache::with_limits(DEFAULT_TTL, 2);
        cache.set("a", 10, vec![product("a")]);
        cache.set("b", 10, vec![product("b")]);
        // reading "a" must not save it from eviction
        assert!(cache.get("a", 10).is_some());
        cache.set("c", 10, vec![product("c")]);
        assert!(cache.get("a", 10).is_none());
        assert!(cache.get("b", 10).is_some());
        assert!(cache.get("c", 10).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn reinserting_key_counts_as_fresh_insertion() {
        let mut cache = SearchCache::with_limits(DEFAULT_TTL, 2);
        cache.set("a", 10, vec![product("a")]);
        cache.set("b", 10, vec![product("b")]);
        cache.set("a", 10, vec![product("a2")]);
        cache.set("c", 10, vec![product("c")]);
        // "b" is now the oldest insertion
        assert!(cache.get("b", 10).is_none());
        assert!(cache.get("a", 10).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn entry_serves_smaller_but_not_larger_requests() {
        let mut cache = SearchCache::new();
        cache.set("apple", 2, vec![product("a1"), product("a2")]);
        assert!(cache.get("apple", 2).is_some());
        assert!(cache.get("apple", 1).is_some());
        assert!(cache.get("apple", 20).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_empties_cache() {
        let mut cache = SearchCache::new();
        cache.set("a", 10, vec![product("a")]);
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get("a", 10).is_none());
    }
}
