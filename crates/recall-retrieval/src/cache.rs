//! Read-through LRU cache for ranked search results.
//!
//! Entries are keyed by `(query, mode, k)`, bounded in count and expire
//! after a fixed TTL. Hits return independent clones. Each `clear` starts a
//! new generation so results computed against an older corpus are never
//! stored after an invalidation.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::CacheConfig;
use crate::fusion::{RankedResult, SearchMode};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    query: String,
    mode: SearchMode,
    k: usize,
}

#[derive(Debug, Clone)]
struct CachedResults {
    results: Vec<RankedResult>,
    cached_at: Instant,
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that found nothing fresh.
    pub misses: u64,
    /// Entries dropped because their TTL had passed.
    pub expired: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Thread-safe search result cache.
pub struct ResultCache {
    entries: Mutex<LruCache<CacheKey, CachedResults>>,
    stats: Mutex<CacheStats>,
    generation: AtomicU64,
    ttl: Duration,
}

impl ResultCache {
    /// Create a cache holding up to `capacity` queries for `ttl`.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            stats: Mutex::new(CacheStats::default()),
            generation: AtomicU64::new(0),
            ttl,
        }
    }

    /// Build from configuration; `None` when caching is disabled.
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.capacity, Duration::from_secs(config.ttl_secs)))
    }

    /// Fetch fresh results for a query, if cached.
    pub fn get(&self, query: &str, mode: SearchMode, k: usize) -> Option<Vec<RankedResult>> {
        let key = cache_key(query, mode, k);
        let mut entries = self.entries.lock();
        let mut stats = self.stats.lock();

        let lookup = entries
            .get(&key)
            .map(|entry| (entry.cached_at.elapsed() <= self.ttl).then(|| entry.results.clone()));

        let fresh = match lookup {
            Some(Some(results)) => Some(results),
            Some(None) => {
                entries.pop(&key);
                stats.expired += 1;
                None
            }
            None => None,
        };

        if fresh.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        fresh
    }

    /// Store results for a query, evicting the least recently used entry
    /// when full.
    pub fn put(&self, query: &str, mode: SearchMode, k: usize, results: Vec<RankedResult>) {
        let mut entries = self.entries.lock();
        entries.put(cache_key(query, mode, k), fresh_entry(results));
    }

    /// The current generation. Capture it before reading the corpus and
    /// pass it to [`ResultCache::put_if_current`].
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Store results only if no `clear` happened since `generation` was
    /// captured. Returns whether the entry was stored.
    pub fn put_if_current(
        &self,
        query: &str,
        mode: SearchMode,
        k: usize,
        generation: u64,
        results: Vec<RankedResult>,
    ) -> bool {
        let mut entries = self.entries.lock();
        if self.generation.load(Ordering::Acquire) != generation {
            return false;
        }
        entries.put(cache_key(query, mode, k), fresh_entry(results));
        true
    }

    /// Drop every entry and start a new generation. Called after the
    /// corpus changes.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.clear();
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Number of entries currently held, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        *self.stats.lock()
    }
}

fn cache_key(query: &str, mode: SearchMode, k: usize) -> CacheKey {
    CacheKey {
        query: query.to_string(),
        mode,
        k,
    }
}

fn fresh_entry(results: Vec<RankedResult>) -> CachedResults {
    CachedResults {
        results,
        cached_at: Instant::now(),
    }
}
