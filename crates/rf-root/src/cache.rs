//! LRU cache of decompressed basket payloads.
//!
//! Baskets never change once written, so a payload is identified by the file
//! seek of its key. Capacity is bounded by total payload bytes, and recency
//! is tracked with a monotonic tick: each access moves the entry to a fresh
//! tick, and eviction pops the smallest tick.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

/// Configuration for the basket cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum total bytes of decompressed payloads kept in memory (default 256 MiB).
    pub max_bytes: usize,
    /// When `false`, lookups always miss and nothing is stored.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_bytes: 256 * 1024 * 1024, enabled: true }
    }
}

impl CacheConfig {
    /// A configuration that caches nothing.
    pub fn disabled() -> Self {
        Self { max_bytes: 0, enabled: false }
    }
}

struct Slot {
    data: Arc<[u8]>,
    tick: u64,
}

#[derive(Default)]
struct Lru {
    slots: HashMap<u64, Slot>,
    order: BTreeMap<u64, u64>,
    clock: u64,
    bytes: usize,
    max_bytes: usize,
    hits: u64,
    misses: u64,
}

impl Lru {
    fn touch(&mut self, seek: u64) -> Option<Arc<[u8]>> {
        self.clock += 1;
        let clock = self.clock;
        let slot = self.slots.get_mut(&seek)?;
        self.order.remove(&slot.tick);
        slot.tick = clock;
        self.order.insert(clock, seek);
        Some(Arc::clone(&slot.data))
    }

    fn remove(&mut self, seek: u64) {
        if let Some(slot) = self.slots.remove(&seek) {
            self.order.remove(&slot.tick);
            self.bytes -= slot.data.len();
        }
    }

    fn store(&mut self, seek: u64, data: Arc<[u8]>) {
        if data.len() > self.max_bytes {
            return;
        }
        self.remove(seek);
        while self.bytes + data.len() > self.max_bytes {
            let Some((_, oldest)) = self.order.pop_first() else { break };
            if let Some(slot) = self.slots.remove(&oldest) {
                self.bytes -= slot.data.len();
            }
        }
        self.clock += 1;
        self.bytes += data.len();
        self.order.insert(self.clock, seek);
        self.slots.insert(seek, Slot { data, tick: self.clock });
    }
}

/// Thread-safe LRU cache for decompressed basket payloads, one per open file.
pub struct BasketCache {
    lru: Mutex<Lru>,
    enabled: bool,
}

impl BasketCache {
    /// Create a cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        let lru = Lru { max_bytes: config.max_bytes, ..Lru::default() };
        Self { lru: Mutex::new(lru), enabled: config.enabled }
    }

    fn lock(&self) -> MutexGuard<'_, Lru> {
        self.lru.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up the payload of the basket stored at `seek`.
    pub fn get(&self, seek: u64) -> Option<Arc<[u8]>> {
        if !self.enabled {
            return None;
        }
        let mut lru = self.lock();
        let found = lru.touch(seek);
        if found.is_some() {
            lru.hits += 1;
        } else {
            lru.misses += 1;
        }
        found
    }

    /// Store a payload; returns it shared, whether or not it fit in the cache.
    pub fn insert(&self, seek: u64, data: Vec<u8>) -> Arc<[u8]> {
        let data: Arc<[u8]> = Arc::from(data);
        if self.enabled {
            self.lock().store(seek, Arc::clone(&data));
        }
        data
    }

    /// Return the cached payload, or produce it with `load` and cache it.
    pub fn get_or_insert<F, E>(&self, seek: u64, load: F) -> std::result::Result<Arc<[u8]>, E>
    where
        F: FnOnce() -> std::result::Result<Vec<u8>, E>,
    {
        match self.get(seek) {
            Some(hit) => Ok(hit),
            None => Ok(self.insert(seek, load()?)),
        }
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        let lru = self.lock();
        CacheStats {
            entries: lru.slots.len(),
            current_bytes: lru.bytes,
            max_bytes: lru.max_bytes,
            hits: lru.hits,
            misses: lru.misses,
        }
    }

    /// Drop every cached payload (counters are kept).
    pub fn clear(&self) {
        let mut lru = self.lock();
        lru.slots.clear();
        lru.order.clear();
        lru.bytes = 0;
    }
}

impl Default for BasketCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

/// Snapshot of cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached baskets.
    pub entries: usize,
    /// Bytes currently held.
    pub current_bytes: usize,
    /// Configured byte limit.
    pub max_bytes: usize,
    /// Lookups that found a payload.
    pub hits: u64,
    /// Lookups that did not.
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, in `[0, 1]`.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}
