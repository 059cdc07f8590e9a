use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::num::NonZeroUsize;

use ccnsim_core::{ChunkId, Payload};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

/// Replacement order used by a content store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    /// Evict the earliest inserted entry; lookups do not reorder
    #[default]
    Fifo,
    /// Evict the least recently used entry; lookups and inserts promote
    Lru,
}

impl CacheKind {
    /// Build an empty cache of this kind
    pub fn build(self, capacity: usize) -> Box<dyn ReplacementCache> {
        match self {
            CacheKind::Fifo => Box::new(FifoCache::new(capacity)),
            CacheKind::Lru => Box::new(LruCache::new(capacity)),
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKind::Fifo => write!(f, "fifo"),
            CacheKind::Lru => write!(f, "lru"),
        }
    }
}

/// Cached chunk plus the bookkeeping replacement policies rely on
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Payload,
    /// Monotonic insertion sequence number, used to break ties
    pub inserted: u64,
    /// Number of lookups answered by this entry
    pub hits: u64,
}

/// Storage plus eviction order behind a [`ContentStore`].
///
/// Implementations keep their lookup index and their order structure in
/// lock-step: every stored id appears exactly once in each.
pub trait ReplacementCache: fmt::Debug + Send {
    fn kind(&self) -> CacheKind;

    fn capacity(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch a payload, applying the policy's access rule on a hit
    fn get(&mut self, id: ChunkId) -> Option<Payload>;

    /// Membership test that never touches the eviction order
    fn contains(&self, id: ChunkId) -> bool;

    /// Store a chunk, evicting one entry first when full. Returns the evicted id.
    fn put(&mut self, id: ChunkId, payload: Payload) -> Option<ChunkId>;

    /// Drop all entries and reset bookkeeping
    fn clear(&mut self);

    /// Stored ids, next victim first
    fn chunks(&self) -> Vec<ChunkId>;
}

/// FIFO replacement: new chunks enter at the back, the front is evicted
#[derive(Debug)]
pub struct FifoCache {
    capacity: usize,
    order: VecDeque<ChunkId>,
    entries: HashMap<ChunkId, CacheEntry>,
    next_seq: u64,
}

impl FifoCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            entries: HashMap::with_capacity(capacity),
            next_seq: 0,
        }
    }
}

impl ReplacementCache for FifoCache {
    fn kind(&self) -> CacheKind {
        CacheKind::Fifo
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&mut self, id: ChunkId) -> Option<Payload> {
        let entry = self.entries.get_mut(&id)?;
        entry.hits += 1;
        Some(entry.payload.clone())
    }

    fn contains(&self, id: ChunkId) -> bool {
        self.entries.contains_key(&id)
    }

    fn put(&mut self, id: ChunkId, payload: Payload) -> Option<ChunkId> {
        if self.capacity == 0 || self.entries.contains_key(&id) {
            return None;
        }

        let mut evicted = None;
        if self.entries.len() >= self.capacity {
            if let Some(victim) = self.order.pop_front() {
                self.entries.remove(&victim);
                evicted = Some(victim);
            }
        }

        self.order.push_back(id);
        self.entries.insert(
            id,
            CacheEntry {
                payload,
                inserted: self.next_seq,
                hits: 0,
            },
        );
        self.next_seq += 1;
        evicted
    }

    fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
        self.next_seq = 0;
    }

    fn chunks(&self) -> Vec<ChunkId> {
        self.order.iter().copied().collect()
    }
}

/// LRU replacement backed by [`lru::LruCache`].
///
/// Lookups and re-inserts promote, `contains` peeks without reordering.
#[derive(Debug)]
pub struct LruCache {
    capacity: usize,
    entries: lru::LruCache<ChunkId, CacheEntry>,
    next_seq: u64,
}

impl LruCache {
    pub fn new(capacity: usize) -> Self {
        // `put` refuses everything at capacity 0, so the inner bound goes unused
        let bound = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            capacity,
            entries: lru::LruCache::new(bound),
            next_seq: 0,
        }
    }
}

impl ReplacementCache for LruCache {
    fn kind(&self) -> CacheKind {
        CacheKind::Lru
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&mut self, id: ChunkId) -> Option<Payload> {
        let entry = self.entries.get_mut(&id)?;
        entry.hits += 1;
        Some(entry.payload.clone())
    }

    fn contains(&self, id: ChunkId) -> bool {
        self.entries.contains(&id)
    }

    fn put(&mut self, id: ChunkId, payload: Payload) -> Option<ChunkId> {
        if self.capacity == 0 {
            return None;
        }

        // Re-inserting counts as an access
        if self.entries.contains(&id) {
            self.entries.promote(&id);
            return None;
        }

        let entry = CacheEntry {
            payload,
            inserted: self.next_seq,
            hits: 0,
        };
        self.next_seq += 1;

        self.entries.push(id, entry).map(|(victim, _)| victim)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.next_seq = 0;
    }

    fn chunks(&self) -> Vec<ChunkId> {
        self.entries.iter().rev().map(|(id, _)| *id).collect()
    }
}

/// Hit/miss counters reset by the statistics collaborator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, 0 when nothing was looked up
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A node's content store: a bounded cache plus its counters.
///
/// The size never exceeds the capacity. Capacity 0 yields a store that is
/// always full and never keeps anything.
#[derive(Debug)]
pub struct ContentStore {
    cache: Box<dyn ReplacementCache>,
    stats: CacheStats,
}

impl ContentStore {
    pub fn new(kind: CacheKind, capacity: usize) -> Self {
        Self::with_cache(kind.build(capacity))
    }

    /// Wrap a custom replacement implementation
    pub fn with_cache(cache: Box<dyn ReplacementCache>) -> Self {
        Self {
            cache,
            stats: CacheStats::default(),
        }
    }

    /// Look a chunk up, counting a hit or a miss
    pub fn lookup(&mut self, id: ChunkId) -> Option<Payload> {
        match self.cache.get(id) {
            Some(payload) => {
                self.stats.hits += 1;
                trace!("Content store hit: {}", id);
                Some(payload)
            }
            None => {
                self.stats.misses += 1;
                trace!("Content store miss: {}", id);
                None
            }
        }
    }

    /// Insert a chunk and return the id evicted to make room, if any
    pub fn insert(&mut self, id: ChunkId, payload: Payload) -> Option<ChunkId> {
        let was_present = self.cache.contains(id);
        let evicted = self.cache.put(id, payload);

        if !was_present && self.cache.contains(id) {
            self.stats.insertions += 1;
        }
        if let Some(victim) = evicted {
            self.stats.evictions += 1;
            debug!("Evicted {} to store {} ({} policy)", victim, id, self.cache.kind());
        }

        debug_assert!(self.cache.len() <= self.cache.capacity());
        evicted
    }

    pub fn contains(&self, id: ChunkId) -> bool {
        self.cache.contains(id)
    }

    pub fn is_full(&self) -> bool {
        self.cache.len() >= self.cache.capacity()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.capacity()
    }

    pub fn kind(&self) -> CacheKind {
        self.cache.kind()
    }

    /// Stored ids, next victim first
    pub fn chunks(&self) -> Vec<ChunkId> {
        self.cache.chunks()
    }

    /// Empty the store and its replacement bookkeeping
    pub fn clear(&mut self) {
        self.cache.clear();
        debug!("Content store cleared");
    }

    /// Reset counters, keeping the cached contents
    pub fn clear_stat(&mut self) {
        self.stats = CacheStats::default();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn hit_rate(&self) -> f64 {
        self.stats.hit_rate()
    }
}
