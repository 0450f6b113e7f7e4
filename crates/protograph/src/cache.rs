//! Query result cache.
//!
//! Cycle detection, impact analysis and PII flow tracing walk the whole
//! reachable graph, so their results are memoized here until the next
//! mutation. The cache is never part of correctness: it is cleared
//! wholesale by every topology or payload change, and discarding it at any
//! point is always sound.
//!
//! # Keys
//!
//! Entries are keyed by [`CacheKey`], a structural key made of the
//! operation, the URN and the normalized option record. Two calls with the
//! same logical arguments always produce equal keys regardless of how the
//! options were assembled.
//!
//! # Eviction
//!
//! Entries are bounded by `capacity` and evicted least-recently-used first.
//! Recency is tracked with a queue of `(key, stamp)` pairs; touching an
//! entry pushes a fresh stamp and leaves the old pair behind as a ghost.
//! Ghosts are recognised by stamp mismatch and skipped during eviction, and
//! the queue is compacted once ghosts dominate it.

use crate::graph::Cycle;
use crate::impact::{DetailedImpact, ImpactOptions, ImpactReport, PiiFlowReport};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;

/// Ghost-to-live ratio that triggers queue compaction.
const COMPACTION_FACTOR: usize = 4;

/// A bounded map with least-recently-used eviction.
#[derive(Debug)]
pub struct LruCache<K, V> {
    capacity: usize,
    entries: HashMap<K, (V, u64)>,
    order: VecDeque<(K, u64)>,
    next_stamp: u64,
}

impl<K: Clone + Eq + Hash, V> LruCache<K, V> {
    /// Create an empty cache holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
            next_stamp: 0,
        }
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up an entry and mark it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let stamp = self.bump();
        let (_, entry_stamp) = self.entries.get_mut(key)?;
        *entry_stamp = stamp;
        self.order.push_back((key.clone(), stamp));
        self.compact_if_needed();
        self.entries.get(key).map(|(value, _)| value)
    }

    /// Insert an entry, returning how many entries were evicted to make room.
    pub fn insert(&mut self, key: K, value: V) -> usize {
        let stamp = self.bump();
        let mut evicted = 0;
        if !self.entries.contains_key(&key) {
            while self.entries.len() >= self.capacity {
                if !self.evict_oldest() {
                    break;
                }
                evicted += 1;
            }
        }
        self.entries.insert(key.clone(), (value, stamp));
        self.order.push_back((key, stamp));
        self.compact_if_needed();
        evicted
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn bump(&mut self) -> u64 {
        self.next_stamp += 1;
        self.next_stamp
    }

    fn evict_oldest(&mut self) -> bool {
        while let Some((key, stamp)) = self.order.pop_front() {
            let is_live = self
                .entries
                .get(&key)
                .is_some_and(|(_, current)| *current == stamp);
            if is_live {
                self.entries.remove(&key);
                return true;
            }
        }
        false
    }

    fn compact_if_needed(&mut self) {
        if self.order.len() <= self.capacity.saturating_mul(COMPACTION_FACTOR) {
            return;
        }
        let entries = &self.entries;
        self.order
            .retain(|(key, stamp)| entries.get(key).is_some_and(|(_, current)| current == stamp));
    }
}

/// Structural cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Cycle detection over the whole graph
    Cycles,
    /// Basic impact of one node
    Impact {
        /// Queried URN
        urn: String,
        /// Normalized query options
        options: ImpactOptions,
    },
    /// Per-edge-kind impact of one node
    DetailedImpact {
        /// Queried URN
        urn: String,
        /// Traversal depth bound
        max_depth: Option<usize>,
    },
    /// Personal data flow from one node
    PiiFlow {
        /// Queried URN
        urn: String,
        /// Traversal depth bound
        max_depth: Option<usize>,
    },
}

/// Memoized query result.
#[derive(Debug, Clone)]
pub enum CacheValue {
    /// Result of cycle detection
    Cycles(Arc<Vec<Cycle>>),
    /// Result of basic impact analysis
    Impact(Arc<ImpactReport>),
    /// Result of detailed impact analysis
    DetailedImpact(Arc<DetailedImpact>),
    /// Result of PII flow tracing
    PiiFlow(Arc<PiiFlowReport>),
}

/// Conversion between a query result type and its [`CacheValue`] variant.
pub(crate) trait Cached: Sized {
    fn wrap(value: Arc<Self>) -> CacheValue;
    fn unwrap(value: &CacheValue) -> Option<Arc<Self>>;
}

macro_rules! impl_cached {
    ($ty:ty, $variant:ident) => {
        impl Cached for $ty {
            fn wrap(value: Arc<Self>) -> CacheValue {
                CacheValue::$variant(value)
            }

            fn unwrap(value: &CacheValue) -> Option<Arc<Self>> {
                match value {
                    CacheValue::$variant(inner) => Some(Arc::clone(inner)),
                    _ => None,
                }
            }
        }
    };
}

impl_cached!(Vec<Cycle>, Cycles);
impl_cached!(ImpactReport, Impact);
impl_cached!(DetailedImpact, DetailedImpact);
impl_cached!(PiiFlowReport, PiiFlow);

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Live entries
    pub size: usize,
    /// Maximum entries
    pub capacity: usize,
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that required recomputation
    pub misses: u64,
    /// Entries dropped to respect capacity
    pub evictions: u64,
    /// Wholesale invalidations caused by mutations
    pub invalidations: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache, in `0.0..=1.0`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// LRU of query results plus hit/miss accounting.
#[derive(Debug)]
pub struct QueryCache {
    entries: LruCache<CacheKey, CacheValue>,
    hits: u64,
    misses: u64,
    evictions: u64,
    invalidations: u64,
}

impl QueryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            hits: 0,
            misses: 0,
            evictions: 0,
            invalidations: 0,
        }
    }

    /// Drop every entry. Called as the last step of each mutation.
    pub fn invalidate(&mut self) {
        if !self.entries.is_empty() {
            trace!(entries = self.entries.len(), "invalidating query cache");
        }
        self.entries.clear();
        self.invalidations += 1;
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            capacity: self.entries.capacity(),
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            invalidations: self.invalidations,
        }
    }

    fn lookup<T: Cached>(&mut self, key: &CacheKey) -> Option<Arc<T>> {
        let found = self.entries.get(key).and_then(T::unwrap);
        if found.is_some() {
            self.hits += 1;
            trace!(?key, "cache hit");
        } else {
            self.misses += 1;
            trace!(?key, "cache miss");
        }
        found
    }

    fn store<T: Cached>(&mut self, key: CacheKey, value: Arc<T>) {
        let evicted = self.entries.insert(key, T::wrap(value));
        self.evictions += evicted as u64;
    }
}

/// Return the cached value for `key`, computing and storing it on a miss.
///
/// The lock is released while `compute` runs so computations may consult
/// the cache for their own sub-queries.
pub(crate) fn get_or_compute<T: Cached>(
    cache: &Mutex<QueryCache>,
    key: CacheKey,
    compute: impl FnOnce() -> T,
) -> Arc<T> {
    if let Some(hit) = lock(cache).lookup::<T>(&key) {
        return hit;
    }
    let value = Arc::new(compute());
    lock(cache).store(key, Arc::clone(&value));
    value
}

/// Lock the cache, recovering from poisoning since every entry is
/// disposable.
pub(crate) fn lock(cache: &Mutex<QueryCache>) -> std::sync::MutexGuard<'_, QueryCache> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}
