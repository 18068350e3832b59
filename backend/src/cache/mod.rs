//! Result cache - memoizes pipeline runs by content.
//!
//! Keyed on (dataset fingerprint, pipeline content hash), never on session
//! identity, so two sessions working on the same file with the same
//! operations share one computation. Bounded by entry count and total byte
//! size with least-recently-used eviction; eviction only ever costs a
//! recomputation, never correctness.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::error::PipelineResult;
use crate::models::DerivedDataset;

/// Cache key: pure content identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub dataset: String,
    pub pipeline: String,
}

impl CacheKey {
    pub fn new(dataset: impl Into<String>, pipeline: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            pipeline: pipeline.into(),
        }
    }
}

/// Cache bounds. Derived tables can be as large as the raw dataset, so both
/// an entry count and a byte budget apply.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 64,
            max_bytes: 256 * 1024 * 1024,
        }
    }
}

/// Hit/miss/eviction counters, for the health endpoint and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Inner {
    entries: HashMap<CacheKey, Arc<DerivedDataset>>,
    /// Recency order, least recent at the front.
    order: VecDeque<CacheKey>,
    bytes: usize,
    stats: CacheStats,
}

/// Shared, mutex-guarded result cache.
///
/// The only intentionally shared resource between sessions. Computation runs
/// outside the lock; on a race to populate the same key the last writer wins,
/// which is acceptable because pipeline runs are pure - the redundant run is
/// a cost, not a correctness bug.
pub struct ResultCache {
    config: CacheConfig,
    inner: Mutex<Inner>,
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                bytes: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    /// Look up a key, marking it most recently used on a hit.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<DerivedDataset>> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let hit = inner.entries.get(key).cloned();
        match hit {
            Some(value) => {
                inner.stats.hits += 1;
                touch(&mut inner.order, key);
                Some(value)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Insert a value, evicting least-recently-used entries past the bounds.
    pub fn insert(&self, key: CacheKey, value: Arc<DerivedDataset>) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");

        if let Some(old) = inner.entries.insert(key.clone(), value.clone()) {
            inner.bytes -= old.approximate_bytes();
        }
        inner.bytes += value.approximate_bytes();
        touch(&mut inner.order, &key);

        // Evict from the cold end, but never the entry just inserted.
        while inner.entries.len() > 1
            && (inner.entries.len() > self.config.max_entries || inner.bytes > self.config.max_bytes)
        {
            let Some(victim) = inner.order.pop_front() else {
                break;
            };
            if let Some(evicted) = inner.entries.remove(&victim) {
                inner.bytes -= evicted.approximate_bytes();
                inner.stats.evictions += 1;
            }
        }
    }

    /// Return the cached result for `key`, or run `compute` and store it.
    ///
    /// At most one computation per distinct key per process lifetime, absent
    /// eviction. Errors are returned to the caller and never cached, so a
    /// failing pipeline is re-attempted only when its inputs change.
    pub fn get_or_compute<F>(&self, key: CacheKey, compute: F) -> PipelineResult<Arc<DerivedDataset>>
    where
        F: FnOnce() -> PipelineResult<DerivedDataset>,
    {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }

        let value = Arc::new(compute()?);
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().expect("cache lock poisoned").stats
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

fn touch(order: &mut VecDeque<CacheKey>, key: &CacheKey) {
    order.retain(|k| k != key);
    order.push_back(key.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Column, ColumnType, Schema, Table, Value};

    fn derived(rows: usize) -> DerivedDataset {
        let table = Table::new(
            Schema::new(vec![Column::new("v", ColumnType::Numeric, false)]),
            (0..rows).map(|i| vec![Value::Number(i as f64)]).collect(),
        );
        DerivedDataset::new(table)
    }

    #[test]
    fn test_compute_at_most_once_per_key() {
        let cache = ResultCache::default();
        let key = CacheKey::new("fp", "ph");

        let mut calls = 0;
        for _ in 0..5 {
            let result = cache
                .get_or_compute(key.clone(), || {
                    calls += 1;
                    Ok(derived(3))
                })
                .unwrap();
            assert_eq!(result.row_count(), 3);
        }
        assert_eq!(calls, 1);
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().hits, 4);
    }

    #[test]
    fn test_distinct_keys_computed_separately() {
        let cache = ResultCache::default();

        cache
            .get_or_compute(CacheKey::new("fp", "a"), || Ok(derived(1)))
            .unwrap();
        cache
            .get_or_compute(CacheKey::new("fp", "b"), || Ok(derived(2)))
            .unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = ResultCache::default();
        let key = CacheKey::new("fp", "ph");

        let failing = cache.get_or_compute(key.clone(), || {
            Err(crate::error::PipelineError {
                index: 0,
                cause: crate::error::ApplyError::from(crate::error::OpError::UnknownColumn(
                    "x".into(),
                )),
            })
        });
        assert!(failing.is_err());
        assert!(cache.is_empty());

        // A later successful run for the same key is stored.
        cache.get_or_compute(key, || Ok(derived(1))).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lru_eviction_by_entry_count() {
        let cache = ResultCache::new(CacheConfig {
            max_entries: 2,
            max_bytes: usize::MAX,
        });

        cache.insert(CacheKey::new("fp", "a"), Arc::new(derived(1)));
        cache.insert(CacheKey::new("fp", "b"), Arc::new(derived(1)));

        // Touch "a" so "b" becomes the cold entry.
        assert!(cache.get(&CacheKey::new("fp", "a")).is_some());

        cache.insert(CacheKey::new("fp", "c"), Arc::new(derived(1)));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&CacheKey::new("fp", "b")).is_none());
        assert!(cache.get(&CacheKey::new("fp", "a")).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_byte_budget_eviction() {
        let one_entry_bytes = derived(10).approximate_bytes();
        let cache = ResultCache::new(CacheConfig {
            max_entries: usize::MAX,
            max_bytes: one_entry_bytes + 1,
        });

        cache.insert(CacheKey::new("fp", "a"), Arc::new(derived(10)));
        cache.insert(CacheKey::new("fp", "b"), Arc::new(derived(10)));

        // Both together exceed the budget; the older one is gone.
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&CacheKey::new("fp", "b")).is_some());
    }

    #[test]
    fn test_shared_across_threads() {
        let cache = Arc::new(ResultCache::default());
        let key = CacheKey::new("fp", "ph");

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                let key = key.clone();
                std::thread::spawn(move || {
                    cache.get_or_compute(key, || Ok(derived(2))).unwrap().row_count()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 2);
        }
        assert_eq!(cache.len(), 1);
    }
}
