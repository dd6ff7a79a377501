//! Bounded LRU Cache (C1, spec.md §4.1).
//!
//! A mapping from `K` to `V` bounded jointly by entry count and total byte weight,
//! evicting least-recently-*accessed* entries first. Grounded on the teacher's own
//! tiered cache family (`codegraph-ir::features::cache`) but realized as a plain,
//! synchronous structure rather than `moka`'s async ARC cache: spec.md §4.1 calls for
//! caller-controlled weights, an explicit `onEvict` hook and both insertion- and
//! access-order iteration, none of which `moka` exposes directly.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::IceError;

struct Entry<V> {
    value: V,
    weight: u64,
    insertion_ordinal: u64,
    last_access_ordinal: u64,
}

/// Callback invoked once per evicted entry, in eviction order.
pub type EvictHook<K, V> = Box<dyn Fn(&K, &V) + Send + Sync>;

pub struct BoundedCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    by_insertion: BTreeMap<u64, K>,
    by_access: BTreeMap<u64, K>,
    current_bytes: u64,
    max_entries: u64,
    max_bytes: u64,
    next_ordinal: AtomicU64,
    on_evict: Option<EvictHook<K, V>>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Clone + Eq + Hash,
{
    pub fn new(max_entries: u64, max_bytes: u64) -> Self {
        Self {
            entries: HashMap::new(),
            by_insertion: BTreeMap::new(),
            by_access: BTreeMap::new(),
            current_bytes: 0,
            max_entries,
            max_bytes,
            next_ordinal: AtomicU64::new(0),
            on_evict: None,
        }
    }

    pub fn with_evict_hook(mut self, hook: EvictHook<K, V>) -> Self {
        self.on_evict = Some(hook);
        self
    }

    fn next(&self) -> u64 {
        self.next_ordinal.fetch_add(1, Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current_bytes(&self) -> u64 {
        self.current_bytes
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Read without touching recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|e| &e.value)
    }

    /// Read, bumping the entry to most-recently-accessed.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let ordinal = self.next();
        let entry = self.entries.get_mut(key)?;
        self.by_access.remove(&entry.last_access_ordinal);
        entry.last_access_ordinal = ordinal;
        self.by_access.insert(ordinal, key.clone());
        Some(&self.entries.get(key).unwrap().value)
    }

    /// Insert or update `key`. Returns `CapacityExceeded` if `weight` alone exceeds
    /// `max_bytes` (the insert is rejected, nothing is evicted in that case).
    pub fn insert(&mut self, key: K, value: V, weight: u64) -> Result<(), IceError> {
        if weight > self.max_bytes {
            return Err(IceError::CapacityExceeded {
                key_weight: weight,
                max_bytes: self.max_bytes,
            });
        }

        if let Some(old) = self.entries.remove(&key) {
            self.current_bytes -= old.weight;
            self.by_insertion.remove(&old.insertion_ordinal);
            self.by_access.remove(&old.last_access_ordinal);
        }

        let insertion_ordinal = self.next();
        let last_access_ordinal = self.next();
        self.entries.insert(
            key.clone(),
            Entry {
                value,
                weight,
                insertion_ordinal,
                last_access_ordinal,
            },
        );
        self.by_insertion.insert(insertion_ordinal, key.clone());
        self.by_access.insert(last_access_ordinal, key);
        self.current_bytes += weight;

        self.evict_until_within_bounds();
        Ok(())
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let entry = self.entries.remove(key)?;
        self.by_insertion.remove(&entry.insertion_ordinal);
        self.by_access.remove(&entry.last_access_ordinal);
        self.current_bytes -= entry.weight;
        Some(entry.value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_insertion.clear();
        self.by_access.clear();
        self.current_bytes = 0;
    }

    pub fn iterate_by_insertion_order(&self) -> impl Iterator<Item = (&K, &V)> {
        self.by_insertion
            .values()
            .map(move |k| (k, &self.entries.get(k).unwrap().value))
    }

    pub fn iterate_by_access_order(&self) -> impl Iterator<Item = (&K, &V)> {
        self.by_access
            .values()
            .map(move |k| (k, &self.entries.get(k).unwrap().value))
    }

    fn evict_until_within_bounds(&mut self) {
        while self.entries.len() as u64 > self.max_entries || self.current_bytes > self.max_bytes
        {
            let Some((&ordinal, _)) = self.by_access.iter().next() else {
                break;
            };
            let key = self.by_access.remove(&ordinal).unwrap();
            if let Some(entry) = self.entries.remove(&key) {
                self.current_bytes -= entry.weight;
                self.by_insertion.remove(&entry.insertion_ordinal);
                if let Some(hook) = &self.on_evict {
                    hook(&key, &entry.value);
                }
                tracing::debug!(?ordinal, "evicted cache entry");
            }
        }
    }
}
