//! Preload cache (part of C2, spec.md §4.2).
//!
//! Holds speculatively-warmed file bytes, evicted by access frequency rather than
//! recency: every `get()` bumps the entry's `access_count`, and when the cache is over
//! budget the least-accessed entry goes first (oldest `mtime` breaks ties), so a file
//! read once and never again is evicted ahead of one re-read on every pass even if the
//! latter was cached earlier. Entries are validated against the file's current
//! `mtime` on read, matching the teacher-adjacent `AsyncIoOptimizer`'s
//! cache-then-stat pattern.

use std::collections::HashMap;
use std::time::SystemTime;

use bytes::Bytes;

use crate::types::FilePath;

#[derive(Debug, Clone)]
pub struct PreloadEntry {
    pub bytes: Bytes,
    pub mtime: SystemTime,
    pub access_count: u64,
}

pub struct PreloadCache {
    entries: HashMap<FilePath, PreloadEntry>,
    max_entries: u64,
    max_bytes: u64,
    current_bytes: u64,
}

impl PreloadCache {
    pub fn new(max_entries: u64, max_bytes: u64) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries,
            max_bytes,
            current_bytes: 0,
        }
    }

    pub fn insert(&mut self, path: FilePath, bytes: Bytes, mtime: SystemTime) {
        let weight = bytes.len() as u64;
        if weight > self.max_bytes {
            // A single oversized file simply can't be preloaded; that's not an
            // engine error, it just means this path always falls through to a live
            // read.
            return;
        }

        self.remove_internal(&path);
        self.current_bytes += weight;
        self.entries.insert(
            path,
            PreloadEntry {
                bytes,
                mtime,
                access_count: 0,
            },
        );
        self.evict_until_within_bounds();
    }

    /// Returns the cached bytes only if `current_mtime` matches what was cached,
    /// bumping `access_count` on a hit; otherwise evicts the stale entry and reports
    /// a miss.
    pub fn get(&mut self, path: &FilePath, current_mtime: SystemTime) -> Option<Bytes> {
        let stale = match self.entries.get(path) {
            Some(entry) => entry.mtime != current_mtime,
            None => return None,
        };
        if stale {
            self.remove_internal(path);
            return None;
        }

        let entry = self.entries.get_mut(path).expect("checked present above");
        entry.access_count += 1;
        Some(entry.bytes.clone())
    }

    fn evict_until_within_bounds(&mut self) {
        while self.entries.len() as u64 > self.max_entries || self.current_bytes > self.max_bytes {
            let victim = self
                .entries
                .iter()
                .min_by(|(_, a), (_, b)| a.access_count.cmp(&b.access_count).then_with(|| a.mtime.cmp(&b.mtime)))
                .map(|(path, _)| path.clone());
            match victim {
                Some(path) => self.remove_internal(&path),
                None => break,
            }
        }
    }

    fn remove_internal(&mut self, path: &FilePath) {
        if let Some(entry) = self.entries.remove(path) {
            self.current_bytes -= entry.bytes.len() as u64;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.current_bytes = 0;
    }

    pub fn clear_one(&mut self, path: &FilePath) {
        self.remove_internal(path);
    }

    pub fn contains(&self, path: &FilePath) -> bool {
        self.entries.contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_when_mtime_matches() {
        let mut cache = PreloadCache::new(10, 1024);
        let path = FilePath::new("/a.ts");
        let mtime = SystemTime::now();
        cache.insert(path.clone(), Bytes::from_static(b"x"), mtime);
        assert_eq!(cache.get(&path, mtime), Some(Bytes::from_static(b"x")));
    }

    #[test]
    fn miss_and_evicts_when_mtime_differs() {
        let mut cache = PreloadCache::new(10, 1024);
        let path = FilePath::new("/a.ts");
        let original = SystemTime::now();
        cache.insert(path.clone(), Bytes::from_static(b"x"), original);
        let later = original + std::time::Duration::from_secs(1);
        assert_eq!(cache.get(&path, later), None);
        assert!(!cache.contains(&path));
    }

    #[test]
    fn get_increments_access_count() {
        let mut cache = PreloadCache::new(10, 1024);
        let path = FilePath::new("/a.ts");
        let mtime = SystemTime::now();
        cache.insert(path.clone(), Bytes::from_static(b"x"), mtime);
        cache.get(&path, mtime);
        cache.get(&path, mtime);
        assert_eq!(cache.entries.get(&path).unwrap().access_count, 2);
    }

    #[test]
    fn eviction_prefers_least_accessed_entry_over_most_recently_inserted() {
        let mut cache = PreloadCache::new(2, 1024);
        let hot = FilePath::new("/hot.ts");
        let cold = FilePath::new("/cold.ts");
        let mtime = SystemTime::now();

        cache.insert(hot.clone(), Bytes::from_static(b"h"), mtime);
        cache.insert(cold.clone(), Bytes::from_static(b"c"), mtime);
        // `hot` is read repeatedly; `cold` is never read again.
        cache.get(&hot, mtime);
        cache.get(&hot, mtime);
        cache.get(&hot, mtime);

        // `newcomer` never gets read either (access_count ties with `cold` at 0),
        // but its later mtime breaks the tie in its favor.
        let newcomer = FilePath::new("/new.ts");
        let later = mtime + std::time::Duration::from_secs(1);
        cache.insert(newcomer.clone(), Bytes::from_static(b"n"), later);

        assert!(cache.contains(&hot));
        assert!(!cache.contains(&cold));
        assert!(cache.contains(&newcomer));
    }
}
