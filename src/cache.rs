//! Bounded local disk cache of materialized files.
//!
//! Wraps an unbounded [`lru::LruCache`] (count-based eviction doesn't fit a
//! byte-capacity cache) with manual size accounting: eviction is driven by a
//! running total compared against a configured capacity, not by entry count.

use lru::LruCache;
use std::path::{Path, PathBuf};

pub struct DiskLru {
    entries: LruCache<String, u64>,
    total_bytes: u64,
    capacity_bytes: u64,
    cache_root: PathBuf,
}

impl DiskLru {
    pub fn new(capacity_bytes: u64, cache_root: PathBuf) -> Self {
        DiskLru {
            entries: LruCache::unbounded(),
            total_bytes: 0,
            capacity_bytes,
            cache_root,
        }
    }

    /// Records an access, moving `key` to most-recently-used, and returns
    /// its stored size if present.
    pub fn get(&mut self, key: &str) -> Option<u64> {
        self.entries.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Inserts or updates `key`'s size, then evicts least-recently-used
    /// entries (deleting their files under the cache root) while the
    /// running total exceeds capacity and more than one entry remains.
    pub fn put(&mut self, key: &str, size: u64) {
        if let Some(previous) = self.entries.put(key.to_string(), size) {
            self.total_bytes = self.total_bytes.saturating_sub(previous);
        }
        self.total_bytes += size;
        self.evict_over_capacity();
    }

    /// Removes `key` without touching the filesystem; the caller is
    /// responsible for any file deletion (e.g. user-initiated `unlink`).
    pub fn remove(&mut self, key: &str) -> Option<u64> {
        let removed = self.entries.pop(key);
        if let Some(size) = removed {
            self.total_bytes = self.total_bytes.saturating_sub(size);
        }
        removed
    }

    fn evict_over_capacity(&mut self) {
        while self.total_bytes > self.capacity_bytes && self.entries.len() > 1 {
            let Some((key, size)) = self.entries.pop_lru() else {
                break;
            };
            self.total_bytes = self.total_bytes.saturating_sub(size);
            let path = self.cache_root.join(&key);
            if let Err(err) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), %err, "failed to delete evicted cache file");
            }
        }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.cache_root.join(key)
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_file(dir: &Path, name: &str, bytes: usize) {
        fs::write(dir.join(name), vec![0u8; bytes]).unwrap();
    }

    #[test]
    fn put_and_get_round_trips_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut lru = DiskLru::new(1_000, dir.path().to_path_buf());
        write_file(dir.path(), "a", 10);
        lru.put("a", 10);
        assert_eq!(lru.get("a"), Some(10));
        assert_eq!(lru.total_bytes(), 10);
    }

    #[test]
    fn eviction_deletes_least_recently_used_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut lru = DiskLru::new(150, dir.path().to_path_buf());
        write_file(dir.path(), "a", 100);
        write_file(dir.path(), "b", 100);
        lru.put("a", 100);
        lru.put("b", 100);
        // "a" was least recently used and pushes the total over capacity.
        assert!(!dir.path().join("a").exists());
        assert!(dir.path().join("b").exists());
        assert_eq!(lru.total_bytes(), 100);
        assert_eq!(lru.get("a"), None);
    }

    #[test]
    fn single_oversized_entry_is_retained() {
        let dir = tempfile::tempdir().unwrap();
        let mut lru = DiskLru::new(10, dir.path().to_path_buf());
        write_file(dir.path(), "huge", 1_000);
        lru.put("huge", 1_000);
        assert!(dir.path().join("huge").exists());
        assert_eq!(lru.total_bytes(), 1_000);
    }

    #[test]
    fn get_refreshes_recency_over_put_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut lru = DiskLru::new(250, dir.path().to_path_buf());
        write_file(dir.path(), "a", 100);
        write_file(dir.path(), "b", 100);
        lru.put("a", 100);
        lru.put("b", 100);
        // Touching "a" makes "b" the least-recently-used entry.
        lru.get("a");
        write_file(dir.path(), "c", 100);
        lru.put("c", 100);
        assert!(dir.path().join("a").exists());
        assert!(dir.path().join("c").exists());
        assert!(!dir.path().join("b").exists());
    }

    #[test]
    fn remove_does_not_delete_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut lru = DiskLru::new(1_000, dir.path().to_path_buf());
        write_file(dir.path(), "a", 10);
        lru.put("a", 10);
        lru.remove("a");
        assert!(dir.path().join("a").exists());
        assert_eq!(lru.total_bytes(), 0);
    }
}
