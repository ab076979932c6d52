//! TTL-bounded stat cache.
//!
//! Emulator hosts stat aggressively while scanning content, and every
//! NFS stat is a full round trip. One second of staleness is harmless
//! for ROM libraries, so recent answers are replayed from memory.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use retrofs_common::{STAT_CACHE_CLEAR_THRESHOLD, STAT_CACHE_TTL};
use retrofs_transport::FileStat;

struct StatEntry {
    stat: FileStat,
    stored_at: Instant,
}

/// Short-TTL map from path to file metadata.
pub struct StatCache {
    entries: Mutex<HashMap<String, StatEntry>>,
    ttl: Duration,
}

impl Default for StatCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StatCache {
    /// Create a cache with the standard 1 second TTL.
    pub fn new() -> Self {
        Self::with_ttl(STAT_CACHE_TTL)
    }

    /// Create a cache with a custom TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Look up a fresh entry. Expired entries are dropped on the way.
    pub fn get(&self, path: &str) -> Option<FileStat> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(path) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.stat),
            Some(_) => {
                entries.remove(path);
                None
            }
            None => None,
        }
    }

    /// Store a stat result.
    ///
    /// The map is bulk-cleared once it outgrows the threshold; the
    /// workload's path set is small, so precision eviction buys nothing.
    pub fn put(&self, path: &str, stat: FileStat) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            path.to_string(),
            StatEntry {
                stat,
                stored_at: Instant::now(),
            },
        );
        if entries.len() > STAT_CACHE_CLEAR_THRESHOLD {
            entries.clear();
        }
    }

    /// Number of entries currently stored, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Check if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fresh_entries_are_served() {
        let cache = StatCache::new();
        cache.put("nfs://s/e/a.rom", FileStat::regular(42));
        assert_eq!(cache.get("nfs://s/e/a.rom").unwrap().size, 42);
        assert!(cache.get("nfs://s/e/other.rom").is_none());
    }

    #[test]
    fn entries_expire_after_the_ttl() {
        let cache = StatCache::with_ttl(Duration::from_millis(20));
        cache.put("path", FileStat::regular(1));
        assert!(cache.get("path").is_some());

        thread::sleep(Duration::from_millis(30));
        assert!(cache.get("path").is_none());
        // The expired entry was dropped, not just hidden.
        assert!(cache.is_empty());
    }

    #[test]
    fn oversized_cache_is_bulk_cleared() {
        let cache = StatCache::new();
        for i in 0..=STAT_CACHE_CLEAR_THRESHOLD {
            cache.put(&format!("path-{}", i), FileStat::regular(i as u64));
        }
        assert!(cache.len() <= STAT_CACHE_CLEAR_THRESHOLD);
    }

    #[test]
    fn put_refreshes_an_existing_entry() {
        let cache = StatCache::with_ttl(Duration::from_millis(50));
        cache.put("path", FileStat::regular(1));
        thread::sleep(Duration::from_millis(30));
        cache.put("path", FileStat::regular(2));
        thread::sleep(Duration::from_millis(30));

        // Still fresh: the second put restarted the clock.
        assert_eq!(cache.get("path").unwrap().size, 2);
    }
}
