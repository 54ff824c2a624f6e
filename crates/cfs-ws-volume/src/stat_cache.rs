//! 5-second TTL stat cache keyed on the path the caller asked about.
//! Caches both hits (`Some(FileInfo)`) and misses (`None`, i.e. a prior
//! `NotFound`), since repeated negative stats are the common case for
//! existence probes.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use cfs_volume_core::FileInfo;
use parking_lot::Mutex;

pub const STAT_CACHE_TTL: Duration = Duration::from_secs(5);

struct Entry {
    value: Option<FileInfo>,
    at: Instant,
}

pub struct StatCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl StatCache {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    /// Returns a cached value for `path`, rewriting `FileInfo::path` back
    /// to `path` on a hit (the cache key the caller used, not whatever the
    /// entry's own path field happened to be when it was stored).
    pub fn get(&self, path: &str) -> Option<Option<FileInfo>> {
        let entries = self.entries.lock();
        let entry = entries.get(path)?;
        if entry.at.elapsed() > STAT_CACHE_TTL {
            return None;
        }
        Some(entry.value.clone().map(|mut info| {
            info.path = path.to_string();
            info
        }))
    }

    pub fn put(&self, path: impl Into<String>, value: Option<FileInfo>) {
        self.entries.lock().insert(path.into(), Entry { value, at: Instant::now() });
    }

    pub fn invalidate(&self, path: &str) {
        self.entries.lock().remove(path);
    }
}

impl Default for StatCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_entries_are_cached_too() {
        let cache = StatCache::new();
        cache.put("missing", None);
        assert_eq!(cache.get("missing"), Some(None));
    }

    #[test]
    fn hit_is_rewritten_to_the_lookup_key() {
        let cache = StatCache::new();
        cache.put("alias", Some(FileInfo::new_file("real/path", 3)));
        let hit = cache.get("alias").unwrap().unwrap();
        assert_eq!(hit.path, "alias");
    }
}
