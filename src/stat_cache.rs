//! Lock-free file-stat cache.
//!
//! One immutable snapshot map is current at any instant, referenced through
//! an atomically swappable pointer. Readers load the snapshot without taking
//! any lock; writers build a replacement map and install it with a
//! compare-and-swap loop, retrying if another writer won the race. Expired
//! entries are not evicted by age: they are simply overwritten on the next
//! miss. Eviction happens only on `unwatch` and `clear`.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use ahash::AHashMap;
use arc_swap::ArcSwap;

use crate::error::{Result, WatchError};

/// Immutable per-path stat record. Replaced whole on every refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Wall-clock modification time; Unix epoch when the file is absent
    pub mod_time: SystemTime,
    /// Size in bytes; zero when the file is absent
    pub size: i64,
    /// Whether the path existed at stat time
    pub exists: bool,
    /// Monotonic capture instant, drives TTL freshness
    pub cached_at: Instant,
}

impl FileStat {
    /// Modification time as nanoseconds since the Unix epoch, clamped to
    /// zero for pre-epoch or absent files.
    pub fn mod_time_nanos(&self) -> i64 {
        self.mod_time
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0)
    }

    fn absent() -> Self {
        FileStat {
            mod_time: SystemTime::UNIX_EPOCH,
            size: 0,
            exists: false,
            cached_at: Instant::now(),
        }
    }
}

/// Aggregate cache observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached entries
    pub entries: usize,
    /// Age of the stalest entry
    pub oldest_age: Duration,
    /// Age of the freshest entry
    pub newest_age: Duration,
}

type Snapshot = AHashMap<String, FileStat>;

/// Copy-on-write stat cache with lock-free readers.
pub struct StatCache {
    snapshot: ArcSwap<Snapshot>,
    ttl: Duration,
}

impl StatCache {
    /// Create an empty cache. A zero TTL disables the fast path entirely
    /// (every `get_stat` performs a real stat).
    pub fn new(ttl: Duration) -> Self {
        StatCache {
            snapshot: ArcSwap::from_pointee(Snapshot::new()),
            ttl,
        }
    }

    /// Fetch the stat for `path`, from cache when fresh.
    ///
    /// A fresh entry (age within the TTL) is returned without a syscall.
    /// Otherwise the file is stat'd and the snapshot replaced copy-on-write.
    /// Non-existence is data, not an error: it comes back as
    /// `exists = false`. Any other I/O failure is surfaced to the caller
    /// without touching the cache.
    pub fn get_stat(&self, path: &str) -> Result<FileStat> {
        if !self.ttl.is_zero() {
            let snapshot = self.snapshot.load();
            if let Some(entry) = snapshot.get(path) {
                if entry.cached_at.elapsed() <= self.ttl {
                    return Ok(*entry);
                }
            }
        }

        let fresh = stat_path(path)?;
        self.insert(path, fresh);
        Ok(fresh)
    }

    /// Install an entry via the copy-on-write protocol: load the current
    /// snapshot, clone it with the entry replaced, and compare-and-swap the
    /// pointer, restarting on contention.
    fn insert(&self, path: &str, stat: FileStat) {
        self.snapshot.rcu(|current| {
            let mut next = (**current).clone();
            next.insert(path.to_string(), stat);
            next
        });
    }

    /// Drop the entry for `path`, if any. Called on unwatch.
    pub fn evict(&self, path: &str) {
        self.snapshot.rcu(|current| {
            let mut next = (**current).clone();
            next.remove(path);
            next
        });
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.snapshot.store(Arc::new(Snapshot::new()));
    }

    /// Entry count and age spread of the current snapshot.
    pub fn stats(&self) -> CacheStats {
        let snapshot = self.snapshot.load();
        let mut oldest = Duration::ZERO;
        let mut newest = Duration::MAX;
        for entry in snapshot.values() {
            let age = entry.cached_at.elapsed();
            if age > oldest {
                oldest = age;
            }
            if age < newest {
                newest = age;
            }
        }
        if snapshot.is_empty() {
            newest = Duration::ZERO;
        }
        CacheStats {
            entries: snapshot.len(),
            oldest_age: oldest,
            newest_age: newest,
        }
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }
}

/// Perform the actual stat syscall.
fn stat_path(path: &str) -> Result<FileStat> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(FileStat {
            mod_time: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            size: meta.len() as i64,
            exists: true,
            cached_at: Instant::now(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileStat::absent()),
        Err(e) => Err(WatchError::Io {
            path: path.to_string(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_missing_file_is_data_not_error() {
        let cache = StatCache::new(Duration::from_secs(1));
        let stat = cache.get_stat("/definitely/not/a/real/path.json").unwrap();
        assert!(!stat.exists);
        assert_eq!(stat.size, 0);
    }

    #[test]
    fn test_fresh_entry_skips_syscall() {
        let temp = tempfile::TempDir::new().unwrap();
        let file = temp.path().join("app.json");
        std::fs::write(&file, b"{\"a\":1}").unwrap();
        let path = file.to_string_lossy().to_string();

        let cache = StatCache::new(Duration::from_secs(60));
        let first = cache.get_stat(&path).unwrap();

        // Mutate the file; a fresh cache hit must not see it.
        std::fs::write(&file, b"{\"a\":2,\"b\":3}").unwrap();
        let second = cache.get_stat(&path).unwrap();

        assert_eq!(first.cached_at, second.cached_at, "hit must reuse the entry");
        assert_eq!(first.size, second.size);
    }

    #[test]
    fn test_zero_ttl_always_refreshes() {
        let temp = tempfile::TempDir::new().unwrap();
        let file = temp.path().join("app.json");
        std::fs::write(&file, b"one").unwrap();
        let path = file.to_string_lossy().to_string();

        let cache = StatCache::new(Duration::ZERO);
        let first = cache.get_stat(&path).unwrap();
        std::fs::write(&file, b"longer contents").unwrap();
        let second = cache.get_stat(&path).unwrap();

        assert_ne!(first.size, second.size);
    }

    #[test]
    fn test_expired_entry_is_overwritten_in_place() {
        let temp = tempfile::TempDir::new().unwrap();
        let file = temp.path().join("app.json");
        std::fs::write(&file, b"one").unwrap();
        let path = file.to_string_lossy().to_string();

        let cache = StatCache::new(Duration::from_millis(20));
        cache.get_stat(&path).unwrap();
        assert_eq!(cache.len(), 1);

        thread::sleep(Duration::from_millis(40));
        std::fs::write(&file, b"longer contents").unwrap();
        let refreshed = cache.get_stat(&path).unwrap();

        assert_eq!(refreshed.size, 15);
        assert_eq!(cache.len(), 1, "refresh replaces, never duplicates");
    }

    #[test]
    fn test_evict_and_clear() {
        let cache = StatCache::new(Duration::from_secs(1));
        cache.get_stat("/no/such/a").unwrap();
        cache.get_stat("/no/such/b").unwrap();
        assert_eq!(cache.len(), 2);

        cache.evict("/no/such/a");
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut paths = Vec::new();
        for i in 0..8 {
            let file = temp.path().join(format!("f{}.json", i));
            std::fs::write(&file, b"{}").unwrap();
            paths.push(file.to_string_lossy().to_string());
        }

        let cache = Arc::new(StatCache::new(Duration::ZERO));
        let mut handles = Vec::new();
        for t in 0..4 {
            let cache = Arc::clone(&cache);
            let paths = paths.clone();
            handles.push(thread::spawn(move || {
                for i in 0..200 {
                    let path = &paths[(t + i) % paths.len()];
                    let stat = cache.get_stat(path).unwrap();
                    assert!(stat.exists);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), paths.len());
    }

    #[test]
    fn test_stats_age_ordering() {
        let cache = StatCache::new(Duration::from_secs(5));
        cache.get_stat("/no/such/older").unwrap();
        thread::sleep(Duration::from_millis(15));
        cache.get_stat("/no/such/newer").unwrap();

        let stats = cache.stats();
        assert_eq!(stats.entries, 2);
        assert!(stats.oldest_age >= stats.newest_age);
    }
}
