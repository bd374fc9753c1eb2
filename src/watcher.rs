//! Watcher facade: registration, lifecycle, shutdown.
//!
//! A [`Watcher`] owns the stat cache, the event ring, and (while running)
//! two long-lived threads: the polling loop producing events and the
//! dispatcher consuming them. Watch registrations go through the security
//! validator and count against a configured quota; every rejection with
//! security implications lands in the audit trail.
//!
//! State machine: NEW -> RUNNING -> STOPPED, with STOPPED terminal.
//! `watch` is rejected after stop; `stop` is idempotent after success.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use ahash::AHashMap;

use crate::audit::{AuditConfig, AuditLogger};
use crate::dispatcher::{self, ChangeCallback, ChangeEvent};
use crate::error::{Result, WatchError};
use crate::event::MAX_EVENT_PATH_LEN;
use crate::poller::PollLoop;
use crate::ring::{EventRing, RingStats};
use crate::stat_cache::{CacheStats, FileStat, StatCache};
use crate::strategy::{self, OptimizationStrategy};
use crate::validation::{self, PathRejection};
use crate::version::BuildInfo;

/// Handler for transient I/O errors surfaced by the polling loop. Without
/// one, errors go to stderr.
pub type ErrorHandler = Arc<dyn Fn(&WatchError) + Send + Sync + 'static>;

/// One registered file.
pub(crate) struct WatchedFile {
    /// Absolute, validated path
    pub path: String,
    pub callback: ChangeCallback,
    /// Mutated only by the polling loop after registration
    pub last_stat: Mutex<FileStat>,
}

/// Shared read-optimized lookup of watched files.
pub(crate) type WatchSet = RwLock<AHashMap<String, Arc<WatchedFile>>>;

/// Watcher configuration. Validated by
/// [`validate`](WatcherConfig::validate) and at [`Watcher::new`].
#[derive(Clone)]
pub struct WatcherConfig {
    /// Tick interval for the polling loop (floor 10 ms)
    pub poll_interval: Duration,
    /// Stat cache TTL; `None` defaults to half the poll interval, zero
    /// disables caching
    pub cache_ttl: Option<Duration>,
    /// Registration quota (hard ceiling 10 000)
    pub max_watched_files: usize,
    pub optimization_strategy: OptimizationStrategy,
    /// Ring slots; 0 picks a default from the strategy, otherwise a power
    /// of two >= 64
    pub event_ring_capacity: usize,
    /// Receives transient I/O errors; stderr when absent
    pub error_handler: Option<ErrorHandler>,
    /// Audit trail; disabled when absent
    pub audit: Option<AuditConfig>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        WatcherConfig {
            poll_interval: Duration::from_secs(5),
            cache_ttl: None,
            max_watched_files: 100,
            optimization_strategy: OptimizationStrategy::Auto,
            event_ring_capacity: 0,
            error_handler: None,
            audit: None,
        }
    }
}

impl std::fmt::Debug for WatcherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherConfig")
            .field("poll_interval", &self.poll_interval)
            .field("cache_ttl", &self.cache_ttl)
            .field("max_watched_files", &self.max_watched_files)
            .field("optimization_strategy", &self.optimization_strategy)
            .field("event_ring_capacity", &self.event_ring_capacity)
            .field("error_handler", &self.error_handler.is_some())
            .field("audit", &self.audit)
            .finish()
    }
}

const STATE_NEW: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPED: u8 = 2;

struct WatcherShared {
    poll_interval: Duration,
    max_watched_files: usize,
    cache: Arc<StatCache>,
    ring: Arc<EventRing>,
    audit: AuditLogger,
    watched: Arc<WatchSet>,
    error_handler: Option<ErrorHandler>,
    state: AtomicU8,
    poll_stop: Mutex<Option<mpsc::Sender<()>>>,
    poller: Mutex<Option<JoinHandle<()>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

/// Configuration-file watcher.
pub struct Watcher {
    shared: Arc<WatcherShared>,
}

impl Watcher {
    /// Validate the configuration and construct an idle watcher.
    ///
    /// Audit-logger construction failure is not fatal: the watcher falls
    /// back to a disabled audit trail and keeps going.
    pub fn new(config: WatcherConfig) -> Result<Self> {
        let report = config.validate();
        for warning in &report.warnings {
            tracing::warn!(code = warning.code, "{}", warning.message);
        }
        report.into_result()?;

        let ttl = config
            .cache_ttl
            .unwrap_or(config.poll_interval / 2);
        let capacity = if config.event_ring_capacity == 0 {
            strategy::default_ring_capacity(config.optimization_strategy)
        } else {
            config.event_ring_capacity
        };
        let ring = Arc::new(EventRing::with_capacity(
            capacity,
            config.optimization_strategy,
        )?);

        let audit = match &config.audit {
            None => AuditLogger::disabled(),
            Some(audit_config) => AuditLogger::new(audit_config).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "audit logger unavailable, auditing disabled");
                AuditLogger::disabled()
            }),
        };
        // Stamp the session so the audit file identifies its producer.
        audit.log_session_start(&BuildInfo::current());

        Ok(Watcher {
            shared: Arc::new(WatcherShared {
                poll_interval: config.poll_interval,
                max_watched_files: config.max_watched_files,
                cache: Arc::new(StatCache::new(ttl)),
                ring,
                audit,
                watched: Arc::new(RwLock::new(AHashMap::new())),
                error_handler: config.error_handler,
                state: AtomicU8::new(STATE_NEW),
                poll_stop: Mutex::new(None),
                poller: Mutex::new(None),
                dispatcher: Mutex::new(None),
            }),
        })
    }

    /// Register a file and its change callback.
    ///
    /// The path runs through the security validator, is resolved to
    /// absolute form, and is seeded with an initial stat: a file that does
    /// not exist yet registers as `exists = false` and produces a CREATE
    /// event once it appears. No synthetic CREATE is emitted for files that
    /// already exist at registration.
    pub fn watch(
        &self,
        path: &str,
        callback: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> Result<()> {
        let shared = &self.shared;
        if shared.state.load(Ordering::SeqCst) == STATE_STOPPED {
            return Err(WatchError::WatcherStopped);
        }

        let resolved = match validation::validate_and_resolve(path) {
            Ok(resolved) => resolved,
            Err(err) => {
                if let WatchError::UnsafePath { rejection, .. } = &err {
                    let mut context = BTreeMap::new();
                    context.insert("path".to_string(), path.to_string());
                    context.insert("reason".to_string(), rejection.to_string());
                    shared.audit.log_security_event(
                        rejection_event_name(rejection),
                        "watch registration rejected",
                        &context,
                    );
                }
                return Err(err);
            }
        };

        if resolved.len() > MAX_EVENT_PATH_LEN {
            return Err(WatchError::InvalidConfig {
                code: crate::error_codes::ARGUS_INVALID_CONFIG,
                message: format!(
                    "resolved path exceeds the {}-byte event buffer",
                    MAX_EVENT_PATH_LEN
                ),
            });
        }

        let watched_count = {
            let mut watched = shared.watched.write().unwrap();
            if !watched.contains_key(&resolved) && watched.len() >= shared.max_watched_files {
                let mut context = BTreeMap::new();
                context.insert("path".to_string(), resolved.clone());
                context.insert(
                    "limit".to_string(),
                    shared.max_watched_files.to_string(),
                );
                shared.audit.log_security_event(
                    "watch_limit_exceeded",
                    "watched-file limit exceeded",
                    &context,
                );
                return Err(WatchError::LimitExceeded {
                    limit: shared.max_watched_files,
                });
            }

            let seed = shared.cache.get_stat(&resolved)?;
            watched.insert(
                resolved.clone(),
                Arc::new(WatchedFile {
                    path: resolved.clone(),
                    callback: Arc::new(callback),
                    last_stat: Mutex::new(seed),
                }),
            );
            watched.len()
        };

        shared.ring.adapt_strategy(watched_count);
        shared.audit.log_file_watch("watch_started", &resolved);
        Ok(())
    }

    /// Remove a registration. The cache entry is evicted and the strategy
    /// re-adapted.
    pub fn unwatch(&self, path: &str) -> Result<()> {
        let resolved = validation::validate_and_resolve(path)?;

        let watched_count = {
            let mut watched = self.shared.watched.write().unwrap();
            if watched.remove(&resolved).is_none() {
                return Err(WatchError::FileNotFound { path: resolved });
            }
            watched.len()
        };

        self.shared.cache.evict(&resolved);
        self.shared.ring.adapt_strategy(watched_count);
        self.shared.audit.log_file_watch("watch_stopped", &resolved);
        Ok(())
    }

    /// Start the polling loop and dispatcher. Single-shot.
    pub fn start(&self) -> Result<()> {
        let shared = &self.shared;
        if let Err(current) = shared.state.compare_exchange(
            STATE_NEW,
            STATE_RUNNING,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            return Err(match current {
                STATE_RUNNING => WatchError::WatcherBusy,
                _ => WatchError::WatcherStopped,
            });
        }

        let (stop_tx, stop_rx) = mpsc::channel();
        *shared.poll_stop.lock().unwrap() = Some(stop_tx);

        let poll = PollLoop {
            ring: Arc::clone(&shared.ring),
            cache: Arc::clone(&shared.cache),
            watched: Arc::clone(&shared.watched),
            error_handler: shared.error_handler.clone(),
            interval: shared.poll_interval,
            stop_rx,
        };
        let poller_handle = std::thread::Builder::new()
            .name("argus-poll".to_string())
            .spawn(move || poll.run())
            .map_err(|e| WatchError::invalid_config(format!("cannot spawn poller: {}", e)))?;
        *shared.poller.lock().unwrap() = Some(poller_handle);

        let ring = Arc::clone(&shared.ring);
        let watched = Arc::clone(&shared.watched);
        let audit = shared.audit.clone();
        let dispatcher_handle = std::thread::Builder::new()
            .name("argus-dispatch".to_string())
            .spawn(move || dispatcher::run_dispatcher(ring, watched, audit))
            .map_err(|e| WatchError::invalid_config(format!("cannot spawn dispatcher: {}", e)))?;
        *shared.dispatcher.lock().unwrap() = Some(dispatcher_handle);

        Ok(())
    }

    /// Stop the watcher: cancel the polling loop, drain the ring through
    /// the dispatcher, stop the dispatcher, close the audit trail.
    ///
    /// Blocks until the drain completes, which includes any user callback
    /// currently running; use [`graceful_shutdown`](Self::graceful_shutdown)
    /// for a bounded wait. Idempotent after success.
    pub fn stop(&self) -> Result<()> {
        self.shared.stop_internal(true)
    }

    /// [`stop`](Self::stop) raced against a deadline. On timeout, returns
    /// [`WatchError::WatcherBusy`] while the cleanup keeps running on a
    /// background thread.
    pub fn graceful_shutdown(&self, timeout: Duration) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        let (done_tx, done_rx) = mpsc::channel();
        let spawned = std::thread::Builder::new()
            .name("argus-shutdown".to_string())
            .spawn(move || {
                let result = shared.stop_internal(true);
                let _ = done_tx.send(result);
            });
        if spawned.is_err() {
            // Could not offload; fall back to a direct (unbounded) stop
            return self.shared.stop_internal(true);
        }
        match done_rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(_) => Err(WatchError::WatcherBusy),
        }
    }

    /// Number of registered files.
    pub fn watched_files(&self) -> usize {
        self.shared.watched.read().unwrap().len()
    }

    /// Event ring counters.
    pub fn stats(&self) -> RingStats {
        self.shared.ring.stats()
    }

    /// Stat cache observability.
    pub fn cache_stats(&self) -> CacheStats {
        self.shared.cache.stats()
    }

    /// Drop every cached stat. The next poll re-stats everything.
    pub fn clear_cache(&self) {
        self.shared.cache.clear();
    }

    /// Currently effective (resolved) batching strategy.
    pub fn effective_strategy(&self) -> OptimizationStrategy {
        self.shared.ring.effective_strategy()
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.load(Ordering::SeqCst) == STATE_RUNNING
    }
}

impl WatcherShared {
    fn stop_internal(&self, drain: bool) -> Result<()> {
        let previous = self.state.swap(STATE_STOPPED, Ordering::SeqCst);
        if previous == STATE_STOPPED {
            return Ok(());
        }
        if previous == STATE_NEW {
            // Nothing was running; just release the audit sink.
            self.audit.close();
            return Ok(());
        }

        // Stop the producer side first.
        if let Some(stop_tx) = self.poll_stop.lock().unwrap().take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.poller.lock().unwrap().take() {
            let _ = handle.join();
        }

        // With producers gone, let the dispatcher drain what was accepted.
        if drain {
            while self.ring.occupancy() > 0 {
                std::thread::sleep(Duration::from_millis(1));
            }
        }

        self.ring.stop();
        if let Some(handle) = self.dispatcher.lock().unwrap().take() {
            let _ = handle.join();
        }

        self.audit.close();
        Ok(())
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        // Best-effort teardown without the drain wait; an explicit stop() or
        // graceful_shutdown() before drop gives the drain guarantee.
        let _ = self.shared.stop_internal(false);
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.shared.state.load(Ordering::SeqCst) {
            STATE_NEW => "new",
            STATE_RUNNING => "running",
            _ => "stopped",
        };
        f.debug_struct("Watcher")
            .field("state", &state)
            .field("watched_files", &self.watched_files())
            .finish()
    }
}

/// Audit event name for a path rejection.
fn rejection_event_name(rejection: &PathRejection) -> &'static str {
    match rejection {
        PathRejection::Traversal | PathRejection::EncodedTraversal => "path_traversal_attempt",
        PathRejection::SensitivePath => "sensitive_path_blocked",
        PathRejection::DeviceName => "reserved_device_blocked",
        PathRejection::AlternateDataStream => "alternate_data_stream_blocked",
        PathRejection::SymlinkEscape => "symlink_escape_blocked",
        _ => "invalid_path_blocked",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> WatcherConfig {
        WatcherConfig {
            poll_interval: Duration::from_millis(25),
            cache_ttl: Some(Duration::ZERO),
            ..WatcherConfig::default()
        }
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = WatcherConfig {
            poll_interval: Duration::from_millis(1),
            ..WatcherConfig::default()
        };
        let err = Watcher::new(config).unwrap_err();
        assert_eq!(
            err.code(),
            crate::error_codes::ARGUS_POLL_INTERVAL_TOO_SMALL
        );
    }

    #[test]
    fn test_watch_validates_and_counts() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("a.json");
        std::fs::write(&file, b"{}").unwrap();

        let watcher = Watcher::new(quick_config()).unwrap();
        watcher.watch(&file.to_string_lossy(), |_| {}).unwrap();
        assert_eq!(watcher.watched_files(), 1);

        // Re-watching the same path replaces, not duplicates.
        watcher.watch(&file.to_string_lossy(), |_| {}).unwrap();
        assert_eq!(watcher.watched_files(), 1);

        let err = watcher.watch("../../etc/passwd", |_| {}).unwrap_err();
        assert_eq!(err.code(), crate::error_codes::ARGUS_INVALID_CONFIG);
        assert_eq!(watcher.watched_files(), 1);
    }

    #[test]
    fn test_unwatch_unknown_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("a.json");
        let watcher = Watcher::new(quick_config()).unwrap();
        let err = watcher.unwatch(&file.to_string_lossy()).unwrap_err();
        assert_eq!(err.code(), crate::error_codes::ARGUS_FILE_NOT_FOUND);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let watcher = Watcher::new(quick_config()).unwrap();
        assert!(!watcher.is_running());

        watcher.start().unwrap();
        assert!(watcher.is_running());

        let err = watcher.start().unwrap_err();
        assert_eq!(err.code(), crate::error_codes::ARGUS_WATCHER_BUSY);

        watcher.stop().unwrap();
        assert!(!watcher.is_running());
        // Idempotent after success
        watcher.stop().unwrap();

        let err = watcher.start().unwrap_err();
        assert_eq!(err.code(), crate::error_codes::ARGUS_WATCHER_STOPPED);

        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("late.json");
        let err = watcher.watch(&file.to_string_lossy(), |_| {}).unwrap_err();
        assert_eq!(err.code(), crate::error_codes::ARGUS_WATCHER_STOPPED);
    }

    #[test]
    fn test_stop_before_start() {
        let watcher = Watcher::new(quick_config()).unwrap();
        watcher.stop().unwrap();
        assert!(!watcher.is_running());
    }

    #[test]
    fn test_strategy_adapts_with_watch_count() {
        let dir = tempfile::TempDir::new().unwrap();
        let watcher = Watcher::new(quick_config()).unwrap();
        assert_eq!(
            watcher.effective_strategy(),
            OptimizationStrategy::SingleEvent
        );

        for i in 0..5 {
            let file = dir.path().join(format!("f{}.json", i));
            std::fs::write(&file, b"{}").unwrap();
            watcher.watch(&file.to_string_lossy(), |_| {}).unwrap();
        }
        assert_eq!(
            watcher.effective_strategy(),
            OptimizationStrategy::SmallBatch
        );

        for i in 0..4 {
            let file = dir.path().join(format!("f{}.json", i));
            watcher.unwatch(&file.to_string_lossy()).unwrap();
        }
        assert_eq!(
            watcher.effective_strategy(),
            OptimizationStrategy::SingleEvent
        );
    }

    #[test]
    fn test_cache_stats_and_clear() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("a.json");
        std::fs::write(&file, b"{}").unwrap();

        let watcher = Watcher::new(quick_config()).unwrap();
        watcher.watch(&file.to_string_lossy(), |_| {}).unwrap();
        // Seeding with zero TTL performs a stat but skips cache storage
        // only on lookups; the entry itself is recorded.
        assert!(watcher.cache_stats().entries >= 1);

        watcher.clear_cache();
        assert_eq!(watcher.cache_stats().entries, 0);
    }
}
