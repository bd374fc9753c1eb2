//! Polling loop.
//!
//! Ticks at the configured interval, snapshots the watched set into a
//! reusable buffer, diffs each file's fresh stat against its last-known
//! stat, and publishes change events into the ring. A single file is
//! diffed inline; larger sets fan out across a bounded 8-thread pool and
//! join before the tick ends. Publishing never blocks: a full ring drops.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use crate::error::WatchError;
use crate::event::{FileChangeEvent, FLAG_CREATE, FLAG_DELETE, FLAG_MODIFY};
use crate::ring::EventRing;
use crate::stat_cache::StatCache;
use crate::watcher::{ErrorHandler, WatchSet, WatchedFile};

/// Upper bound on concurrent stat checks per tick.
pub(crate) const STAT_POOL_SIZE: usize = 8;

pub(crate) struct PollLoop {
    pub ring: Arc<EventRing>,
    pub cache: Arc<StatCache>,
    pub watched: Arc<WatchSet>,
    pub error_handler: Option<ErrorHandler>,
    pub interval: Duration,
    /// Cancellation: a send or a dropped sender ends the loop immediately
    pub stop_rx: Receiver<()>,
}

impl PollLoop {
    /// Run until cancelled. Blocks the calling thread; the only suspension
    /// points are the interval wait and the cancellation observation inside
    /// it.
    pub fn run(self) {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(STAT_POOL_SIZE)
            .thread_name(|i| format!("argus-stat-{}", i))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                tracing::error!(error = %e, "cannot build stat pool; polling disabled");
                return;
            }
        };

        // Snapshot buffer reused across ticks: cleared, never shrunk.
        let mut snapshot: Vec<Arc<WatchedFile>> = Vec::new();

        let ring = &self.ring;
        let cache = &self.cache;
        let error_handler = &self.error_handler;

        loop {
            match self.stop_rx.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => {}
                // Stop signal or facade dropped: exit without another pass
                _ => return,
            }

            snapshot.clear();
            {
                let watched = self.watched.read().unwrap();
                snapshot.extend(watched.values().cloned());
            }

            match snapshot.len() {
                0 => continue,
                1 => diff_file(&snapshot[0], cache, ring, error_handler),
                _ => {
                    // Short-lived tasks joined at the end of the tick; the
                    // pool bounds concurrency at STAT_POOL_SIZE.
                    pool.scope(|scope| {
                        for file in &snapshot {
                            scope.spawn(move |_| diff_file(file, cache, ring, error_handler));
                        }
                    });
                }
            }
        }
    }
}

/// Compare a file's fresh stat against its last-known stat and publish the
/// transition, if any.
fn diff_file(
    file: &WatchedFile,
    cache: &StatCache,
    ring: &EventRing,
    error_handler: &Option<ErrorHandler>,
) {
    let current = match cache.get_stat(&file.path) {
        Ok(stat) => stat,
        Err(err) => {
            // Transient I/O: report and keep last_stat untouched
            report_error(error_handler, err);
            return;
        }
    };

    let mut last = file.last_stat.lock().unwrap();
    if !current.exists {
        if last.exists {
            publish(ring, &file.path, FLAG_DELETE, 0, 0);
            *last = current;
        }
        return;
    }

    if !last.exists {
        publish(
            ring,
            &file.path,
            FLAG_CREATE,
            current.mod_time_nanos(),
            current.size,
        );
    } else if current.mod_time != last.mod_time || current.size != last.size {
        publish(
            ring,
            &file.path,
            FLAG_MODIFY,
            current.mod_time_nanos(),
            current.size,
        );
    }
    *last = current;
}

fn publish(ring: &EventRing, path: &str, flags: u8, mod_time_nanos: i64, size: i64) {
    match FileChangeEvent::new(path, flags, mod_time_nanos, size) {
        // Registration rejects overlong paths, so None cannot happen in
        // practice; guard anyway rather than truncate silently.
        None => tracing::warn!(path = %path, "path too long for event buffer; event skipped"),
        Some(event) => {
            // A full ring drops and counts; producers never block.
            let _ = ring.publish(event);
        }
    }
}

fn report_error(handler: &Option<ErrorHandler>, err: WatchError) {
    match handler {
        Some(handler) => handler(&err),
        None => eprintln!("argus watcher error: {}", err),
    }
}
