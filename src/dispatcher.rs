//! Event dispatch to user callbacks.
//!
//! The dispatcher is the ring's single consumer: it decodes each fixed-layout
//! event back into a user-facing [`ChangeEvent`], looks up the registered
//! callback for the path, and invokes it inside a panic boundary. A faulting
//! callback is recorded in the audit trail and never takes the dispatcher
//! down; subsequent events keep flowing.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::audit::AuditLogger;
use crate::event::FileChangeEvent;
use crate::ring::EventRing;
use crate::watcher::WatchSet;

/// User-facing change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Absolute path of the changed file
    pub path: String,
    /// Modification time; Unix epoch for deletions
    pub mod_time: SystemTime,
    /// Size in bytes; zero for deletions
    pub size: i64,
    pub is_create: bool,
    pub is_delete: bool,
    pub is_modify: bool,
}

impl ChangeEvent {
    /// Decode the ring's wire representation.
    pub(crate) fn decode(raw: &FileChangeEvent) -> Self {
        let mod_time = if raw.mod_time_nanos > 0 {
            SystemTime::UNIX_EPOCH + Duration::from_nanos(raw.mod_time_nanos as u64)
        } else {
            SystemTime::UNIX_EPOCH
        };
        ChangeEvent {
            path: raw.path().to_string(),
            mod_time,
            size: raw.size,
            is_create: raw.is_create(),
            is_delete: raw.is_delete(),
            is_modify: raw.is_modify(),
        }
    }
}

/// Callback registered per watched file.
pub type ChangeCallback = Arc<dyn Fn(&ChangeEvent) + Send + Sync + 'static>;

/// Consumer loop body. Blocks until the ring is stopped.
///
/// Runs on its own thread: the spin/backoff policy inside
/// [`EventRing::run_consumer`] must own the thread it is spinning on.
pub(crate) fn run_dispatcher(ring: Arc<EventRing>, watched: Arc<WatchSet>, audit: AuditLogger) {
    ring.run_consumer(|raw| {
        let event = ChangeEvent::decode(&raw);

        let entry = watched.read().unwrap().get(&event.path).cloned();
        let Some(entry) = entry else {
            // Unwatched between publish and dispatch; nothing to deliver.
            tracing::debug!(path = %event.path, "dropping event for unwatched path");
            return;
        };

        let callback = Arc::clone(&entry.callback);
        match catch_unwind(AssertUnwindSafe(|| callback(&event))) {
            Ok(()) => audit.log_file_watch("file_changed", &event.path),
            Err(_) => {
                tracing::error!(path = %event.path, "user callback panicked");
                audit.log_callback_panic(&event.path);
            }
        }
    });
}
