//! Argus stable error codes
//!
//! Error codes follow the pattern: ARGUS_{REASON} and are part of the public
//! contract: external consumers (CLIs, log scrapers, remote orchestrators)
//! match on these strings, so a code is never renamed or reused once shipped.
//!
//! Internally the watcher works with typed [`crate::error::WatchError`]
//! variants; the string codes appear only at the public boundary via
//! [`crate::error::WatchError::code`].

/// Generic invalid configuration or rejected watch registration.
pub const ARGUS_INVALID_CONFIG: &str = "ARGUS_INVALID_CONFIG";

/// File not found (unwatch of an unregistered path).
pub const ARGUS_FILE_NOT_FOUND: &str = "ARGUS_FILE_NOT_FOUND";

/// Operation attempted after the watcher reached its terminal state.
pub const ARGUS_WATCHER_STOPPED: &str = "ARGUS_WATCHER_STOPPED";

/// Watcher already running, or a graceful shutdown exceeded its deadline.
pub const ARGUS_WATCHER_BUSY: &str = "ARGUS_WATCHER_BUSY";

/// Poll interval is not a usable duration.
pub const ARGUS_INVALID_POLL_INTERVAL: &str = "ARGUS_INVALID_POLL_INTERVAL";

/// Cache TTL is not a usable duration.
pub const ARGUS_INVALID_CACHE_TTL: &str = "ARGUS_INVALID_CACHE_TTL";

/// max_watched_files is zero or otherwise unusable.
pub const ARGUS_INVALID_MAX_WATCHED_FILES: &str = "ARGUS_INVALID_MAX_WATCHED_FILES";

/// Unrecognized optimization strategy name.
pub const ARGUS_INVALID_OPTIMIZATION: &str = "ARGUS_INVALID_OPTIMIZATION";

/// Audit buffer size is zero.
pub const ARGUS_INVALID_BUFFER_SIZE: &str = "ARGUS_INVALID_BUFFER_SIZE";

/// Audit flush interval is zero.
pub const ARGUS_INVALID_FLUSH_INTERVAL: &str = "ARGUS_INVALID_FLUSH_INTERVAL";

/// Audit output file path is empty or rejected by validation.
pub const ARGUS_INVALID_OUTPUT_FILE: &str = "ARGUS_INVALID_OUTPUT_FILE";

/// Event ring capacity is not zero (auto) or a power of two >= 64.
pub const ARGUS_INVALID_BOREAS_CAPACITY: &str = "ARGUS_INVALID_BOREAS_CAPACITY";

/// Cache TTL exceeds the poll interval (warning-level: stale reads add no value).
pub const ARGUS_CACHE_TTL_TOO_LARGE: &str = "ARGUS_CACHE_TTL_TOO_LARGE";

/// Poll interval below the 10 ms floor.
pub const ARGUS_POLL_INTERVAL_TOO_SMALL: &str = "ARGUS_POLL_INTERVAL_TOO_SMALL";

/// max_watched_files above the hard 10 000 ceiling.
pub const ARGUS_MAX_FILES_TOO_LARGE: &str = "ARGUS_MAX_FILES_TOO_LARGE";

/// All exported codes, for enumeration by external tooling.
pub const ALL_CODES: &[&str] = &[
    ARGUS_INVALID_CONFIG,
    ARGUS_FILE_NOT_FOUND,
    ARGUS_WATCHER_STOPPED,
    ARGUS_WATCHER_BUSY,
    ARGUS_INVALID_POLL_INTERVAL,
    ARGUS_INVALID_CACHE_TTL,
    ARGUS_INVALID_MAX_WATCHED_FILES,
    ARGUS_INVALID_OPTIMIZATION,
    ARGUS_INVALID_BUFFER_SIZE,
    ARGUS_INVALID_FLUSH_INTERVAL,
    ARGUS_INVALID_OUTPUT_FILE,
    ARGUS_INVALID_BOREAS_CAPACITY,
    ARGUS_CACHE_TTL_TOO_LARGE,
    ARGUS_POLL_INTERVAL_TOO_SMALL,
    ARGUS_MAX_FILES_TOO_LARGE,
];
