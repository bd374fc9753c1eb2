//! Argus: a universal configuration-file watcher
//!
//! Argus polls registered configuration files, diffs their stats through a
//! lock-free copy-on-write cache, and delivers parsed, audited change
//! notifications to per-file callbacks through a fixed-capacity MPSC event
//! ring with zero steady-state allocations.
//!
//! ```no_run
//! use argus::{Watcher, WatcherConfig};
//! use std::time::Duration;
//!
//! let watcher = Watcher::new(WatcherConfig {
//!     poll_interval: Duration::from_millis(500),
//!     ..WatcherConfig::default()
//! })?;
//! watcher.watch("/etc/myapp/config.json", |event| {
//!     println!("{} changed ({} bytes)", event.path, event.size);
//! })?;
//! watcher.start()?;
//! # Ok::<(), argus::WatchError>(())
//! ```

pub mod audit;
pub mod config_loader;
pub mod dispatcher;
pub mod error;
pub mod error_codes;
pub mod event;
pub mod parser;
pub mod poller;
pub mod ring;
pub mod stat_cache;
pub mod strategy;
pub mod validation;
pub mod version;
pub mod watcher;
pub mod writer;

pub use audit::{AuditConfig, AuditLevel, AuditLogger};
pub use config_loader::{load_from_env, load_from_file, ValidationIssue, ValidationResult};
pub use dispatcher::{ChangeCallback, ChangeEvent};
pub use error::{Result, WatchError};
pub use event::{FileChangeEvent, FLAG_CREATE, FLAG_DELETE, FLAG_MODIFY, MAX_EVENT_PATH_LEN};
pub use parser::{
    detect_format, parse_config, register_parser, ConfigFormat, ConfigParser, ConfigValue,
};
pub use ring::{EventRing, PublishOutcome, RingStats, MIN_RING_CAPACITY};
pub use stat_cache::{CacheStats, FileStat, StatCache};
pub use strategy::{select, OptimizationStrategy, StrategyParams};
pub use validation::{validate, validate_and_resolve, PathRejection};
pub use version::BuildInfo;
pub use watcher::{ErrorHandler, Watcher, WatcherConfig};
pub use writer::{serialize_config, write_config_atomic};
