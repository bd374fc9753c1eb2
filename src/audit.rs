//! Structured audit trail.
//!
//! Separate from diagnostic logging: audit entries are schema-stable JSON
//! lines written to a configured file, buffered in memory and flushed by a
//! background thread on an interval, when the buffer fills, and immediately
//! for security-level entries. The watcher closes the logger during
//! shutdown; `close` is idempotent and joins the flusher.
//!
//! A logger that fails to construct degrades to a disabled instance whose
//! operations are no-ops, so audit misconfiguration never takes the watch
//! engine down.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WatchError;
use crate::error_codes;
use crate::validation;
use crate::version::BuildInfo;

/// Audit severity. `Security` entries bypass buffering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditLevel {
    Info,
    Warn,
    Critical,
    Security,
}

impl std::str::FromStr for AuditLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(AuditLevel::Info),
            "warn" | "warning" => Ok(AuditLevel::Warn),
            "critical" => Ok(AuditLevel::Critical),
            "security" => Ok(AuditLevel::Security),
            _ => Err(()),
        }
    }
}

/// Audit sink configuration.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// JSONL output file; created if missing, appended otherwise
    pub output_file: PathBuf,
    /// Entries below this level are discarded
    pub min_level: AuditLevel,
    /// Buffered entries before a forced flush
    pub buffer_size: usize,
    /// Background flush cadence
    pub flush_interval: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        AuditConfig {
            output_file: PathBuf::from("argus-audit.jsonl"),
            min_level: AuditLevel::Info,
            buffer_size: 50,
            flush_interval: Duration::from_secs(5),
        }
    }
}

/// One audit record. Field order and names are part of the on-disk schema.
#[derive(Debug, Clone, Serialize)]
struct AuditEntry {
    timestamp: DateTime<Utc>,
    level: AuditLevel,
    component: &'static str,
    event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<BTreeMap<String, String>>,
    process_id: u32,
}

struct AuditInner {
    min_level: AuditLevel,
    buffer_size: usize,
    buffer: Mutex<Vec<AuditEntry>>,
    writer: Mutex<BufWriter<std::fs::File>>,
    closed: AtomicBool,
    stop_tx: Mutex<Option<mpsc::Sender<()>>>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the audit trail. Cloning shares the underlying sink.
#[derive(Clone)]
pub struct AuditLogger {
    inner: Option<Arc<AuditInner>>,
}

impl AuditLogger {
    /// A logger that drops everything. Used when auditing is not configured
    /// or when construction failed.
    pub fn disabled() -> Self {
        AuditLogger { inner: None }
    }

    /// Open the audit sink and start the background flusher.
    pub fn new(config: &AuditConfig) -> Result<Self, WatchError> {
        let path_str = config.output_file.to_string_lossy();
        if path_str.is_empty() {
            return Err(WatchError::InvalidConfig {
                code: error_codes::ARGUS_INVALID_OUTPUT_FILE,
                message: "audit output file is empty".to_string(),
            });
        }
        validation::validate(&path_str).map_err(|rejection| WatchError::InvalidConfig {
            code: error_codes::ARGUS_INVALID_OUTPUT_FILE,
            message: format!("audit output file rejected: {}", rejection),
        })?;
        if config.buffer_size == 0 {
            return Err(WatchError::InvalidConfig {
                code: error_codes::ARGUS_INVALID_BUFFER_SIZE,
                message: "audit buffer size must be at least 1".to_string(),
            });
        }
        if config.flush_interval.is_zero() {
            return Err(WatchError::InvalidConfig {
                code: error_codes::ARGUS_INVALID_FLUSH_INTERVAL,
                message: "audit flush interval must be nonzero".to_string(),
            });
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.output_file)
            .map_err(|e| WatchError::InvalidConfig {
                code: error_codes::ARGUS_INVALID_OUTPUT_FILE,
                message: format!("cannot open audit output file: {}", e),
            })?;

        let (stop_tx, stop_rx) = mpsc::channel();
        let inner = Arc::new(AuditInner {
            min_level: config.min_level,
            buffer_size: config.buffer_size,
            buffer: Mutex::new(Vec::with_capacity(config.buffer_size)),
            writer: Mutex::new(BufWriter::new(file)),
            closed: AtomicBool::new(false),
            stop_tx: Mutex::new(Some(stop_tx)),
            flusher: Mutex::new(None),
        });

        let flusher_inner = Arc::clone(&inner);
        let flush_interval = config.flush_interval;
        let handle = std::thread::Builder::new()
            .name("argus-audit-flush".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(flush_interval) {
                    Err(RecvTimeoutError::Timeout) => flusher_inner.flush(),
                    // Stop signal or sender dropped: final flush happens in close()
                    _ => break,
                }
            })
            .map_err(|e| WatchError::InvalidConfig {
                code: error_codes::ARGUS_INVALID_OUTPUT_FILE,
                message: format!("cannot start audit flusher: {}", e),
            })?;
        *inner.flusher.lock().unwrap() = Some(handle);

        Ok(AuditLogger { inner: Some(inner) })
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Record the opening of a watcher session, identifying the binary
    /// that wrote this audit file.
    pub fn log_session_start(&self, build: &BuildInfo) {
        let mut context = BTreeMap::new();
        context.insert("version".to_string(), build.version.to_string());
        context.insert("commit".to_string(), build.commit.to_string());
        context.insert("built".to_string(), build.built.to_string());
        context.insert("rustc".to_string(), build.rustc.to_string());
        self.push(
            AuditLevel::Info,
            "watcher_session_started",
            None,
            None,
            Some(context),
        );
    }

    /// Record a watch lifecycle or delivery event for `path`.
    pub fn log_file_watch(&self, event_name: &str, path: &str) {
        self.push(AuditLevel::Info, event_name, Some(path), None, None);
    }

    /// Record a config value transition. `before`/`after` are serialized
    /// into the entry context as compact JSON.
    pub fn log_config_change(
        &self,
        path: &str,
        before: &serde_json::Value,
        after: &serde_json::Value,
    ) {
        let mut context = BTreeMap::new();
        context.insert(
            "before".to_string(),
            serde_json::to_string(before).unwrap_or_default(),
        );
        context.insert(
            "after".to_string(),
            serde_json::to_string(after).unwrap_or_default(),
        );
        self.push(
            AuditLevel::Info,
            "config_changed",
            Some(path),
            None,
            Some(context),
        );
    }

    /// Record a security decision (path rejection, quota breach). Flushed
    /// immediately.
    pub fn log_security_event(
        &self,
        event_name: &str,
        message: &str,
        context: &BTreeMap<String, String>,
    ) {
        self.push(
            AuditLevel::Security,
            event_name,
            None,
            Some(message),
            Some(context.clone()),
        );
    }

    /// Record a callback fault for `path`.
    pub fn log_callback_panic(&self, path: &str) {
        self.push(
            AuditLevel::Critical,
            "callback_panic",
            Some(path),
            Some("user callback terminated abnormally"),
            None,
        );
    }

    /// Flush and shut down the flusher thread. Safe to call more than once.
    pub fn close(&self) {
        let Some(inner) = &self.inner else {
            return;
        };
        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(tx) = inner.stop_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
        if let Some(handle) = inner.flusher.lock().unwrap().take() {
            let _ = handle.join();
        }
        inner.flush();
    }

    fn push(
        &self,
        level: AuditLevel,
        event: &str,
        path: Option<&str>,
        message: Option<&str>,
        context: Option<BTreeMap<String, String>>,
    ) {
        let Some(inner) = &self.inner else {
            return;
        };
        if inner.closed.load(Ordering::SeqCst) || level < inner.min_level {
            return;
        }

        let entry = AuditEntry {
            timestamp: Utc::now(),
            level,
            component: "argus",
            event: event.to_string(),
            path: path.map(str::to_string),
            message: message.map(str::to_string),
            context,
            process_id: std::process::id(),
        };

        let should_flush = {
            let mut buffer = inner.buffer.lock().unwrap();
            buffer.push(entry);
            buffer.len() >= inner.buffer_size || level == AuditLevel::Security
        };
        if should_flush {
            inner.flush();
        }
    }
}

impl AuditInner {
    /// Drain the buffer into the writer. Write failures are reported to the
    /// diagnostic log and otherwise swallowed; the audit trail must never
    /// take the watcher down.
    fn flush(&self) {
        let drained: Vec<AuditEntry> = {
            let mut buffer = self.buffer.lock().unwrap();
            std::mem::take(&mut *buffer)
        };
        if drained.is_empty() {
            return;
        }
        let mut writer = self.writer.lock().unwrap();
        for entry in &drained {
            match serde_json::to_string(entry) {
                Ok(line) => {
                    if let Err(e) = writeln!(writer, "{}", line) {
                        tracing::warn!(error = %e, "audit write failed");
                        return;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "audit entry serialization failed"),
            }
        }
        if let Err(e) = writer.flush() {
            tracing::warn!(error = %e, "audit flush failed");
        }
    }
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(dir: &tempfile::TempDir) -> AuditConfig {
        AuditConfig {
            output_file: dir.path().join("audit.jsonl"),
            min_level: AuditLevel::Info,
            buffer_size: 4,
            flush_interval: Duration::from_secs(60),
        }
    }

    fn read_lines(config: &AuditConfig) -> Vec<serde_json::Value> {
        let text = std::fs::read_to_string(&config.output_file).unwrap_or_default();
        text.lines()
            .map(|l| serde_json::from_str(l).expect("audit line is valid JSON"))
            .collect()
    }

    #[test]
    fn test_entries_are_json_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = config_for(&dir);
        let logger = AuditLogger::new(&config).unwrap();

        logger.log_file_watch("watch_started", "/tmp/a.json");
        logger.log_file_watch("file_changed", "/tmp/a.json");
        logger.close();

        let lines = read_lines(&config);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "watch_started");
        assert_eq!(lines[0]["component"], "argus");
        assert_eq!(lines[0]["level"], "INFO");
        assert_eq!(lines[1]["path"], "/tmp/a.json");
        assert!(lines[0]["process_id"].as_u64().unwrap() > 0);
    }

    #[test]
    fn test_security_events_flush_immediately() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = config_for(&dir);
        let logger = AuditLogger::new(&config).unwrap();

        let mut context = BTreeMap::new();
        context.insert("path".to_string(), "../../etc/passwd".to_string());
        logger.log_security_event("path_traversal_attempt", "watch rejected", &context);

        // No close, no interval elapsed: the entry must already be on disk.
        let lines = read_lines(&config);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["event"], "path_traversal_attempt");
        assert_eq!(lines[0]["level"], "SECURITY");
        assert_eq!(lines[0]["context"]["path"], "../../etc/passwd");
        logger.close();
    }

    #[test]
    fn test_buffer_flushes_when_full() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = config_for(&dir);
        let logger = AuditLogger::new(&config).unwrap();

        for i in 0..4 {
            logger.log_file_watch("file_changed", &format!("/tmp/{}.json", i));
        }
        assert_eq!(read_lines(&config).len(), 4);
        logger.close();
    }

    #[test]
    fn test_min_level_filters() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = AuditConfig {
            min_level: AuditLevel::Security,
            ..config_for(&dir)
        };
        let logger = AuditLogger::new(&config).unwrap();

        logger.log_file_watch("file_changed", "/tmp/a.json");
        logger.log_callback_panic("/tmp/a.json");
        logger.log_security_event("watch_limit_exceeded", "limit", &BTreeMap::new());
        logger.close();

        let lines = read_lines(&config);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["event"], "watch_limit_exceeded");
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = config_for(&dir);
        let logger = AuditLogger::new(&config).unwrap();
        logger.log_file_watch("watch_started", "/tmp/a.json");
        logger.close();
        logger.close();
        assert_eq!(read_lines(&config).len(), 1);
    }

    #[test]
    fn test_disabled_logger_is_noop() {
        let logger = AuditLogger::disabled();
        assert!(!logger.is_enabled());
        logger.log_file_watch("watch_started", "/tmp/a.json");
        logger.log_security_event("x", "y", &BTreeMap::new());
        logger.close();
    }

    #[test]
    fn test_rejects_zero_buffer_and_interval() {
        let dir = tempfile::TempDir::new().unwrap();
        let bad_buffer = AuditConfig {
            buffer_size: 0,
            ..config_for(&dir)
        };
        assert!(matches!(
            AuditLogger::new(&bad_buffer),
            Err(WatchError::InvalidConfig {
                code: error_codes::ARGUS_INVALID_BUFFER_SIZE,
                ..
            })
        ));

        let bad_interval = AuditConfig {
            flush_interval: Duration::ZERO,
            ..config_for(&dir)
        };
        assert!(matches!(
            AuditLogger::new(&bad_interval),
            Err(WatchError::InvalidConfig {
                code: error_codes::ARGUS_INVALID_FLUSH_INTERVAL,
                ..
            })
        ));
    }

    #[test]
    fn test_session_start_identifies_binary() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = AuditConfig {
            buffer_size: 1,
            ..config_for(&dir)
        };
        let logger = AuditLogger::new(&config).unwrap();
        logger.log_session_start(&BuildInfo::current());
        logger.close();

        let lines = read_lines(&config);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["event"], "watcher_session_started");
        assert_eq!(lines[0]["context"]["version"], env!("CARGO_PKG_VERSION"));
        assert!(lines[0]["context"]["commit"].is_string());
    }

    #[test]
    fn test_config_change_serializes_values() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = AuditConfig {
            buffer_size: 1,
            ..config_for(&dir)
        };
        let logger = AuditLogger::new(&config).unwrap();
        logger.log_config_change(
            "/tmp/a.json",
            &serde_json::json!({"a": 1}),
            &serde_json::json!({"a": 2}),
        );
        logger.close();

        let lines = read_lines(&config);
        assert_eq!(lines[0]["event"], "config_changed");
        assert_eq!(lines[0]["context"]["before"], "{\"a\":1}");
        assert_eq!(lines[0]["context"]["after"], "{\"a\":2}");
    }
}
