//! Typed errors for the watch engine.
//!
//! Internal code matches on these variants; the stable string codes from
//! [`crate::error_codes`] are attached only at the public boundary via
//! [`WatchError::code`]. Error messages never embed raw file contents.

use crate::error_codes;
use crate::validation::PathRejection;

/// Error type for all watcher operations.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Configuration rejected at construction or registration.
    ///
    /// Carries the specific stable code for the field that failed
    /// (e.g. `ARGUS_POLL_INTERVAL_TOO_SMALL`).
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Stable code identifying the rejected field
        code: &'static str,
        /// Human-readable reason
        message: String,
    },

    /// Path rejected by the security validator.
    #[error("unsafe path {path:?}: {rejection}")]
    UnsafePath {
        /// The offending path as supplied by the caller
        path: String,
        /// The first matching rejection rule
        rejection: PathRejection,
    },

    /// Watched-set quota reached.
    #[error("watched file limit exceeded ({limit} files)")]
    LimitExceeded {
        /// Configured max_watched_files
        limit: usize,
    },

    /// Path is not registered.
    #[error("file not watched: {path}")]
    FileNotFound {
        /// The path that was looked up
        path: String,
    },

    /// Operation attempted after the watcher reached its terminal state.
    #[error("watcher is stopped")]
    WatcherStopped,

    /// Watcher already running, or a graceful shutdown exceeded its deadline.
    #[error("watcher is busy")]
    WatcherBusy,

    /// Transient I/O failure (permission denied and friends).
    ///
    /// Non-existence is data, not an error: a missing file stats as
    /// `exists = false`. This variant is routed to the user error handler
    /// rather than returned from `watch`.
    #[error("i/o error on {path}: {source}")]
    Io {
        /// Path the stat was issued against
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config content could not be parsed.
    ///
    /// The message carries format and position context only, never the
    /// raw input bytes.
    #[error("parse error ({format}): {message}")]
    Parse {
        /// Format name as detected or requested
        format: &'static str,
        /// Sanitized reason
        message: String,
    },
}

impl WatchError {
    /// Stable string code for external consumers.
    ///
    /// Transient I/O and parse failures have no dedicated exported code;
    /// at the boundary they reuse the generic invalid-config code (they are
    /// normally delivered through the error handler, not returned).
    pub fn code(&self) -> &'static str {
        match self {
            WatchError::InvalidConfig { code, .. } => code,
            WatchError::UnsafePath { .. } => error_codes::ARGUS_INVALID_CONFIG,
            WatchError::LimitExceeded { .. } => error_codes::ARGUS_INVALID_CONFIG,
            WatchError::FileNotFound { .. } => error_codes::ARGUS_FILE_NOT_FOUND,
            WatchError::WatcherStopped => error_codes::ARGUS_WATCHER_STOPPED,
            WatchError::WatcherBusy => error_codes::ARGUS_WATCHER_BUSY,
            WatchError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                error_codes::ARGUS_FILE_NOT_FOUND
            }
            WatchError::Io { .. } => error_codes::ARGUS_INVALID_CONFIG,
            WatchError::Parse { .. } => error_codes::ARGUS_INVALID_CONFIG,
        }
    }

    /// Shorthand for a generic invalid-config error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        WatchError::InvalidConfig {
            code: error_codes::ARGUS_INVALID_CONFIG,
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_from_exported_set() {
        let errors = vec![
            WatchError::invalid_config("bad"),
            WatchError::LimitExceeded { limit: 2 },
            WatchError::FileNotFound {
                path: "/tmp/a".into(),
            },
            WatchError::WatcherStopped,
            WatchError::WatcherBusy,
            WatchError::Parse {
                format: "json",
                message: "unexpected token at line 3".into(),
            },
        ];
        for err in errors {
            assert!(
                error_codes::ALL_CODES.contains(&err.code()),
                "code {} not exported",
                err.code()
            );
        }
    }

    #[test]
    fn test_not_found_io_maps_to_file_not_found() {
        let err = WatchError::Io {
            path: "/tmp/missing".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        assert_eq!(err.code(), error_codes::ARGUS_FILE_NOT_FOUND);
    }

    #[test]
    fn test_messages_do_not_echo_contents() {
        // The parse variant carries positional context only; this guards the
        // construction sites by convention, so just check Display shape here.
        let err = WatchError::Parse {
            format: "yaml",
            message: "mapping values are not allowed at line 2 column 5".into(),
        };
        let text = err.to_string();
        assert!(text.contains("yaml"));
        assert!(text.contains("line 2"));
    }
}
