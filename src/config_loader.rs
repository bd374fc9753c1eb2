//! Watcher configuration loading and validation.
//!
//! [`WatcherConfig`] can be built in code, loaded from a JSON document on
//! disk, or assembled from `ARGUS_*` environment variables. Validation
//! produces a structured [`ValidationResult`] whose issues carry the stable
//! error codes from [`crate::error_codes`].

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audit::{AuditConfig, AuditLevel};
use crate::error::{Result, WatchError};
use crate::error_codes;
use crate::ring::MIN_RING_CAPACITY;
use crate::strategy::OptimizationStrategy;
use crate::validation;
use crate::watcher::WatcherConfig;

/// Hard ceiling on the watched set.
pub const MAX_WATCHED_FILES_LIMIT: usize = 10_000;

/// Floor for the poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Stable code from [`crate::error_codes`]
    pub code: &'static str,
    /// Human-readable reason
    pub message: String,
}

/// Outcome of validating a [`WatcherConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    /// True when `errors` is empty; warnings do not invalidate
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Convert into a hard error carrying the first failure, if any.
    pub fn into_result(self) -> Result<()> {
        match self.errors.into_iter().next() {
            None => Ok(()),
            Some(issue) => Err(WatchError::InvalidConfig {
                code: issue.code,
                message: issue.message,
            }),
        }
    }
}

impl WatcherConfig {
    /// Validate bounds and cross-field constraints.
    pub fn validate(&self) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.poll_interval.is_zero() {
            errors.push(ValidationIssue {
                code: error_codes::ARGUS_INVALID_POLL_INTERVAL,
                message: "poll interval must be nonzero".to_string(),
            });
        } else if self.poll_interval < MIN_POLL_INTERVAL {
            errors.push(ValidationIssue {
                code: error_codes::ARGUS_POLL_INTERVAL_TOO_SMALL,
                message: format!(
                    "poll interval {:?} is below the {:?} floor",
                    self.poll_interval, MIN_POLL_INTERVAL
                ),
            });
        }

        if let Some(ttl) = self.cache_ttl {
            if ttl > self.poll_interval {
                warnings.push(ValidationIssue {
                    code: error_codes::ARGUS_CACHE_TTL_TOO_LARGE,
                    message: format!(
                        "cache TTL {:?} exceeds the poll interval {:?}; stale stats add no value",
                        ttl, self.poll_interval
                    ),
                });
            }
        }

        if self.max_watched_files == 0 {
            errors.push(ValidationIssue {
                code: error_codes::ARGUS_INVALID_MAX_WATCHED_FILES,
                message: "max_watched_files must be at least 1".to_string(),
            });
        } else if self.max_watched_files > MAX_WATCHED_FILES_LIMIT {
            errors.push(ValidationIssue {
                code: error_codes::ARGUS_MAX_FILES_TOO_LARGE,
                message: format!(
                    "max_watched_files {} exceeds the hard limit {}",
                    self.max_watched_files, MAX_WATCHED_FILES_LIMIT
                ),
            });
        }

        let capacity = self.event_ring_capacity;
        if capacity != 0 && (capacity < MIN_RING_CAPACITY || !capacity.is_power_of_two()) {
            errors.push(ValidationIssue {
                code: error_codes::ARGUS_INVALID_BOREAS_CAPACITY,
                message: format!(
                    "event ring capacity must be 0 (auto) or a power of two >= {}, got {}",
                    MIN_RING_CAPACITY, capacity
                ),
            });
        }

        if let Some(audit) = &self.audit {
            if audit.buffer_size == 0 {
                errors.push(ValidationIssue {
                    code: error_codes::ARGUS_INVALID_BUFFER_SIZE,
                    message: "audit buffer size must be at least 1".to_string(),
                });
            }
            if audit.flush_interval.is_zero() {
                errors.push(ValidationIssue {
                    code: error_codes::ARGUS_INVALID_FLUSH_INTERVAL,
                    message: "audit flush interval must be nonzero".to_string(),
                });
            }
            let output = audit.output_file.to_string_lossy();
            if output.is_empty() || validation::validate(&output).is_err() {
                errors.push(ValidationIssue {
                    code: error_codes::ARGUS_INVALID_OUTPUT_FILE,
                    message: "audit output file is empty or unsafe".to_string(),
                });
            }
        }

        ValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

/// On-disk JSON schema. All fields optional; omissions keep defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigDocument {
    poll_interval_ms: Option<u64>,
    cache_ttl_ms: Option<u64>,
    max_watched_files: Option<usize>,
    optimization_strategy: Option<String>,
    event_ring_capacity: Option<usize>,
    audit: Option<AuditDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AuditDocument {
    output_file: String,
    min_level: Option<String>,
    buffer_size: Option<usize>,
    flush_interval_ms: Option<u64>,
}

/// Load configuration from a JSON file.
///
/// The result is validated; the first validation error fails the load.
/// Warnings are reported through the diagnostic log.
pub fn load_from_file(path: &str) -> Result<WatcherConfig> {
    let bytes = std::fs::read(path).map_err(|e| WatchError::Io {
        path: path.to_string(),
        source: e,
    })?;
    let document: ConfigDocument =
        serde_json::from_slice(&bytes).map_err(|e| WatchError::InvalidConfig {
            code: error_codes::ARGUS_INVALID_CONFIG,
            message: format!("config file is not valid JSON: {}", e),
        })?;
    build_config(document)
}

/// Assemble configuration from `ARGUS_*` environment variables. Unset
/// variables keep their defaults; malformed values are errors with the
/// matching stable code.
pub fn load_from_env() -> Result<WatcherConfig> {
    let document = ConfigDocument {
        poll_interval_ms: env_u64("ARGUS_POLL_INTERVAL_MS", error_codes::ARGUS_INVALID_POLL_INTERVAL)?,
        cache_ttl_ms: env_u64("ARGUS_CACHE_TTL_MS", error_codes::ARGUS_INVALID_CACHE_TTL)?,
        max_watched_files: env_u64("ARGUS_MAX_WATCHED_FILES", error_codes::ARGUS_INVALID_MAX_WATCHED_FILES)?
            .map(|v| v as usize),
        optimization_strategy: std::env::var("ARGUS_OPTIMIZATION").ok(),
        event_ring_capacity: env_u64("ARGUS_RING_CAPACITY", error_codes::ARGUS_INVALID_BOREAS_CAPACITY)?
            .map(|v| v as usize),
        audit: match std::env::var("ARGUS_AUDIT_FILE") {
            Ok(output_file) => Some(AuditDocument {
                output_file,
                min_level: std::env::var("ARGUS_AUDIT_MIN_LEVEL").ok(),
                buffer_size: env_u64("ARGUS_AUDIT_BUFFER_SIZE", error_codes::ARGUS_INVALID_BUFFER_SIZE)?
                    .map(|v| v as usize),
                flush_interval_ms: env_u64("ARGUS_AUDIT_FLUSH_MS", error_codes::ARGUS_INVALID_FLUSH_INTERVAL)?,
            }),
            Err(_) => None,
        },
    };
    build_config(document)
}

fn env_u64(name: &str, code: &'static str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Err(_) => Ok(None),
        Ok(raw) => raw.trim().parse::<u64>().map(Some).map_err(|_| {
            WatchError::InvalidConfig {
                code,
                message: format!("{} is not a valid integer", name),
            }
        }),
    }
}

fn build_config(document: ConfigDocument) -> Result<WatcherConfig> {
    let mut config = WatcherConfig::default();

    if let Some(ms) = document.poll_interval_ms {
        config.poll_interval = Duration::from_millis(ms);
    }
    if let Some(ms) = document.cache_ttl_ms {
        config.cache_ttl = Some(Duration::from_millis(ms));
    }
    if let Some(max) = document.max_watched_files {
        config.max_watched_files = max;
    }
    if let Some(raw) = &document.optimization_strategy {
        config.optimization_strategy =
            raw.parse::<OptimizationStrategy>()
                .map_err(|_| WatchError::InvalidConfig {
                    code: error_codes::ARGUS_INVALID_OPTIMIZATION,
                    message: format!("unrecognized optimization strategy {:?}", raw),
                })?;
    }
    if let Some(capacity) = document.event_ring_capacity {
        config.event_ring_capacity = capacity;
    }
    if let Some(audit) = document.audit {
        let mut audit_config = AuditConfig {
            output_file: PathBuf::from(&audit.output_file),
            ..AuditConfig::default()
        };
        if let Some(raw) = &audit.min_level {
            audit_config.min_level =
                raw.parse::<AuditLevel>()
                    .map_err(|_| WatchError::InvalidConfig {
                        code: error_codes::ARGUS_INVALID_CONFIG,
                        message: format!("unrecognized audit level {:?}", raw),
                    })?;
        }
        if let Some(size) = audit.buffer_size {
            audit_config.buffer_size = size;
        }
        if let Some(ms) = audit.flush_interval_ms {
            audit_config.flush_interval = Duration::from_millis(ms);
        }
        config.audit = Some(audit_config);
    }

    let report = config.validate();
    for warning in &report.warnings {
        tracing::warn!(code = warning.code, "{}", warning.message);
    }
    report.into_result()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let report = WatcherConfig::default().validate();
        assert!(report.valid, "{:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_poll_interval_bounds() {
        let zero = WatcherConfig {
            poll_interval: Duration::ZERO,
            ..WatcherConfig::default()
        };
        let report = zero.validate();
        assert!(!report.valid);
        assert_eq!(report.errors[0].code, error_codes::ARGUS_INVALID_POLL_INTERVAL);

        let tiny = WatcherConfig {
            poll_interval: Duration::from_millis(5),
            ..WatcherConfig::default()
        };
        let report = tiny.validate();
        assert_eq!(
            report.errors[0].code,
            error_codes::ARGUS_POLL_INTERVAL_TOO_SMALL
        );

        let floor = WatcherConfig {
            poll_interval: Duration::from_millis(10),
            ..WatcherConfig::default()
        };
        assert!(floor.validate().valid);
    }

    #[test]
    fn test_cache_ttl_warning_does_not_invalidate() {
        let config = WatcherConfig {
            poll_interval: Duration::from_millis(100),
            cache_ttl: Some(Duration::from_secs(10)),
            ..WatcherConfig::default()
        };
        let report = config.validate();
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].code, error_codes::ARGUS_CACHE_TTL_TOO_LARGE);
    }

    #[test]
    fn test_max_files_bounds() {
        let zero = WatcherConfig {
            max_watched_files: 0,
            ..WatcherConfig::default()
        };
        assert_eq!(
            zero.validate().errors[0].code,
            error_codes::ARGUS_INVALID_MAX_WATCHED_FILES
        );

        let huge = WatcherConfig {
            max_watched_files: 10_001,
            ..WatcherConfig::default()
        };
        assert_eq!(
            huge.validate().errors[0].code,
            error_codes::ARGUS_MAX_FILES_TOO_LARGE
        );

        let ceiling = WatcherConfig {
            max_watched_files: 10_000,
            ..WatcherConfig::default()
        };
        assert!(ceiling.validate().valid);
    }

    #[test]
    fn test_ring_capacity_bounds() {
        for capacity in [1, 63, 100, 129] {
            let config = WatcherConfig {
                event_ring_capacity: capacity,
                ..WatcherConfig::default()
            };
            assert_eq!(
                config.validate().errors[0].code,
                error_codes::ARGUS_INVALID_BOREAS_CAPACITY,
                "capacity {}",
                capacity
            );
        }
        for capacity in [0, 64, 256, 4096] {
            let config = WatcherConfig {
                event_ring_capacity: capacity,
                ..WatcherConfig::default()
            };
            assert!(config.validate().valid, "capacity {}", capacity);
        }
    }

    #[test]
    fn test_audit_bounds() {
        let config = WatcherConfig {
            audit: Some(AuditConfig {
                output_file: PathBuf::new(),
                buffer_size: 0,
                flush_interval: Duration::ZERO,
                ..AuditConfig::default()
            }),
            ..WatcherConfig::default()
        };
        let report = config.validate();
        let codes: Vec<&str> = report.errors.iter().map(|e| e.code).collect();
        assert!(codes.contains(&error_codes::ARGUS_INVALID_BUFFER_SIZE));
        assert!(codes.contains(&error_codes::ARGUS_INVALID_FLUSH_INTERVAL));
        assert!(codes.contains(&error_codes::ARGUS_INVALID_OUTPUT_FILE));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let audit_path = dir.path().join("audit.jsonl");
        let config_path = dir.path().join("watcher.json");
        std::fs::write(
            &config_path,
            serde_json::to_vec(&serde_json::json!({
                "poll_interval_ms": 250,
                "cache_ttl_ms": 100,
                "max_watched_files": 32,
                "optimization_strategy": "small_batch",
                "event_ring_capacity": 128,
                "audit": {
                    "output_file": audit_path.to_string_lossy(),
                    "min_level": "WARN",
                    "buffer_size": 16,
                    "flush_interval_ms": 1000
                }
            }))
            .unwrap(),
        )
        .unwrap();

        let config = load_from_file(&config_path.to_string_lossy()).unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.cache_ttl, Some(Duration::from_millis(100)));
        assert_eq!(config.max_watched_files, 32);
        assert_eq!(
            config.optimization_strategy,
            OptimizationStrategy::SmallBatch
        );
        assert_eq!(config.event_ring_capacity, 128);
        let audit = config.audit.unwrap();
        assert_eq!(audit.min_level, AuditLevel::Warn);
        assert_eq!(audit.buffer_size, 16);
    }

    #[test]
    fn test_load_from_file_rejects_bad_values() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_path = dir.path().join("watcher.json");
        std::fs::write(
            &config_path,
            br#"{"poll_interval_ms": 1, "max_watched_files": 5}"#,
        )
        .unwrap();

        let err = load_from_file(&config_path.to_string_lossy()).unwrap_err();
        assert_eq!(err.code(), error_codes::ARGUS_POLL_INTERVAL_TOO_SMALL);
    }

    #[test]
    fn test_load_from_file_rejects_bad_strategy() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_path = dir.path().join("watcher.json");
        std::fs::write(&config_path, br#"{"optimization_strategy": "warp"}"#).unwrap();

        let err = load_from_file(&config_path.to_string_lossy()).unwrap_err();
        assert_eq!(err.code(), error_codes::ARGUS_INVALID_OPTIMIZATION);
    }
}
