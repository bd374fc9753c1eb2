//! Security validation scenarios through the public watch surface.

use argus::{validate, AuditConfig, PathRejection, Watcher, WatcherConfig};
use std::time::Duration;
use tempfile::TempDir;

fn audited_watcher(dir: &TempDir) -> (Watcher, std::path::PathBuf) {
    let audit_path = dir.path().join("audit.jsonl");
    let watcher = Watcher::new(WatcherConfig {
        poll_interval: Duration::from_millis(50),
        audit: Some(AuditConfig {
            output_file: audit_path.clone(),
            ..AuditConfig::default()
        }),
        ..WatcherConfig::default()
    })
    .unwrap();
    (watcher, audit_path)
}

fn read_audit(path: &std::path::Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|l| serde_json::from_str(l).expect("audit line is valid JSON"))
        .collect()
}

#[test]
fn test_traversal_watch_is_rejected_and_audited() {
    let dir = TempDir::new().unwrap();
    let (watcher, audit_path) = audited_watcher(&dir);

    let err = watcher.watch("../../etc/passwd", |_| {}).unwrap_err();
    assert_eq!(err.code(), argus::error_codes::ARGUS_INVALID_CONFIG);
    assert_eq!(watcher.watched_files(), 0);

    let entries = read_audit(&audit_path);
    assert!(
        entries
            .iter()
            .any(|e| e["event"] == "path_traversal_attempt" && e["level"] == "SECURITY"),
        "expected path_traversal_attempt, got {:?}",
        entries
    );
    watcher.stop().unwrap();
}

#[test]
fn test_device_name_watches_rejected() {
    let dir = TempDir::new().unwrap();
    let (watcher, _) = audited_watcher(&dir);

    for path in ["//CON", "PRN.txt.bak", "\\\\Con\\sub"] {
        let err = watcher.watch(path, |_| {}).unwrap_err();
        assert_eq!(
            err.code(),
            argus::error_codes::ARGUS_INVALID_CONFIG,
            "{} must be rejected",
            path
        );
    }
    watcher.stop().unwrap();
}

#[test]
fn test_unc_share_passes_validation() {
    // Registration of a UNC path fails later on stat, not on validation.
    assert_eq!(validate("//server/share/config.json"), Ok(()));
}

/// Rejection sweep: every string containing a traversal marker, an encoded
/// marker, a null byte, or exceeding the length bound is rejected.
#[test]
fn test_rejection_sweep() {
    let traversals = [
        "..",
        "../x",
        "a/../b",
        "c:\\temp\\..\\secret",
        "%2e%2e/config",
        "a%2fb",
        "nul\0l",
    ];
    for path in traversals {
        assert!(validate(path).is_err(), "{:?} must be rejected", path);
    }
    assert_eq!(
        validate(&"x/".repeat(100)),
        Err(PathRejection::TooManySeparators)
    );
    assert_eq!(validate(&"x".repeat(5000)), Err(PathRejection::TooLong));
}

/// Totality: arbitrary byte soup terminates with a definite verdict.
#[test]
fn test_validator_total_on_generated_inputs() {
    let alphabet = [
        "a", "/", "\\", ".", ":", "%", "2", "e", "\t", "é", "日", "\u{7f}",
    ];
    // Exhaustive over all 3-grams of the alphabet.
    for a in alphabet {
        for b in alphabet {
            for c in alphabet {
                let candidate = format!("{}{}{}", a, b, c);
                let _ = validate(&candidate);
            }
        }
    }
}

#[test]
fn test_valid_watch_path_accepted() {
    let dir = TempDir::new().unwrap();
    let (watcher, audit_path) = audited_watcher(&dir);

    let file = dir.path().join("settings.yaml");
    std::fs::write(&file, b"a: 1\n").unwrap();
    watcher.watch(&file.to_string_lossy(), |_| {}).unwrap();
    assert_eq!(watcher.watched_files(), 1);

    watcher.stop().unwrap();
    let entries = read_audit(&audit_path);
    assert!(entries.iter().any(|e| e["event"] == "watch_started"));
    // Every audit file opens with a session entry naming the binary.
    assert!(entries
        .iter()
        .any(|e| e["event"] == "watcher_session_started"
            && e["context"]["version"].is_string()));
}
