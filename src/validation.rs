//! Path validation and resolution.
//!
//! Security-critical validation applied to every user-supplied path before
//! any file operation. The checks run in a fixed order over a lowercased
//! copy of the path; the first matching rule rejects. After acceptance the
//! path is resolved to absolute form and validated again, and symbolic-link
//! targets are checked against system directories.

use std::path::{Path, PathBuf};

use crate::error::WatchError;

/// Rejection reasons, in rule order. The first matching rule wins.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathRejection {
    /// Empty path string
    #[error("path is empty")]
    Empty,

    /// Parent-directory traversal sequence
    #[error("path contains a traversal sequence")]
    Traversal,

    /// URL-encoded or double-encoded traversal/separator sequence
    #[error("path contains an encoded traversal sequence")]
    EncodedTraversal,

    /// Matches a known sensitive location
    #[error("path matches a protected system location")]
    SensitivePath,

    /// Reserved Windows device name (CON, PRN, AUX, NUL, COM1-9, LPT1-9)
    #[error("path names a reserved device")]
    DeviceName,

    /// Windows NTFS alternate data stream marker
    #[error("path contains an alternate data stream marker")]
    AlternateDataStream,

    /// Longer than 4096 characters
    #[error("path exceeds the maximum length")]
    TooLong,

    /// More than 50 path separators
    #[error("path has too many components")]
    TooManySeparators,

    /// Embedded null byte
    #[error("path contains a null byte")]
    NullByte,

    /// Control character other than tab, LF, CR
    #[error("path contains a control character")]
    ControlCharacter,

    /// Symlink resolves into a system directory
    #[error("symlink target is a protected system location")]
    SymlinkEscape,
}

/// Encoded sequences rejected by rule 3. `%252e` and `%255c` also cover the
/// double-encoded `%252e%252e`-style prefixes.
const ENCODED_PATTERNS: &[&str] = &[
    "%2e%2e", "%252e", "%2f", "%252f", "%5c", "%255c", "%00", "%2500",
];

/// Absolute Unix locations rejected by prefix match.
const SENSITIVE_PREFIXES: &[&str] = &[
    "/etc/passwd",
    "/etc/shadow",
    "/etc/hosts",
    "/proc/",
    "/sys/",
    "/dev/",
];

/// Locations rejected wherever they appear in the path (both separator
/// styles; leading-separator variants are covered by the substring match).
const SENSITIVE_SUBSTRINGS: &[&str] = &[
    "windows/system32",
    "windows\\system32",
    "program files",
    "system volume information",
    ".ssh/",
    ".ssh\\",
    ".aws/",
    ".aws\\",
    ".docker/",
    ".docker\\",
];

/// Unix roots a symlink target must never resolve into.
const SYSTEM_DIR_PREFIXES: &[&str] = &["/etc/", "/proc/", "/sys/", "/dev/"];

/// Windows locations a symlink target must never resolve into.
const SYSTEM_DIR_SUBSTRINGS: &[&str] = &["system32", "program files"];

/// Validate a user-supplied path against the rejection rules.
///
/// Total over all strings: terminates and returns either `Ok` or the first
/// matching [`PathRejection`]; never panics.
pub fn validate(path: &str) -> Result<(), PathRejection> {
    // Rule 1: empty
    if path.is_empty() {
        return Err(PathRejection::Empty);
    }

    let lower = path.to_lowercase();

    // Rule 2: any ".." subsumes "../", "..\", "/..", "\.."
    if lower.contains("..") {
        return Err(PathRejection::Traversal);
    }

    // Rule 3: URL-encoded traversal and separators, single and double encoded
    for pattern in ENCODED_PATTERNS {
        if lower.contains(pattern) {
            return Err(PathRejection::EncodedTraversal);
        }
    }

    // Rule 4: known sensitive locations
    for prefix in SENSITIVE_PREFIXES {
        if lower.starts_with(prefix) {
            return Err(PathRejection::SensitivePath);
        }
    }
    for sub in SENSITIVE_SUBSTRINGS {
        if lower.contains(sub) {
            return Err(PathRejection::SensitivePath);
        }
    }

    // Rule 5: reserved device names
    if names_reserved_device(&lower) {
        return Err(PathRejection::DeviceName);
    }

    // Rule 6: alternate data stream
    if has_ads_marker(&lower) {
        return Err(PathRejection::AlternateDataStream);
    }

    // Rule 7: length
    if path.chars().count() > 4096 {
        return Err(PathRejection::TooLong);
    }

    // Rule 8: separator count
    let separators = path.chars().filter(|c| *c == '/' || *c == '\\').count();
    if separators > 50 {
        return Err(PathRejection::TooManySeparators);
    }

    // Rule 9: null byte
    if path.contains('\0') {
        return Err(PathRejection::NullByte);
    }

    // Rule 10: control characters other than tab, LF, CR
    if path
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
    {
        return Err(PathRejection::ControlCharacter);
    }

    Ok(())
}

/// Rule 5: reserved Windows device names.
///
/// The base name is checked with ALL trailing extensions stripped
/// ("PRN.txt.bak" reduces to "PRN"). For UNC-style paths that begin with one
/// or more separators, the first component is checked as well (or the second
/// when the first is at most two characters, as in "//C/CON/...").
fn names_reserved_device(lower: &str) -> bool {
    let norm = lower.replace('\\', "/");
    let trimmed = norm.trim_start_matches('/');
    let unc_style = trimmed.len() != norm.len();

    // Base name, all extensions stripped
    if let Some(base) = trimmed.rsplit('/').next() {
        if is_device_name(base) {
            return true;
        }
    }

    if unc_style {
        let mut components = trimmed.split('/').filter(|c| !c.is_empty());
        if let Some(first) = components.next() {
            if is_device_name(first) {
                return true;
            }
            if first.chars().count() <= 2 {
                if let Some(second) = components.next() {
                    if is_device_name(second) {
                        return true;
                    }
                }
            }
        }
    }

    false
}

/// Check a single component (already lowercased) against the device list,
/// ignoring every trailing extension.
fn is_device_name(component: &str) -> bool {
    let stem = component.split('.').next().unwrap_or("");
    match stem {
        "con" | "prn" | "aux" | "nul" => true,
        _ => {
            if let Some(digit) = stem.strip_prefix("com").or_else(|| stem.strip_prefix("lpt")) {
                digit.len() == 1 && digit.chars().all(|c| ('1'..='9').contains(&c))
            } else {
                false
            }
        }
    }
}

/// Rule 6: a colon anywhere other than a drive-letter position (index 1) or a
/// URL scheme marker ("://", ":\\"), where the remainder does not begin with
/// ".", marks an NTFS alternate data stream.
fn has_ads_marker(lower: &str) -> bool {
    for (i, c) in lower.char_indices() {
        if c != ':' {
            continue;
        }
        if i == 1 {
            continue;
        }
        let rest = &lower[i + 1..];
        if rest.starts_with("//") || rest.starts_with("\\\\") {
            continue;
        }
        if rest.starts_with('.') {
            continue;
        }
        return true;
    }
    false
}

/// Resolve a validated path to absolute form.
///
/// Existing paths are canonicalized (resolving symlinks and `.`); a
/// non-existent target is resolved through its closest existing parent so
/// that watching a file before it is created works.
pub fn resolve_path(path: &str) -> Result<PathBuf, WatchError> {
    let p = Path::new(path);
    if let Ok(canonical) = std::fs::canonicalize(p) {
        return Ok(canonical);
    }

    let file_name = p.file_name().ok_or_else(|| WatchError::UnsafePath {
        path: path.to_string(),
        rejection: PathRejection::Traversal,
    })?;

    let parent = match p.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    match std::fs::canonicalize(&parent) {
        Ok(canonical_parent) => Ok(canonical_parent.join(file_name)),
        Err(_) => {
            // Parent does not exist either; absolutize lexically
            if p.is_absolute() {
                Ok(p.to_path_buf())
            } else {
                let cwd = std::env::current_dir().map_err(|e| WatchError::Io {
                    path: path.to_string(),
                    source: e,
                })?;
                Ok(cwd.join(p))
            }
        }
    }
}

/// Full registration-time check: validate, resolve to absolute form,
/// re-validate the resolved form, and reject symlinks into system
/// directories. Returns the absolute path string on success.
pub fn validate_and_resolve(path: &str) -> Result<String, WatchError> {
    validate(path).map_err(|rejection| WatchError::UnsafePath {
        path: path.to_string(),
        rejection,
    })?;

    // Symlink check runs on the pre-canonicalized path, since
    // canonicalization erases the link itself.
    check_symlink_target(Path::new(path))?;

    let resolved = resolve_path(path)?;
    let resolved_str = resolved.to_string_lossy().to_string();

    validate(&resolved_str).map_err(|rejection| WatchError::UnsafePath {
        path: resolved_str.clone(),
        rejection,
    })?;

    Ok(resolved_str)
}

/// Reject a symlink whose target resolves into a system directory.
fn check_symlink_target(path: &Path) -> Result<(), WatchError> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        // Non-existent targets are fine; they become exists=false stats
        Err(_) => return Ok(()),
    };
    if !meta.file_type().is_symlink() {
        return Ok(());
    }

    let target = std::fs::read_link(path).map_err(|e| WatchError::Io {
        path: path.to_string_lossy().to_string(),
        source: e,
    })?;

    // Resolve a relative link against the symlink's own directory
    let resolved_target = if target.is_absolute() {
        target
    } else {
        path.parent().unwrap_or(Path::new(".")).join(target)
    };
    let resolved_target =
        std::fs::canonicalize(&resolved_target).unwrap_or(resolved_target);
    let target_lower = resolved_target.to_string_lossy().to_lowercase();

    let escapes = SYSTEM_DIR_PREFIXES
        .iter()
        .any(|prefix| target_lower.starts_with(prefix))
        || SYSTEM_DIR_SUBSTRINGS
            .iter()
            .any(|sub| target_lower.contains(sub));
    if escapes {
        return Err(WatchError::UnsafePath {
            path: path.to_string_lossy().to_string(),
            rejection: PathRejection::SymlinkEscape,
        });
    }

    // The target itself must also pass the ordinary rules
    validate(&target_lower).map_err(|rejection| WatchError::UnsafePath {
        path: path.to_string_lossy().to_string(),
        rejection,
    })?;

    Ok(())
}
