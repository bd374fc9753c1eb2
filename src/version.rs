//! Build metadata.
//!
//! Captured by the build script and stamped into the audit trail when a
//! watcher session opens, so an audit file identifies the exact binary
//! that produced it.

/// Build-time metadata for the running binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    /// Crate version from the manifest
    pub version: &'static str,
    /// Short commit SHA; "unknown" outside a git checkout
    pub commit: &'static str,
    /// Build date (UTC); "unknown" when unavailable
    pub built: &'static str,
    /// Compiler version used for the build
    pub rustc: &'static str,
}

impl BuildInfo {
    /// Metadata captured at compile time by the build script.
    pub fn current() -> Self {
        BuildInfo {
            version: env!("CARGO_PKG_VERSION"),
            commit: option_env!("ARGUS_COMMIT_SHA").unwrap_or("unknown"),
            built: option_env!("ARGUS_BUILD_DATE").unwrap_or("unknown"),
            rustc: option_env!("ARGUS_RUSTC_VERSION").unwrap_or("unknown"),
        }
    }
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "argus {} ({} {}) rustc {}",
            self.version, self.commit, self.built, self.rustc
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_carries_crate_version() {
        let build = BuildInfo::current();
        assert_eq!(build.version, env!("CARGO_PKG_VERSION"));
        assert!(!build.commit.is_empty());
    }

    #[test]
    fn test_display_shape() {
        let text = BuildInfo::current().to_string();
        assert!(text.starts_with("argus "));
        assert!(text.contains("rustc"));
    }
}
