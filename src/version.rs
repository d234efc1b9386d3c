//! Version and build information for modscope.

/// Full version string including build metadata.
///
/// Returns format: "modscope {version} ({commit}) rustc {rustc_version}"
pub fn version() -> String {
    format!(
        "modscope {} ({}) rustc {}",
        package_version(),
        build_commit(),
        rustc_version()
    )
}

/// Package version (e.g., "0.1.0")
pub fn package_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Build commit SHA, or "unknown" when built outside a git checkout
pub fn build_commit() -> &'static str {
    option_env!("MODSCOPE_COMMIT_SHA").unwrap_or("unknown")
}

/// Rust compiler version used for the build
pub fn rustc_version() -> &'static str {
    option_env!("MODSCOPE_RUSTC_VERSION").unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_mentions_package_version() {
        let v = version();
        assert!(v.starts_with("modscope "));
        assert!(v.contains(package_version()));
    }
}
