//! Path validation for discovered inputs.
//!
//! Source trees, reference directories and extension folders are walked
//! without following symlinks. A symlink is only read when its target stays
//! inside the directory being scanned.

use std::path::{Path, PathBuf};

/// Error types for path validation.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    /// Path cannot be canonicalized (doesn't exist or permission denied)
    #[error("cannot canonicalize path: {0}")]
    CannotCanonicalize(String),

    /// Resolved path escapes the scanned directory
    #[error("path escapes scanned directory: {0} (root: {1})")]
    OutsideRoot(String, String),

    /// Symlink points outside the scanned directory
    #[error("symlink escapes scanned directory: {0} -> {1}")]
    SymlinkEscape(String, String),

    /// Input directory does not exist or is not a directory
    #[error("not a directory: {0}")]
    NotADirectory(String),
}

/// Canonicalize a path, resolving symlinks, `..` and `.`.
pub fn canonicalize_path(path: &Path) -> Result<PathBuf, PathValidationError> {
    std::fs::canonicalize(path)
        .map_err(|_| PathValidationError::CannotCanonicalize(path.to_string_lossy().to_string()))
}

/// Canonical form of an input directory given on the command line.
pub fn validate_input_dir(path: &Path) -> Result<PathBuf, PathValidationError> {
    let canonical = canonicalize_path(path)?;
    if !canonical.is_dir() {
        return Err(PathValidationError::NotADirectory(
            path.to_string_lossy().to_string(),
        ));
    }
    Ok(canonical)
}

/// Validate that a path resolves inside `root`.
pub fn validate_path_within_root(path: &Path, root: &Path) -> Result<PathBuf, PathValidationError> {
    let canonical_path = canonicalize_path(path)?;
    let canonical_root = canonicalize_path(root)?;

    if !canonical_path.starts_with(&canonical_root) {
        return Err(PathValidationError::OutsideRoot(
            canonical_path.to_string_lossy().to_string(),
            canonical_root.to_string_lossy().to_string(),
        ));
    }
    Ok(canonical_path)
}

/// Check that a symlink's target stays inside `root`.
///
/// Broken links fail with `CannotCanonicalize`.
pub fn is_safe_symlink(symlink_path: &Path, root: &Path) -> Result<bool, PathValidationError> {
    let target = std::fs::read_link(symlink_path).map_err(|_| {
        PathValidationError::CannotCanonicalize(symlink_path.to_string_lossy().to_string())
    })?;

    let resolved = if target.is_absolute() {
        target.clone()
    } else {
        symlink_path.parent().unwrap_or(symlink_path).join(&target)
    };

    match validate_path_within_root(&resolved, root) {
        Ok(_) => Ok(true),
        Err(PathValidationError::OutsideRoot(_, _)) => Err(PathValidationError::SymlinkEscape(
            symlink_path.to_string_lossy().to_string(),
            target.to_string_lossy().to_string(),
        )),
        Err(e) => Err(e),
    }
}
