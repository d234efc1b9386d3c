//! Common helpers shared across the pipeline and command modules.

use sha2::{Digest, Sha256};
use std::path::Path;

/// Safely extract a UTF-8 string slice with bounds checking
///
/// Returns None if the slice range is invalid, exceeds source length,
/// or splits a multi-byte character.
pub fn safe_str_slice(source: &str, start: usize, end: usize) -> Option<&str> {
    if start <= end && end <= source.len() {
        source.get(start..end)
    } else {
        None
    }
}

/// Path of `path` relative to `base`, with forward slashes.
///
/// Falls back to the full path when `path` is not under `base`.
pub fn display_path(path: &Path, base: &Path) -> String {
    let rel = path.strip_prefix(base).unwrap_or(path);
    rel.to_string_lossy().replace('\\', "/")
}

/// Lower-case hex SHA-256 of the content.
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Number of lines, counting a final unterminated line.
pub fn line_count(content: &str) -> usize {
    if content.is_empty() {
        0
    } else {
        content.lines().count()
    }
}

/// Truncate text for one-line human output.
pub fn truncate_for_display(s: &str, max_chars: usize) -> String {
    let single: String = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if single.chars().count() <= max_chars {
        single
    } else {
        let cut: String = single.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_safe_str_slice_bounds() {
        let s = "héllo";
        assert_eq!(safe_str_slice(s, 0, 1), Some("h"));
        assert_eq!(safe_str_slice(s, 1, 2), None); // splits 'é'
        assert_eq!(safe_str_slice(s, 3, 100), None);
        assert_eq!(safe_str_slice(s, 4, 2), None);
    }

    #[test]
    fn test_display_path_is_relative_with_forward_slashes() {
        let base = PathBuf::from("/work/src");
        let path = base.join("Game").join("Player.cs");
        assert_eq!(display_path(&path, &base), "Game/Player.cs");
        assert_eq!(display_path(Path::new("/other/x.cs"), &base), "/other/x.cs");
    }

    #[test]
    fn test_sha256_hex_is_stable() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_line_count_and_truncate() {
        assert_eq!(line_count(""), 0);
        assert_eq!(line_count("a\nb"), 2);
        assert_eq!(line_count("a\nb\n"), 2);
        assert_eq!(truncate_for_display("a   b\n c", 10), "a b c");
        assert_eq!(truncate_for_display("abcdefghijkl", 8), "abcde...");
    }
}
