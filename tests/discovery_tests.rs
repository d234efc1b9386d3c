//! Integration tests for input discovery during a build.
//!
//! Symlinks leaving a source tree, excluded build output and extensions
//! without a manifest are skipped or degraded, never fatal.

use modscope::{build, BuildDiagnostic, BuildOptions, SkipReason, Store};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn skipped<'a>(diagnostics: &'a [BuildDiagnostic], reason: SkipReason) -> Vec<&'a str> {
    diagnostics
        .iter()
        .filter(|d| matches!(d, BuildDiagnostic::Skipped { reason: r, .. } if *r == reason))
        .map(|d| d.path())
        .collect()
}

// =========================================================================
// Symlinks
// =========================================================================

#[test]
#[cfg(unix)]
fn test_symlink_outside_tree_is_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("game");
    write(&root.join("Game/Player.cs"), "class Player { void Tick() {} }");

    let outside_dir = TempDir::new().unwrap();
    let outside = outside_dir.path().join("Secret.cs");
    write(&outside, "class Secret { void Leak() {} }");
    std::os::unix::fs::symlink(&outside, root.join("Game/Secret.cs")).unwrap();

    let db = temp_dir.path().join("modscope.db");
    let report = build(&BuildOptions::new(&root, &db)).unwrap();

    assert_eq!(report.summary.types, 1);
    assert_eq!(skipped(&report.diagnostics, SkipReason::OutsideRoot), vec!["Secret.cs"]);
    let store = Store::open(&db).unwrap();
    assert!(store.find_methods("Secret.Leak").is_err());
}

#[test]
#[cfg(unix)]
fn test_symlink_inside_tree_is_read() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("game");
    write(&root.join("Game/Real/Player.cs"), "class Player { void Tick() {} }");
    std::os::unix::fs::symlink(
        root.join("Game/Real/Player.cs"),
        root.join("Game/Alias.cs"),
    )
    .unwrap();

    let db = temp_dir.path().join("modscope.db");
    let report = build(&BuildOptions::new(&root, &db)).unwrap();
    assert!(skipped(&report.diagnostics, SkipReason::OutsideRoot).is_empty());
    assert_eq!(report.summary.source_files, 2);
}

// =========================================================================
// Excludes and manifests
// =========================================================================

#[test]
fn test_build_output_is_excluded() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("game");
    write(&root.join("Game/Player.cs"), "class Player {}");
    write(&root.join("Game/obj/Generated.cs"), "class Generated {}");

    let db = temp_dir.path().join("modscope.db");
    let report = build(&BuildOptions::new(&root, &db)).unwrap();

    assert_eq!(report.summary.types, 1);
    assert_eq!(
        skipped(&report.diagnostics, SkipReason::ExcludedByGlob).len(),
        1
    );
}

#[test]
fn test_extension_without_manifest_uses_directory_name() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("game");
    write(&root.join("Game/Player.cs"), "class Player {}");
    let mods = temp_dir.path().join("mods");
    write(&mods.join("BareMod/Code.cs"), "class BareHelper {}");
    write(
        &mods.join("Named/ModInfo.xml"),
        "<xml><Name value=\"Fancy Name\"/><Author value=\"someone\"/></xml>",
    );

    let db = temp_dir.path().join("modscope.db");
    let mut options = BuildOptions::new(&root, &db);
    options.mods_dirs = vec![mods];
    let report = build(&options).unwrap();

    assert_eq!(
        skipped(&report.diagnostics, SkipReason::MissingManifest),
        vec!["BareMod/ModInfo.xml"]
    );
    let store = Store::open(&db).unwrap();
    let summary = store.summary().unwrap();
    assert_eq!(summary.extensions, vec!["BareMod", "Fancy Name"]);
}
