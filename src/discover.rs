//! Source discovery.
//!
//! Finds the independent source trees of the base corpus, the extensions
//! under each `--mods` directory, base configuration files and reference
//! binaries. Every list is sorted so later id assignment is deterministic.

use globset::GlobSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::common::display_path;
use crate::diagnostics::{BuildDiagnostic, DiagnosticStage, SkipReason};
use crate::model::ExtensionRecord;
use crate::settings::DiscoverySettings;
use crate::validation::{is_safe_symlink, PathValidationError};

/// One C# file to parse.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path relative to the scanned root, forward slashes
    pub rel_path: String,
    /// Identifier of the source tree the file belongs to
    pub tree_id: String,
    /// Owning extension name, `None` for the base corpus
    pub extension: Option<String>,
}

/// A base-corpus source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTree {
    pub id: String,
    pub root: PathBuf,
}

/// A discovered extension with its inputs.
#[derive(Debug, Clone)]
pub struct ExtensionSource {
    pub record: ExtensionRecord,
    pub root: PathBuf,
    pub sources: Vec<SourceFile>,
    /// XML edit files under the extension's config directory
    pub config_files: Vec<PathBuf>,
}

impl ExtensionSource {
    pub fn tree_id(&self) -> String {
        extension_tree_id(&self.record.name)
    }
}

pub fn extension_tree_id(name: &str) -> String {
    format!("mod:{}", name)
}

/// Files found by walking one directory.
#[derive(Debug, Default)]
pub struct FileWalk {
    pub files: Vec<PathBuf>,
    pub diagnostics: Vec<BuildDiagnostic>,
}

/// Collect files under `dir` whose extension is one of `exts`.
///
/// Symlinks are not followed; a symlinked file is kept only when it points
/// back inside `dir`.
pub fn walk_files(dir: &Path, exts: &[&str], exclude: &GlobSet) -> FileWalk {
    let mut walk = FileWalk::default();
    let mut iter = walkdir::WalkDir::new(dir).follow_links(false).into_iter();
    loop {
        let entry = match iter.next() {
            None => break,
            Some(Ok(entry)) => entry,
            Some(Err(e)) => {
                let path = e.path().map(|p| display_path(p, dir)).unwrap_or_default();
                walk.diagnostics.push(BuildDiagnostic::error(
                    path,
                    DiagnosticStage::Discover,
                    e.to_string(),
                ));
                continue;
            }
        };
        let path = entry.path();
        let rel = display_path(path, dir);
        if !rel.is_empty() && exclude.is_match(&rel) {
            if entry.file_type().is_dir() {
                iter.skip_current_dir();
            } else if has_extension(path, exts) {
                walk.diagnostics
                    .push(BuildDiagnostic::skipped(rel, SkipReason::ExcludedByGlob));
            }
            continue;
        }
        if entry.file_type().is_dir() || !has_extension(path, exts) {
            continue;
        }
        if entry.path_is_symlink() {
            match is_safe_symlink(path, dir) {
                Ok(_) => {}
                Err(PathValidationError::SymlinkEscape(..)) => {
                    walk.diagnostics
                        .push(BuildDiagnostic::skipped(rel, SkipReason::OutsideRoot));
                    continue;
                }
                Err(e) => {
                    walk.diagnostics.push(BuildDiagnostic::error(
                        rel,
                        DiagnosticStage::Discover,
                        e.to_string(),
                    ));
                    continue;
                }
            }
        }
        walk.files.push(path.to_path_buf());
    }
    walk.files.sort();
    walk
}

fn has_extension(path: &Path, exts: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| exts.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

fn child_dirs(dir: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect()
        })
        .unwrap_or_default();
    dirs.sort();
    dirs
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "root".to_string())
}

fn contains_file_with_ext(dir: &Path, ext: &str, recursive: bool) -> bool {
    let max_depth = if recursive { usize::MAX } else { 1 };
    walkdir::WalkDir::new(dir)
        .max_depth(max_depth)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .any(|e| e.file_type().is_file() && has_extension(e.path(), &[ext]))
}

/// Source trees under `root`.
///
/// Every directory holding a `.csproj` is a tree; failing that, every
/// immediate child directory with `.cs` files; failing that, the root.
pub fn discover_trees(root: &Path, exclude: &GlobSet) -> Vec<SourceTree> {
    let mut project_dirs: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && has_extension(e.path(), &["csproj"]))
        .filter(|e| !exclude.is_match(display_path(e.path(), root)))
        .filter_map(|e| e.path().parent().map(Path::to_path_buf))
        .collect();
    project_dirs.sort();
    project_dirs.dedup();
    // A project nested inside another project's directory belongs to the outer tree
    let mut outer: Vec<PathBuf> = Vec::new();
    for dir in project_dirs {
        if !outer.iter().any(|o| dir.starts_with(o)) {
            outer.push(dir);
        }
    }
    if !outer.is_empty() {
        return outer
            .into_iter()
            .map(|dir| SourceTree {
                id: tree_id_for(&dir, root),
                root: dir,
            })
            .collect();
    }

    let children: Vec<SourceTree> = child_dirs(root)
        .into_iter()
        .filter(|d| !exclude.is_match(display_path(d, root)))
        .filter(|d| contains_file_with_ext(d, "cs", true))
        .map(|dir| SourceTree {
            id: dir_name(&dir),
            root: dir,
        })
        .collect();
    // Top-level files would be lost if only child trees were scanned
    if !children.is_empty() && !contains_file_with_ext(root, "cs", false) {
        return children;
    }
    vec![SourceTree {
        id: dir_name(root),
        root: root.to_path_buf(),
    }]
}

fn tree_id_for(dir: &Path, root: &Path) -> String {
    let rel = display_path(dir, root);
    if rel.is_empty() {
        dir_name(root)
    } else {
        rel
    }
}

/// C# files of one base tree, paths relative to `root`.
pub fn collect_tree_sources(tree: &SourceTree, root: &Path, exclude: &GlobSet) -> TreeSources {
    let walk = walk_files(&tree.root, &["cs"], exclude);
    let files = walk
        .files
        .into_iter()
        .map(|path| SourceFile {
            rel_path: display_path(&path, root),
            path,
            tree_id: tree.id.clone(),
            extension: None,
        })
        .collect();
    TreeSources {
        files,
        diagnostics: walk.diagnostics,
    }
}

/// Source files of one tree with their diagnostics.
#[derive(Debug, Default)]
pub struct TreeSources {
    pub files: Vec<SourceFile>,
    pub diagnostics: Vec<BuildDiagnostic>,
}

/// Manifest fields of an extension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub name: Option<String>,
    pub version: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
}

/// Parse a `ModInfo.xml` manifest.
///
/// Accepts the nested layout (`<xml><ModInfo><Name value="X"/></ModInfo></xml>`)
/// and the flat one (`<xml><Name value="X"/></xml>`). A field is taken from
/// its `value` attribute, else its text.
pub fn parse_manifest(content: &str) -> anyhow::Result<Manifest> {
    let doc = roxmltree::Document::parse(content)?;
    let root = doc.root_element();
    let scope = root
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name().eq_ignore_ascii_case("ModInfo"))
        .unwrap_or(root);

    let field = |names: &[&str]| -> Option<String> {
        names.iter().find_map(|name| {
            scope
                .children()
                .filter(|n| n.is_element())
                .find(|n| n.tag_name().name().eq_ignore_ascii_case(name))
                .and_then(|n| {
                    n.attribute("value")
                        .or_else(|| n.attribute("Value"))
                        .map(str::to_string)
                        .or_else(|| n.text().map(|t| t.trim().to_string()))
                })
                .filter(|v| !v.is_empty())
        })
    };

    Ok(Manifest {
        name: field(&["Name", "DisplayName"]),
        version: field(&["Version"]),
        author: field(&["Author"]),
        description: field(&["Description"]),
    })
}

/// Extensions under the given `--mods` directories.
///
/// Each immediate subdirectory is one extension. Duplicate names across
/// directories keep the first and get a discover diagnostic.
pub fn discover_extensions(
    mods_dirs: &[PathBuf],
    settings: &DiscoverySettings,
    exclude: &GlobSet,
) -> (Vec<ExtensionSource>, Vec<BuildDiagnostic>) {
    let mut extensions: Vec<ExtensionSource> = Vec::new();
    let mut diagnostics = Vec::new();

    for mods_dir in mods_dirs {
        for dir in child_dirs(mods_dir) {
            let rel_dir = display_path(&dir, mods_dir);
            let manifest_path = dir.join(&settings.manifest_name);
            let (manifest, has_manifest) = if manifest_path.is_file() {
                match std::fs::read_to_string(&manifest_path)
                    .map_err(anyhow::Error::from)
                    .and_then(|c| parse_manifest(&c))
                {
                    Ok(m) => (m, true),
                    Err(e) => {
                        warn!("Unreadable manifest {}: {}", manifest_path.display(), e);
                        diagnostics.push(BuildDiagnostic::degraded(
                            format!("{}/{}", rel_dir, settings.manifest_name),
                            DiagnosticStage::Discover,
                            format!("unreadable manifest: {}", e),
                        ));
                        (Manifest::default(), true)
                    }
                }
            } else {
                diagnostics.push(BuildDiagnostic::skipped(
                    format!("{}/{}", rel_dir, settings.manifest_name),
                    SkipReason::MissingManifest,
                ));
                (Manifest::default(), false)
            };

            let name = manifest.name.clone().unwrap_or_else(|| dir_name(&dir));
            if extensions.iter().any(|e| e.record.name == name) {
                diagnostics.push(BuildDiagnostic::error(
                    rel_dir,
                    DiagnosticStage::Discover,
                    format!("duplicate extension name '{}', keeping the first", name),
                ));
                continue;
            }

            let tree_id = extension_tree_id(&name);
            let code = walk_files(&dir, &["cs"], exclude);
            diagnostics.extend(code.diagnostics);
            let sources = code
                .files
                .into_iter()
                .map(|path| SourceFile {
                    rel_path: display_path(&path, mods_dir),
                    path,
                    tree_id: tree_id.clone(),
                    extension: Some(name.clone()),
                })
                .collect();

            let config_dir = dir.join(&settings.config_subdir);
            let config_files = if config_dir.is_dir() {
                let xml = walk_files(&config_dir, &["xml"], exclude);
                diagnostics.extend(xml.diagnostics);
                xml.files
            } else {
                Vec::new()
            };

            debug!("Extension '{}' at {}", name, dir.display());
            extensions.push(ExtensionSource {
                record: ExtensionRecord {
                    name,
                    path: dir.to_string_lossy().to_string(),
                    version: manifest.version,
                    author: manifest.author,
                    description: manifest.description,
                    has_manifest,
                },
                root: dir,
                sources,
                config_files,
            });
        }
    }
    (extensions, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::DiscoverySettings;
    use std::fs;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn exclude() -> GlobSet {
        DiscoverySettings::default().exclude_set().unwrap()
    }

    #[test]
    fn test_trees_from_csproj_directories() {
        let dir = TempDir::new().unwrap();
        write(&dir.path().join("Game/Game.csproj"), "<Project/>");
        write(&dir.path().join("Game/Player.cs"), "class Player {}");
        write(&dir.path().join("Engine/Engine.csproj"), "<Project/>");
        write(&dir.path().join("Engine/Sub/Sub.csproj"), "<Project/>");

        let trees = discover_trees(dir.path(), &exclude());
        let ids: Vec<_> = trees.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["Engine", "Game"]);
    }

    #[test]
    fn test_trees_fall_back_to_children_then_root() {
        let dir = TempDir::new().unwrap();
        write(&dir.path().join("A/X.cs"), "class X {}");
        write(&dir.path().join("B/Y.cs"), "class Y {}");
        write(&dir.path().join("Docs/readme.txt"), "");
        let trees = discover_trees(dir.path(), &exclude());
        assert_eq!(trees.len(), 2);

        let flat = TempDir::new().unwrap();
        write(&flat.path().join("Z.cs"), "class Z {}");
        let trees = discover_trees(flat.path(), &exclude());
        assert_eq!(trees.len(), 1);
        assert_eq!(trees[0].root, flat.path());
    }

    #[test]
    fn test_walk_files_sorted_and_excluded() {
        let dir = TempDir::new().unwrap();
        write(&dir.path().join("b.cs"), "");
        write(&dir.path().join("a.cs"), "");
        write(&dir.path().join("obj/Gen.cs"), "");
        write(&dir.path().join("notes.txt"), "");
        let walk = walk_files(dir.path(), &["cs"], &exclude());
        let names: Vec<_> = walk
            .files
            .iter()
            .map(|p| display_path(p, dir.path()))
            .collect();
        assert_eq!(names, vec!["a.cs", "b.cs"]);
    }

    #[test]
    fn test_parse_manifest_nested_and_flat() {
        let nested = r#"<?xml version="1.0"?>
<xml><ModInfo>
  <Name value="BetterBags"/>
  <Version value="1.2"/>
  <Author value="someone"/>
</ModInfo></xml>"#;
        let m = parse_manifest(nested).unwrap();
        assert_eq!(m.name.as_deref(), Some("BetterBags"));
        assert_eq!(m.version.as_deref(), Some("1.2"));

        let flat = r#"<xml><Name value="Flat"/><Description>Does things</Description></xml>"#;
        let m = parse_manifest(flat).unwrap();
        assert_eq!(m.name.as_deref(), Some("Flat"));
        assert_eq!(m.description.as_deref(), Some("Does things"));
        assert_eq!(m.author, None);
    }

    #[test]
    fn test_discover_extensions_with_and_without_manifest() {
        let mods = TempDir::new().unwrap();
        write(
            &mods.path().join("ModA/ModInfo.xml"),
            r#"<xml><Name value="Alpha"/></xml>"#,
        );
        write(&mods.path().join("ModA/Harmony/Patch.cs"), "class P {}");
        write(&mods.path().join("ModA/Config/items.xml"), "<configs/>");
        write(&mods.path().join("ModB/Code.cs"), "class Q {}");

        let settings = DiscoverySettings::default();
        let (exts, diags) =
            discover_extensions(&[mods.path().to_path_buf()], &settings, &exclude());
        assert_eq!(exts.len(), 2);
        assert_eq!(exts[0].record.name, "Alpha");
        assert_eq!(exts[0].sources.len(), 1);
        assert_eq!(exts[0].sources[0].rel_path, "ModA/Harmony/Patch.cs");
        assert_eq!(exts[0].sources[0].tree_id, "mod:Alpha");
        assert_eq!(exts[0].config_files.len(), 1);
        assert_eq!(exts[1].record.name, "ModB");
        assert!(!exts[1].record.has_manifest);
        assert!(diags
            .iter()
            .any(|d| matches!(d, BuildDiagnostic::Skipped { reason: SkipReason::MissingManifest, .. })));
    }
}
