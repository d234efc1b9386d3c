//! XML configuration: base definitions, extension edits and the code that
//! reads configured properties.

pub mod access;
pub mod definitions;
pub mod edits;

use std::collections::BTreeMap;

pub use access::extract_file as extract_property_accesses;
pub use definitions::{index_config_dir, index_config_file, ConfigIndex};
pub use edits::{parse_edit_file, read_extension_edits};

/// Root element of every known base configuration file.
#[derive(Debug, Clone, Default)]
pub struct BaseCatalog {
    roots: BTreeMap<String, String>,
}

impl BaseCatalog {
    pub fn insert(&mut self, file: &str, root: &str) {
        self.roots.insert(file.to_ascii_lowercase(), root.to_string());
    }

    pub fn root_of(&self, file: &str) -> Option<&str> {
        self.roots.get(&file.to_ascii_lowercase()).map(String::as_str)
    }

    /// Base file whose root element is `root`, first by file name.
    pub fn file_with_root(&self, root: &str) -> Option<&str> {
        self.roots
            .iter()
            .find(|(_, r)| r.as_str() == root)
            .map(|(f, _)| f.as_str())
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

pub(crate) fn parse_xml(content: &str) -> Result<roxmltree::Document<'_>, roxmltree::Error> {
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    };
    roxmltree::Document::parse_with_options(content.trim_start_matches('\u{feff}'), options)
}

pub(crate) fn line_of(doc: &roxmltree::Document<'_>, node: roxmltree::Node<'_, '_>) -> usize {
    doc.text_pos_at(node.range().start).row as usize
}

/// Canonical spelling of an XPath.
///
/// Whitespace outside literals is dropped, quotes become `'`, a trailing
/// `/` goes, and a leading `//step` becomes `/root/step` when the root
/// element of the target file is known.
pub fn normalize_path(raw: &str, root: Option<&str>) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut quote: Option<char> = None;
    for c in raw.chars() {
        match quote {
            Some(q) if c == q => {
                out.push('\'');
                quote = None;
            }
            Some(_) => out.push(c),
            None if c == '\'' || c == '"' => {
                out.push('\'');
                quote = Some(c);
            }
            None if c.is_whitespace() => {}
            None => out.push(c),
        }
    }
    while out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    if let (Some(rest), Some(root)) = (out.strip_prefix("//"), root) {
        let first = first_step_of(rest);
        // `//configs/...` already names the root
        if first != root {
            return format!("/{}/{}", root, rest);
        }
        return format!("/{}", rest);
    }
    out
}

fn first_step_of(path: &str) -> &str {
    let end = path.find(['/', '[']).unwrap_or(path.len());
    &path[..end]
}

/// First step of an absolute path (`/items/item` -> `items`); `None` for `//x`.
pub fn first_step(path: &str) -> Option<&str> {
    if path.starts_with("//") {
        return None;
    }
    let rest = path.strip_prefix('/')?;
    Some(first_step_of(rest)).filter(|s| !s.is_empty())
}

/// Property named by a path: the last `[@name='X']` predicate, else a
/// trailing `@attr` step.
pub fn property_name_of(path: &str) -> Option<String> {
    const PREDICATE: &str = "[@name='";
    if let Some(at) = path.rfind(PREDICATE) {
        let rest = &path[at + PREDICATE.len()..];
        if let Some(end) = rest.find('\'') {
            return Some(rest[..end].to_string());
        }
    }
    let last = path.rsplit('/').next()?;
    last.strip_prefix('@')
        .filter(|a| !a.is_empty())
        .map(str::to_string)
}
