//! Path-addressed edits an extension applies to base configuration files.

use std::path::Path;

use roxmltree::Node;

use super::{first_step, line_of, normalize_path, parse_xml, property_name_of, BaseCatalog};
use crate::common::display_path;
use crate::diagnostics::{BuildDiagnostic, DiagnosticStage, SkipReason};
use crate::discover::ExtensionSource;
use crate::model::{ConfigEdit, ConfigOp};

/// Elements that only wrap other edits.
const WRAPPERS: &[&str] = &["conditional", "if", "configs", "config"];

/// Read every edit file of one extension.
pub fn read_extension_edits(
    extension: &ExtensionSource,
    catalog: &BaseCatalog,
) -> (Vec<ConfigEdit>, Vec<BuildDiagnostic>) {
    let mut edits = Vec::new();
    let mut diagnostics = Vec::new();
    for path in &extension.config_files {
        let rel = display_path(path, &extension.root);
        let content = match std::fs::read(path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(c) => c,
                Err(_) => {
                    diagnostics.push(BuildDiagnostic::skipped(rel, SkipReason::NotText));
                    continue;
                }
            },
            Err(e) => {
                diagnostics.push(BuildDiagnostic::error(rel, DiagnosticStage::Read, e.to_string()));
                continue;
            }
        };
        let target = file_name(path);
        match parse_edit_file(&extension.record.name, &rel, &target, &content, catalog) {
            Ok((found, warnings)) => {
                edits.extend(found);
                diagnostics.extend(warnings);
            }
            Err(e) => diagnostics.push(BuildDiagnostic::error(
                rel,
                DiagnosticStage::ConfigEdit,
                e.to_string(),
            )),
        }
    }
    (edits, diagnostics)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Parse one edit file.
///
/// `target_file` is the lower-cased file name the edits apply to unless the
/// path's first step names the root element of another known base file.
/// Elements that look like edits but cannot be read become degraded
/// diagnostics.
pub fn parse_edit_file(
    extension: &str,
    rel_file: &str,
    target_file: &str,
    content: &str,
    catalog: &BaseCatalog,
) -> Result<(Vec<ConfigEdit>, Vec<BuildDiagnostic>), roxmltree::Error> {
    let doc = parse_xml(content)?;
    let mut reader = EditReader {
        doc: &doc,
        content,
        extension,
        rel_file,
        target_file,
        catalog,
        edits: Vec::new(),
        diagnostics: Vec::new(),
    };
    reader.visit(doc.root_element());
    Ok((reader.edits, reader.diagnostics))
}

struct EditReader<'a, 'input> {
    doc: &'a roxmltree::Document<'input>,
    content: &'a str,
    extension: &'a str,
    rel_file: &'a str,
    target_file: &'a str,
    catalog: &'a BaseCatalog,
    edits: Vec<ConfigEdit>,
    diagnostics: Vec<BuildDiagnostic>,
}

impl EditReader<'_, '_> {
    fn visit(&mut self, node: Node<'_, '_>) {
        let tag = node.tag_name().name().to_ascii_lowercase();
        if WRAPPERS.contains(&tag.as_str()) {
            for child in node.children().filter(|c| c.is_element()) {
                self.visit(child);
            }
            return;
        }
        let Some(xpath) = node.attribute("xpath") else {
            if edit_op(&tag, node).is_some() {
                self.degraded(node, format!("<{}> without an xpath", tag));
            }
            return;
        };
        let Some((op, attribute)) = edit_op(&tag, node) else {
            self.degraded(node, format!("unrecognized edit <{}>", tag));
            return;
        };

        let target_file = self.target_for(xpath);
        let mut path = normalize_path(xpath, self.catalog.root_of(&target_file));
        if let Some(attr) = attribute {
            path = format!("{}/@{}", path, attr);
        }
        let value = match op {
            ConfigOp::Remove => None,
            _ => self.inner_value(node),
        };
        self.edits.push(ConfigEdit {
            extension: self.extension.to_string(),
            target_file,
            raw_path: xpath.to_string(),
            property_name: property_name_of(&path),
            path,
            op,
            value,
            file: self.rel_file.to_string(),
            line: line_of(self.doc, node),
        });
    }

    /// File name, corrected when the path's first step is another file's root.
    fn target_for(&self, xpath: &str) -> String {
        let normalized = normalize_path(xpath, None);
        if let Some(step) = first_step(&normalized) {
            if self.catalog.root_of(self.target_file) != Some(step) {
                if let Some(file) = self.catalog.file_with_root(step) {
                    return file.to_string();
                }
            }
        }
        self.target_file.to_string()
    }

    /// Text of a `<set>` or the markup appended by `<append>`, trimmed.
    fn inner_value(&self, node: Node<'_, '_>) -> Option<String> {
        let first = node.first_child()?;
        let last = node.last_child()?;
        let raw = self.content.get(first.range().start..last.range().end)?;
        let value = if node.children().any(|c| c.is_element()) {
            raw.trim().to_string()
        } else {
            node.text().unwrap_or(raw).trim().to_string()
        };
        (!value.is_empty()).then_some(value)
    }

    fn degraded(&mut self, node: Node<'_, '_>, message: String) {
        self.diagnostics.push(BuildDiagnostic::degraded(
            self.rel_file,
            DiagnosticStage::ConfigEdit,
            format!("line {}: {}", line_of(self.doc, node), message),
        ));
    }
}

/// Operation of an edit element, plus the attribute it addresses.
fn edit_op<'a>(tag: &str, node: Node<'a, '_>) -> Option<(ConfigOp, Option<&'a str>)> {
    let op = match tag {
        "set" => ConfigOp::Set,
        "append" => ConfigOp::Append,
        "remove" => ConfigOp::Remove,
        "insertbefore" => ConfigOp::InsertBefore,
        "insertafter" => ConfigOp::InsertAfter,
        "setattribute" => return Some((ConfigOp::Set, node.attribute("name"))),
        "removeattribute" => return Some((ConfigOp::Remove, node.attribute("name"))),
        "csv" => match node.attribute("op").map(str::to_ascii_lowercase).as_deref() {
            Some("add") => ConfigOp::Append,
            Some("remove") => ConfigOp::Remove,
            _ => return None,
        },
        _ => return None,
    };
    Some((op, None))
}
