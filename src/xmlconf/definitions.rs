//! Index of the base configuration files.
//!
//! Every element gets a synthetic path address. Steps carry `[@name='x']`
//! when the element has a name, else `[@id='x']`, else a 1-based position
//! among same-named siblings.

use std::path::Path;

use globset::GlobSet;
use roxmltree::Node;

use super::{line_of, parse_xml, BaseCatalog};
use crate::common::display_path;
use crate::diagnostics::{BuildDiagnostic, DiagnosticStage, SkipReason};
use crate::discover::walk_files;
use crate::model::ConfigDefinition;

/// Definitions of one base configuration directory.
#[derive(Debug, Default)]
pub struct ConfigIndex {
    pub definitions: Vec<ConfigDefinition>,
    pub catalog: BaseCatalog,
    pub diagnostics: Vec<BuildDiagnostic>,
}

/// Index every XML file under `dir`.
pub fn index_config_dir(dir: &Path, exclude: &GlobSet) -> ConfigIndex {
    let mut index = ConfigIndex::default();
    let walk = walk_files(dir, &["xml"], exclude);
    index.diagnostics.extend(walk.diagnostics);
    for path in walk.files {
        let rel = display_path(&path, dir).to_ascii_lowercase();
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                index.diagnostics.push(BuildDiagnostic::error(
                    rel,
                    DiagnosticStage::Read,
                    e.to_string(),
                ));
                continue;
            }
        };
        let Ok(content) = String::from_utf8(bytes) else {
            index
                .diagnostics
                .push(BuildDiagnostic::skipped(rel, SkipReason::NotText));
            continue;
        };
        match index_config_file(&rel, &content) {
            Ok((root, definitions)) => {
                tracing::debug!("{}: {} definitions", rel, definitions.len());
                index.catalog.insert(&rel, &root);
                index.definitions.extend(definitions);
            }
            Err(e) => index.diagnostics.push(BuildDiagnostic::error(
                rel,
                DiagnosticStage::ConfigDefinition,
                e.to_string(),
            )),
        }
    }
    index
}

/// Definitions of one file plus its root element name.
pub fn index_config_file(
    file: &str,
    content: &str,
) -> Result<(String, Vec<ConfigDefinition>), roxmltree::Error> {
    let doc = parse_xml(content)?;
    let root = doc.root_element();
    let mut out = Vec::new();
    let root_path = format!("/{}", root.tag_name().name());
    visit(&doc, root, &root_path, file, &mut out);
    Ok((root.tag_name().name().to_string(), out))
}

fn visit(
    doc: &roxmltree::Document<'_>,
    node: Node<'_, '_>,
    path: &str,
    file: &str,
    out: &mut Vec<ConfigDefinition>,
) {
    let tag = node.tag_name().name();
    let line = line_of(doc, node);
    let is_property = tag == "property";
    let owner = if is_property {
        node.parent_element().unwrap_or(node)
    } else {
        node
    };
    let declaring_class = declaring_class(owner);

    out.push(ConfigDefinition {
        file: file.to_string(),
        path: path.to_string(),
        element: tag.to_string(),
        property_name: is_property
            .then(|| node.attribute("name").map(str::to_string))
            .flatten(),
        value: is_property
            .then(|| node.attribute("value").map(str::to_string))
            .flatten(),
        declaring_class: declaring_class.clone(),
        line,
    });

    let addressed_by = address_attribute(node);
    for attr in node.attributes() {
        let name = attr.name();
        if Some(name) == addressed_by || (is_property && name == "value") {
            continue;
        }
        out.push(ConfigDefinition {
            file: file.to_string(),
            path: format!("{}/@{}", path, name),
            element: tag.to_string(),
            property_name: Some(name.to_string()),
            value: Some(attr.value().to_string()),
            declaring_class: declaring_class.clone(),
            line,
        });
    }

    let children: Vec<Node<'_, '_>> = node.children().filter(|c| c.is_element()).collect();
    for child in &children {
        let step = step_for(*child, &children);
        visit(doc, *child, &format!("{}/{}", path, step), file, out);
    }
}

fn address_attribute<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    if node.has_attribute("name") {
        Some("name")
    } else if node.has_attribute("id") {
        Some("id")
    } else {
        None
    }
}

fn step_for(node: Node<'_, '_>, siblings: &[Node<'_, '_>]) -> String {
    let tag = node.tag_name().name();
    if let Some(attr) = address_attribute(node) {
        return format!("{}[@{}='{}']", tag, attr, node.attribute(attr).unwrap_or_default());
    }
    let position = siblings
        .iter()
        .filter(|s| s.tag_name().name() == tag)
        .position(|s| *s == node)
        .unwrap_or(0);
    format!("{}[{}]", tag, position + 1)
}

/// `class="X"` on the element, else a `<property name="Class" value="X"/>` child.
fn declaring_class(owner: Node<'_, '_>) -> Option<String> {
    owner.attribute("class").map(str::to_string).or_else(|| {
        owner
            .children()
            .filter(|c| c.is_element() && c.tag_name().name() == "property")
            .find(|c| c.attribute("name") == Some("Class"))
            .and_then(|c| c.attribute("value"))
            .map(str::to_string)
    })
}
