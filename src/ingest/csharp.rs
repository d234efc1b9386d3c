//! C# syntax helpers over tree-sitter-c-sharp nodes.
//!
//! Field names moved between grammar releases (`type` became `returns` on
//! methods, `equals_value_clause` disappeared from declarators), so lookups
//! here accept every spelling and fall back to node kinds.

use tree_sitter::Node;

use crate::model::types::normalize_type;
use crate::model::Parameter;

/// Source text of a node; empty if the range is not a valid UTF-8 slice.
pub fn text<'s>(node: Node<'_>, src: &'s str) -> &'s str {
    crate::common::safe_str_slice(src, node.start_byte(), node.end_byte()).unwrap_or("")
}

/// 1-based line of the node start.
pub fn line(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

pub fn end_line(node: Node<'_>) -> usize {
    node.end_position().row + 1
}

/// First child found under any of the given field names.
pub fn field<'t>(node: Node<'t>, names: &[&str]) -> Option<Node<'t>> {
    names.iter().find_map(|n| node.child_by_field_name(n))
}

pub fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

pub fn children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

pub fn child_of_kind<'t>(node: Node<'t>, kinds: &[&str]) -> Option<Node<'t>> {
    named_children(node)
        .into_iter()
        .find(|c| kinds.contains(&c.kind()))
}

/// Whether `node` is the child stored under `field_name` of its parent.
pub fn is_field_of_parent(node: Node<'_>, field_name: &str) -> bool {
    node.parent()
        .and_then(|p| p.child_by_field_name(field_name))
        .is_some_and(|c| c.id() == node.id())
}

const MODIFIER_WORDS: &[&str] = &[
    "public", "private", "protected", "internal", "static", "abstract", "sealed", "virtual",
    "override", "partial", "readonly", "const", "extern", "async", "unsafe", "new", "volatile",
    "required", "file",
];

/// Modifier keywords of a declaration (`public`, `static`, ...).
pub fn modifiers<'s>(node: Node<'_>, src: &'s str) -> Vec<&'s str> {
    let mut out = Vec::new();
    for child in children(node) {
        match child.kind() {
            "modifier" => out.push(text(child, src).trim()),
            k if !child.is_named() && MODIFIER_WORDS.contains(&k) => out.push(text(child, src)),
            _ => {}
        }
    }
    out
}

pub fn name_of(node: Node<'_>, src: &str) -> Option<String> {
    let name = field(node, &["name"])?;
    let t = text(name, src).trim();
    if t.is_empty() {
        None
    } else {
        Some(t.trim_start_matches('@').to_string())
    }
}

pub fn type_param_count(node: Node<'_>) -> usize {
    field(node, &["type_parameters"])
        .or_else(|| child_of_kind(node, &["type_parameter_list"]))
        .map(|list| {
            named_children(list)
                .iter()
                .filter(|c| c.kind() == "type_parameter")
                .count()
        })
        .unwrap_or(0)
}

/// Written base types of a type declaration, normalized, in order.
pub fn base_list(node: Node<'_>, src: &str) -> Vec<String> {
    let Some(list) = field(node, &["bases"]).or_else(|| child_of_kind(node, &["base_list"])) else {
        return Vec::new();
    };
    named_children(list)
        .into_iter()
        .filter(|c| c.kind() != "argument_list")
        .map(|c| {
            // Primary-constructor bases carry arguments: `Base(x)`
            let t = text(c, src);
            let t = t.split('(').next().unwrap_or(t);
            normalize_type(t)
        })
        .filter(|t| !t.is_empty())
        .collect()
}

/// Body node of a method, accessor, constructor or local function.
pub fn body<'t>(decl: Node<'t>) -> Option<Node<'t>> {
    field(decl, &["body"]).or_else(|| child_of_kind(decl, &["block", "arrow_expression_clause"]))
}

/// Return type text of a method-like declaration, normalized.
pub fn return_type(decl: Node<'_>, src: &str) -> String {
    field(decl, &["returns", "type"])
        .map(|t| normalize_type(text(t, src)))
        .unwrap_or_else(|| "void".to_string())
}

/// Parameters of a declaration that has a parameter list.
pub fn parameters(decl: Node<'_>, src: &str) -> Vec<Parameter> {
    let Some(list) = field(decl, &["parameters"])
        .or_else(|| child_of_kind(decl, &["parameter_list", "bracketed_parameter_list"]))
    else {
        return Vec::new();
    };
    named_children(list)
        .into_iter()
        .filter(|p| matches!(p.kind(), "parameter" | "parameter_array"))
        .map(|p| parameter(p, src))
        .collect()
}

fn parameter(node: Node<'_>, src: &str) -> Parameter {
    let type_node = field(node, &["type"]).or_else(|| {
        named_children(node).into_iter().find(|c| {
            matches!(
                c.kind(),
                "array_type" | "nullable_type" | "predefined_type" | "generic_name" | "qualified_name"
            )
        })
    });
    let name = field(node, &["name"])
        .or_else(|| {
            named_children(node)
                .into_iter()
                .rev()
                .find(|c| c.kind() == "identifier")
        })
        .map(|n| text(n, src).trim_start_matches('@').to_string())
        .unwrap_or_default();

    // Modifier words appear before the type node
    let type_start = type_node.map(|t| t.start_byte()).unwrap_or(usize::MAX);
    let mut words: Vec<&str> = Vec::new();
    for child in children(node) {
        if child.start_byte() >= type_start {
            break;
        }
        if child.kind() == "attribute_list" {
            continue;
        }
        words.extend(text(child, src).split_whitespace());
    }
    let has_default = children(node)
        .iter()
        .any(|c| c.kind() == "equals_value_clause" || (!c.is_named() && c.kind() == "="));

    Parameter {
        name,
        type_name: type_node
            .map(|t| normalize_type(text(t, src)))
            .unwrap_or_else(|| "?".to_string()),
        has_default,
        is_params: node.kind() == "parameter_array" || words.contains(&"params"),
        is_this: words.contains(&"this"),
    }
}

/// One argument of a call or attribute: optional `name:` plus the expression.
#[derive(Debug, Clone, Copy)]
pub struct Argument<'t> {
    pub expr: Node<'t>,
    pub name_node: Option<Node<'t>>,
}

impl<'t> Argument<'t> {
    pub fn name<'s>(&self, src: &'s str) -> Option<&'s str> {
        self.name_node.map(|n| {
            let t = text(n, src);
            t.trim_end_matches([':', '=']).trim()
        })
    }
}

const ARG_NAME_KINDS: &[&str] = &["name_colon", "name_equals"];

fn argument(node: Node<'_>) -> Option<Argument<'_>> {
    let name_node = child_of_kind(node, ARG_NAME_KINDS);
    let expr = named_children(node)
        .into_iter()
        .rev()
        .find(|c| !ARG_NAME_KINDS.contains(&c.kind()))?;
    Some(Argument { expr, name_node })
}

/// Arguments of an `argument_list`, `bracketed_argument_list` or `attribute_argument_list`.
pub fn arguments(list: Node<'_>) -> Vec<Argument<'_>> {
    named_children(list)
        .into_iter()
        .filter(|c| matches!(c.kind(), "argument" | "attribute_argument"))
        .filter_map(argument)
        .collect()
}

/// Arguments of an invocation or object creation.
pub fn call_arguments(call: Node<'_>) -> Vec<Argument<'_>> {
    field(call, &["arguments"])
        .or_else(|| child_of_kind(call, &["argument_list"]))
        .map(arguments)
        .unwrap_or_default()
}

/// A `[Name(args)]` attribute with its normalized name.
#[derive(Debug, Clone)]
pub struct Attribute<'t> {
    pub name: String,
    pub node: Node<'t>,
    pub args: Vec<Argument<'t>>,
}

/// `HarmonyLib.HarmonyPatchAttribute` -> `HarmonyPatch`
pub fn normalize_attribute_name(raw: &str) -> String {
    let last = raw.rsplit(['.', ':']).next().unwrap_or(raw).trim();
    let last = last.split('<').next().unwrap_or(last);
    last.strip_suffix("Attribute")
        .filter(|s| !s.is_empty())
        .unwrap_or(last)
        .to_string()
}

/// Attributes attached directly to a declaration, in source order.
pub fn attributes<'t>(decl: Node<'t>, src: &str) -> Vec<Attribute<'t>> {
    let mut out = Vec::new();
    for list in named_children(decl).into_iter().filter(|c| c.kind() == "attribute_list") {
        for attr in named_children(list).into_iter().filter(|c| c.kind() == "attribute") {
            let Some(name) = field(attr, &["name"]).or_else(|| attr.named_child(0)) else {
                continue;
            };
            let args = child_of_kind(attr, &["attribute_argument_list"])
                .map(arguments)
                .unwrap_or_default();
            out.push(Attribute {
                name: normalize_attribute_name(text(name, src)),
                node: attr,
                args,
            });
        }
    }
    out
}

/// Strip parentheses around an expression.
pub fn unwrap_parens(mut node: Node<'_>) -> Node<'_> {
    while node.kind() == "parenthesized_expression" {
        match node.named_child(0) {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}

/// Literal content of a constant string expression.
///
/// Accepts regular, verbatim and raw literals plus interpolated strings
/// without holes. Anything else yields `None`.
pub fn string_value(node: Node<'_>, src: &str) -> Option<String> {
    let node = unwrap_parens(node);
    match node.kind() {
        "string_literal" | "verbatim_string_literal" | "raw_string_literal" => {
            Some(unquote(text(node, src)))
        }
        "interpolated_string_expression" => {
            let has_holes = named_children(node)
                .iter()
                .any(|c| c.kind() == "interpolation");
            if has_holes {
                None
            } else {
                Some(unquote(text(node, src)))
            }
        }
        _ => None,
    }
}

/// Remove quotes, prefixes and escapes from a string literal token.
pub fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    let prefix_len = raw.find('"').unwrap_or(0);
    let prefix = &raw[..prefix_len];
    let body = &raw[prefix_len..];
    let verbatim = prefix.contains('@');
    let interpolated = prefix.contains('$');

    if body.starts_with("\"\"\"") {
        return body.trim_matches('"').trim().to_string();
    }
    let inner = body
        .strip_prefix('"')
        .map(|b| b.strip_suffix('"').unwrap_or(b))
        .unwrap_or(body);
    let mut s = if verbatim {
        inner.replace("\"\"", "\"")
    } else {
        unescape(inner)
    };
    if interpolated {
        s = s.replace("{{", "{").replace("}}", "}");
    }
    s
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Declared names and initializers of a `variable_declaration`.
pub fn variable_declarators<'t>(var_decl: Node<'t>, src: &str) -> Vec<(String, Option<Node<'t>>)> {
    named_children(var_decl)
        .into_iter()
        .filter(|c| c.kind() == "variable_declarator")
        .filter_map(|d| {
            let name = field(d, &["name"])
                .or_else(|| child_of_kind(d, &["identifier"]))
                .map(|n| text(n, src).trim_start_matches('@').to_string())?;
            Some((name, declarator_initializer(d)))
        })
        .collect()
}

fn declarator_initializer(declarator: Node<'_>) -> Option<Node<'_>> {
    let kids = children(declarator);
    for (i, child) in kids.iter().enumerate() {
        if child.kind() == "equals_value_clause" {
            return child.named_child(0);
        }
        if !child.is_named() && child.kind() == "=" {
            return kids[i + 1..].iter().find(|c| c.is_named()).copied();
        }
    }
    None
}

/// Declared type of a `variable_declaration` (`var` stays `var`).
pub fn declared_type(var_decl: Node<'_>, src: &str) -> String {
    field(var_decl, &["type"])
        .map(|t| normalize_type(text(t, src)))
        .unwrap_or_else(|| "var".to_string())
}

/// The operator of an assignment (`=`, `+=`, `-=`, ...).
pub fn assignment_operator<'s>(node: Node<'_>, src: &'s str) -> Option<&'s str> {
    if let Some(op) = field(node, &["operator"]) {
        return Some(text(op, src).trim());
    }
    let left = field(node, &["left"])?;
    let right = field(node, &["right"])?;
    crate::common::safe_str_slice(src, left.end_byte(), right.start_byte()).map(str::trim)
}

/// Simple member name of an expression: `a.b.C` -> `C`, `C<T>` -> `C`.
pub fn member_name(node: Node<'_>, src: &str) -> Option<String> {
    let node = unwrap_parens(node);
    match node.kind() {
        "identifier" => Some(text(node, src).trim_start_matches('@').to_string()),
        "generic_name" => field(node, &["name"])
            .or_else(|| child_of_kind(node, &["identifier"]))
            .map(|n| text(n, src).to_string()),
        "member_access_expression" | "member_binding_expression" => {
            field(node, &["name"]).and_then(|n| member_name(n, src))
        }
        "qualified_name" => field(node, &["name"])
            .or_else(|| named_children(node).into_iter().last())
            .and_then(|n| member_name(n, src)),
        _ => None,
    }
}

/// Number of explicit type arguments on a (possibly qualified) generic name.
pub fn type_arg_count(node: Node<'_>) -> usize {
    let node = match node.kind() {
        "member_access_expression" | "member_binding_expression" => {
            match field(node, &["name"]) {
                Some(n) => n,
                None => return 0,
            }
        }
        _ => node,
    };
    if node.kind() != "generic_name" {
        return 0;
    }
    child_of_kind(node, &["type_argument_list"])
        .map(|l| named_children(l).len())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::pool::parse_csharp;

    fn find<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
        if node.kind() == kind {
            return Some(node);
        }
        named_children(node).into_iter().find_map(|c| find(c, kind))
    }

    #[test]
    fn test_unquote_variants() {
        assert_eq!(unquote("\"Magazine\""), "Magazine");
        assert_eq!(unquote("@\"C:\\path\"\"x\"\"\""), "C:\\path\"x\"");
        assert_eq!(unquote("$\"Name{{1}}\""), "Name{1}");
        assert_eq!(unquote("\"a\\\"b\""), "a\"b");
        assert_eq!(unquote("\"\"\"raw\"\"\""), "raw");
    }

    #[test]
    fn test_normalize_attribute_name() {
        assert_eq!(normalize_attribute_name("HarmonyLib.HarmonyPatchAttribute"), "HarmonyPatch");
        assert_eq!(normalize_attribute_name("HarmonyPrefix"), "HarmonyPrefix");
        assert_eq!(normalize_attribute_name("Attribute"), "Attribute");
    }

    #[test]
    fn test_parameters_with_modifiers_and_defaults() {
        let src = "static class X { static void M(this Foo f, ref int a, string s = \"x\", params object[] rest) {} }";
        let tree = parse_csharp(src).unwrap().unwrap();
        let method = find(tree.root_node(), "method_declaration").unwrap();
        let params = parameters(method, src);
        assert_eq!(params.len(), 4);
        assert!(params[0].is_this);
        assert_eq!(params[0].type_name, "Foo");
        assert_eq!(params[1].type_name, "int");
        assert_eq!(params[1].name, "a");
        assert!(params[2].has_default);
        assert!(params[3].is_params);
        assert_eq!(params[3].type_name, "object[]");
    }

    #[test]
    fn test_attributes_and_arguments() {
        let src = "[HarmonyLib.HarmonyPatch(typeof(Foo), \"Bar\", argumentTypes: new[] { typeof(int) })] class P {}";
        let tree = parse_csharp(src).unwrap().unwrap();
        let class = find(tree.root_node(), "class_declaration").unwrap();
        let attrs = attributes(class, src);
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].name, "HarmonyPatch");
        assert_eq!(attrs[0].args.len(), 3);
        assert_eq!(attrs[0].args[0].expr.kind(), "typeof_expression");
        assert_eq!(string_value(attrs[0].args[1].expr, src).as_deref(), Some("Bar"));
        assert_eq!(attrs[0].args[2].name(src), Some("argumentTypes"));
    }

    #[test]
    fn test_variable_declarators_and_assignment_operator() {
        let src = "class C { void M() { var a = new Foo(); int b; b += 2; } }";
        let tree = parse_csharp(src).unwrap().unwrap();
        let decl = find(tree.root_node(), "variable_declaration").unwrap();
        let vars = variable_declarators(decl, src);
        assert_eq!(vars[0].0, "a");
        assert_eq!(vars[0].1.map(|n| n.kind()), Some("object_creation_expression"));
        assert_eq!(declared_type(decl, src), "var");
        let assign = find(tree.root_node(), "assignment_expression").unwrap();
        assert_eq!(assignment_operator(assign, src), Some("+="));
    }

    #[test]
    fn test_modifiers_and_return_type() {
        let src = "class C { public static override int M() => 1; }";
        let tree = parse_csharp(src).unwrap().unwrap();
        let method = find(tree.root_node(), "method_declaration").unwrap();
        let mods = modifiers(method, src);
        assert!(mods.contains(&"public"));
        assert!(mods.contains(&"override"));
        assert_eq!(return_type(method, src), "int");
        assert_eq!(body(method).map(|b| b.kind()), Some("arrow_expression_clause"));
    }
}
