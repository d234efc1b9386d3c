//! Runtime patch discovery.
//!
//! Two spellings install a Harmony patch:
//!
//! - declarative: `[HarmonyPatch(...)]` on a class and/or handler method,
//!   with the handler role taken from a `[HarmonyPrefix]`-style marker or a
//!   reserved method name, or a `TargetMethod()` that returns the target;
//! - imperative: `harmony.Patch(original, prefix: ..., postfix: ...)`.
//!
//! Both reduce their arguments with [`shape::shape_of`] and normalize the
//! target to the same `Type.Method(Params)` key call edges use.

pub mod shape;

use std::collections::HashMap;

use tree_sitter::Node;

use crate::diagnostics::{BuildDiagnostic, DiagnosticStage};
use crate::ingest::csharp::{
    attributes, body, field, line, name_of, named_children, text, variable_declarators,
    assignment_operator, Attribute,
};
use crate::ingest::ParsedFile;
use crate::model::index::SymbolIndex;
use crate::model::types::{normalize_type, signature_key, simple_name};
use crate::model::{Confidence, MethodId, PatchKind, PatchRecord, PatchStyle, UNKNOWN_TYPE};

use shape::{shape_args, shape_of, Shape, ShapeArg};

const TYPE_DECLARATIONS: &[&str] = &[
    "class_declaration",
    "struct_declaration",
    "record_declaration",
    "record_struct_declaration",
];

const HANDLER_NAMES: &[&str] = &["Prefix", "Postfix", "Transpiler", "Finalizer"];

/// Positional handler order of `Harmony.Patch`
const PATCH_ROLES: &[&str] = &["prefix", "postfix", "transpiler", "finalizer"];

const METHOD_OWNERS: &[&str] = &[
    "method_declaration",
    "constructor_declaration",
    "local_function_statement",
    "accessor_declaration",
    "operator_declaration",
];

/// Patches found in one file.
#[derive(Debug, Default)]
pub struct FilePatches {
    pub records: Vec<PatchRecord>,
    pub diagnostics: Vec<BuildDiagnostic>,
}

/// Target as written: any part may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct TargetSpec {
    type_name: Option<String>,
    method: Option<String>,
    params: Option<Vec<String>>,
    method_type: Option<String>,
}

impl TargetSpec {
    /// Fill from `other`, whose parts win.
    fn merged(&self, other: &TargetSpec) -> TargetSpec {
        TargetSpec {
            type_name: other.type_name.clone().or_else(|| self.type_name.clone()),
            method: other.method.clone().or_else(|| self.method.clone()),
            params: other.params.clone().or_else(|| self.params.clone()),
            method_type: other.method_type.clone().or_else(|| self.method_type.clone()),
        }
    }

    /// Method name after applying `MethodType`.
    fn method_name(&self) -> Option<String> {
        match self.method_type.as_deref() {
            Some("Constructor") => Some(".ctor".to_string()),
            Some("StaticConstructor") => Some(".cctor".to_string()),
            Some("Getter") => self.method.as_ref().map(|m| format!("get_{}", m)),
            Some("Setter") => self.method.as_ref().map(|m| format!("set_{}", m)),
            _ => self.method.clone(),
        }
    }
}

/// Discover every patch installed by an extension source file.
///
/// Base-corpus files never install patches and yield nothing.
pub fn discover_file(parsed: &ParsedFile, index: &SymbolIndex) -> FilePatches {
    let mut out = FilePatches::default();
    let Some(extension) = parsed.file.extension.clone() else {
        return out;
    };
    let mut ctx = Discovery {
        src: &parsed.source,
        file: parsed.rel_path(),
        extension,
        index,
        out: &mut out,
    };
    ctx.visit(parsed.root(), &mut Vec::new());
    out.records.sort_by(|a, b| {
        (a.line, &a.declaring_method, a.kind).cmp(&(b.line, &b.declaring_method, b.kind))
    });
    out
}

struct Discovery<'a> {
    src: &'a str,
    file: &'a str,
    extension: String,
    index: &'a SymbolIndex,
    out: &'a mut FilePatches,
}

impl<'a> Discovery<'a> {
    fn visit(&mut self, node: Node<'_>, outer: &mut Vec<String>) {
        if TYPE_DECLARATIONS.contains(&node.kind()) {
            let name = name_of(node, self.src).unwrap_or_default();
            outer.push(name);
            self.declarative(node, &outer.join("."));
            for child in named_children(node) {
                self.visit(child, outer);
            }
            outer.pop();
            return;
        }
        if node.kind() == "invocation_expression" {
            self.imperative(node, &outer.join("."));
        }
        for child in named_children(node) {
            self.visit(child, outer);
        }
    }

    fn members<'t>(&self, decl: Node<'t>) -> Vec<Node<'t>> {
        field(decl, &["body"])
            .or_else(|| named_children(decl).into_iter().find(|c| c.kind() == "declaration_list"))
            .map(named_children)
            .unwrap_or_default()
    }

    fn declarative(&mut self, class: Node<'_>, declaring_type: &str) {
        let class_attrs = attributes(class, self.src);
        let class_spec = self.spec_from_attributes(&class_attrs);
        let class_patched = class_attrs.iter().any(|a| a.name == "HarmonyPatch");
        let methods: Vec<Node<'_>> = self
            .members(class)
            .into_iter()
            .filter(|m| m.kind() == "method_declaration")
            .collect();

        // `static MethodBase TargetMethod()` overrides whatever the markers say
        let target_method = methods
            .iter()
            .find(|m| name_of(**m, self.src).as_deref() == Some("TargetMethod"))
            .and_then(|m| self.target_method_spec(*m));

        for method in &methods {
            let attrs = attributes(*method, self.src);
            let method_patched = attrs.iter().any(|a| a.name == "HarmonyPatch");
            if !class_patched && !method_patched {
                continue;
            }
            let name = name_of(*method, self.src).unwrap_or_default();
            let Some(kind) = handler_kind(&attrs, &name) else {
                continue;
            };
            let mut spec = class_spec.merged(&self.spec_from_attributes(&attrs));
            if let Some(t) = &target_method {
                spec = spec.merged(t);
            }
            self.record(
                spec,
                declaring_type,
                &name,
                kind,
                PatchStyle::Declarative,
                line(*method),
            );
        }
    }

    fn spec_from_attributes(&self, attrs: &[Attribute<'_>]) -> TargetSpec {
        attrs
            .iter()
            .filter(|a| a.name == "HarmonyPatch")
            .fold(TargetSpec::default(), |acc, attr| {
                let args: Vec<ShapeArg> = attr
                    .args
                    .iter()
                    .map(|a| ShapeArg {
                        name: a.name(self.src).map(str::to_string),
                        shape: shape_of(a.expr, self.src),
                    })
                    .collect();
                acc.merged(&spec_from_args(&args))
            })
    }

    fn target_method_spec(&self, method: Node<'_>) -> Option<TargetSpec> {
        let body = body(method)?;
        let expr = if body.kind() == "arrow_expression_clause" {
            body.named_child(0)?
        } else {
            last_return(body)?
        };
        let locals = local_shapes(method, expr.start_byte(), self.src);
        target_from_helper(&shape_of(expr, self.src), &locals)
    }

    fn imperative(&mut self, call: Node<'_>, declaring_type: &str) {
        let Some(function) = field(call, &["function"]) else {
            return;
        };
        if function.kind() != "member_access_expression"
            || field(function, &["name"]).map(|n| text(n, self.src)) != Some("Patch")
        {
            return;
        }
        let args = shape_args(call, self.src);
        if args.is_empty() {
            return;
        }
        let locals = enclosing_method(call)
            .map(|m| local_shapes(m, call.start_byte(), self.src))
            .unwrap_or_default();

        let mut original = None;
        let mut handlers: Vec<(&str, &Shape)> = Vec::new();
        let mut position = 0;
        for arg in &args {
            match arg.name.as_deref() {
                Some("original") => original = Some(&arg.shape),
                Some(role) => {
                    if let Some(r) = PATCH_ROLES.iter().find(|r| **r == role) {
                        handlers.push((*r, &arg.shape));
                    }
                }
                None => {
                    if position == 0 {
                        original = Some(&arg.shape);
                    } else if let Some(r) = PATCH_ROLES.get(position - 1) {
                        handlers.push((*r, &arg.shape));
                    }
                    position += 1;
                }
            }
        }
        let handlers: Vec<(&str, HandlerRef)> = handlers
            .into_iter()
            .filter_map(|(role, shape)| handler_ref(shape, &locals).map(|h| (role, h)))
            .collect();
        // Without a handler this is some other `Patch` method
        if handlers.is_empty() || !handlers.iter().any(|(_, h)| h.is_harmony_method) {
            return;
        }
        let spec = original
            .and_then(|o| target_from_helper(o, &locals))
            .unwrap_or_default();
        for (role, handler) in handlers {
            let Some(kind) = PatchKind::from_handler_role(role) else {
                continue;
            };
            let owner = handler
                .type_name
                .unwrap_or_else(|| declaring_type.to_string());
            let method = handler.method.unwrap_or_else(|| UNKNOWN_TYPE.to_string());
            self.record(spec.clone(), &owner, &method, kind, PatchStyle::Imperative, line(call));
        }
    }

    fn record(
        &mut self,
        spec: TargetSpec,
        declaring_type: &str,
        declaring_method: &str,
        kind: PatchKind,
        style: PatchStyle,
        at: usize,
    ) {
        let target = normalize_target(&spec, self.index);
        if target.type_name == UNKNOWN_TYPE || target.method == UNKNOWN_TYPE {
            self.out.diagnostics.push(BuildDiagnostic::degraded(
                self.file,
                DiagnosticStage::Patch,
                format!(
                    "line {}: could not determine the target of {}.{}",
                    at, declaring_type, declaring_method
                ),
            ));
        }
        self.out.records.push(PatchRecord {
            extension: self.extension.clone(),
            declaring_type: declaring_type.to_string(),
            declaring_method: declaring_method.to_string(),
            target_type: target.type_name,
            target_method: target.method,
            target_params: spec.params,
            target_signature: target.signature,
            kind,
            style,
            confidence: target.confidence,
            target_method_id: target.method_id,
            file: self.file.to_string(),
            line: at,
        });
    }
}

fn handler_kind(attrs: &[Attribute<'_>], method_name: &str) -> Option<PatchKind> {
    attrs
        .iter()
        .filter(|a| a.name != "HarmonyPatch" && a.name.starts_with("Harmony"))
        .find_map(|a| PatchKind::from_handler_role(&a.name))
        .or_else(|| {
            HANDLER_NAMES
                .contains(&method_name)
                .then(|| PatchKind::from_handler_role(method_name))
                .flatten()
        })
}

/// Read one `HarmonyPatch` argument list.
///
/// Only a leading `typeof` names the target type. Every later one belongs to
/// a `params Type[]` parameter list, as in `(typeof(Foo), "Load", typeof(int))`
/// or `("Load", typeof(int))`.
fn spec_from_args(args: &[ShapeArg]) -> TargetSpec {
    let mut spec = TargetSpec::default();
    let mut strings = Vec::new();
    let mut trailing_types = Vec::new();
    for (position, arg) in args.iter().enumerate() {
        match &arg.shape {
            Shape::TypeOf(t) => {
                if position == 0 && arg.name.as_deref().map_or(true, |n| n == "declaringType") {
                    spec.type_name = Some(t.clone());
                } else {
                    trailing_types.push(t.clone());
                }
            }
            Shape::Str(s) => strings.push(s.clone()),
            Shape::Member(path) if path.len() >= 2 && path[path.len() - 2] == "MethodType" => {
                spec.method_type = path.last().cloned();
            }
            other => {
                if let Some(types) = other.as_type_list() {
                    spec.params = Some(types);
                }
            }
        }
    }
    if spec.params.is_none() && !trailing_types.is_empty() {
        spec.params = Some(trailing_types);
    }
    match strings.as_slice() {
        [] => {}
        // `[HarmonyPatch("Game.Foo", "Bar")]`
        [type_name, method, ..] if spec.type_name.is_none() => {
            spec.type_name = Some(normalize_type(type_name));
            spec.method = Some(method.clone());
        }
        [method, ..] => spec.method = Some(method.clone()),
    }
    spec
}

/// Target named by a reflection helper, following locals.
fn target_from_helper(shape: &Shape, locals: &HashMap<String, Shape>) -> Option<TargetSpec> {
    match shape {
        // Locals are followed one step; `a = b` chains are not
        Shape::Ident(name) => match locals.get(name) {
            Some(Shape::Ident(_)) | None => None,
            Some(s) => target_from_helper(s, locals),
        },
        Shape::Call {
            receiver,
            name,
            args,
        } => {
            let receiver = receiver.as_deref();
            if receiver.is_some_and(|r| r.names("AccessTools")) {
                return access_tools_target(name, args);
            }
            reflection_target(receiver?, name, args, locals)
        }
        _ => None,
    }
}

fn access_tools_target(helper: &str, args: &[ShapeArg]) -> Option<TargetSpec> {
    let type_name = args.first().and_then(|a| match &a.shape {
        Shape::TypeOf(t) => Some(t.clone()),
        _ => None,
    });
    let name = args.get(1).and_then(|a| a.shape.as_str()).map(str::to_string);
    let params = args.iter().skip(1).find_map(|a| a.shape.as_type_list());
    match helper {
        "Method" | "DeclaredMethod" => {
            if type_name.is_none() {
                // `AccessTools.Method("Game.Foo:Bar")`
                let joined = args.first()?.shape.as_str()?;
                let (t, m) = joined.rsplit_once(':')?;
                return Some(TargetSpec {
                    type_name: Some(normalize_type(t)),
                    method: Some(m.to_string()),
                    params,
                    method_type: None,
                });
            }
            Some(TargetSpec {
                type_name,
                method: name,
                params,
                method_type: None,
            })
        }
        "PropertyGetter" | "DeclaredPropertyGetter" => Some(TargetSpec {
            type_name,
            method: name,
            params: Some(Vec::new()),
            method_type: Some("Getter".to_string()),
        }),
        "PropertySetter" | "DeclaredPropertySetter" => Some(TargetSpec {
            type_name,
            method: name,
            params: None,
            method_type: Some("Setter".to_string()),
        }),
        "Constructor" | "DeclaredConstructor" => Some(TargetSpec {
            type_name,
            method: None,
            params: args.iter().skip(1).find_map(|a| a.shape.as_type_list()),
            method_type: Some("Constructor".to_string()),
        }),
        _ => None,
    }
}

/// `typeof(T).GetMethod(...)` and friends.
fn reflection_target(
    receiver: &Shape,
    helper: &str,
    args: &[ShapeArg],
    locals: &HashMap<String, Shape>,
) -> Option<TargetSpec> {
    let params = args.iter().find_map(|a| a.shape.as_type_list());
    match (receiver, helper) {
        (Shape::TypeOf(t), "GetMethod") => Some(TargetSpec {
            type_name: Some(t.clone()),
            method: args.first()?.shape.as_str().map(str::to_string),
            params,
            method_type: None,
        }),
        (Shape::TypeOf(t), "GetConstructor") => Some(TargetSpec {
            type_name: Some(t.clone()),
            method: None,
            params,
            method_type: Some("Constructor".to_string()),
        }),
        (_, "GetGetMethod" | "GetSetMethod") => {
            let property = match receiver {
                Shape::Ident(n) => locals.get(n)?,
                other => other,
            };
            let Shape::Call {
                receiver: Some(owner),
                name,
                args: property_args,
            } = property
            else {
                return None;
            };
            let Shape::TypeOf(t) = owner.as_ref() else {
                return None;
            };
            if name != "GetProperty" {
                return None;
            }
            let getter = helper == "GetGetMethod";
            Some(TargetSpec {
                type_name: Some(t.clone()),
                method: property_args.first()?.shape.as_str().map(str::to_string),
                params: getter.then(Vec::new),
                method_type: Some(if getter { "Getter" } else { "Setter" }.to_string()),
            })
        }
        _ => None,
    }
}

/// A handler argument of `Harmony.Patch`.
struct HandlerRef {
    type_name: Option<String>,
    method: Option<String>,
    is_harmony_method: bool,
}

fn handler_ref(shape: &Shape, locals: &HashMap<String, Shape>) -> Option<HandlerRef> {
    match shape {
        Shape::Null => None,
        Shape::Ident(name) => match locals.get(name) {
            Some(s) if !matches!(s, Shape::Ident(_)) => handler_ref(s, locals),
            _ => Some(HandlerRef {
                type_name: None,
                method: None,
                is_harmony_method: false,
            }),
        },
        Shape::New { type_name, args } if type_name == "HarmonyMethod" => {
            let first = args.first().map(|a| &a.shape);
            let (owner, method) = match first {
                Some(Shape::TypeOf(t)) => (
                    Some(t.clone()),
                    args.get(1).and_then(|a| a.shape.as_str()).map(str::to_string),
                ),
                Some(other) => match target_from_helper(other, locals) {
                    Some(spec) => (spec.type_name.clone(), spec.method_name()),
                    None => (None, None),
                },
                None => (None, None),
            };
            Some(HandlerRef {
                type_name: owner,
                method,
                is_harmony_method: true,
            })
        }
        other => target_from_helper(other, locals).map(|spec| HandlerRef {
            type_name: spec.type_name.clone(),
            method: spec.method_name(),
            is_harmony_method: false,
        }),
    }
}

fn enclosing_method(node: Node<'_>) -> Option<Node<'_>> {
    let mut current = node.parent();
    while let Some(n) = current {
        if METHOD_OWNERS.contains(&n.kind()) {
            return Some(n);
        }
        current = n.parent();
    }
    None
}

/// Shapes of locals assigned inside `scope` before byte offset `before`.
///
/// Later assignments replace earlier ones.
fn local_shapes(scope: Node<'_>, before: usize, src: &str) -> HashMap<String, Shape> {
    let mut locals = HashMap::new();
    let mut stack = vec![scope];
    let mut found: Vec<(usize, String, Node<'_>)> = Vec::new();
    while let Some(node) = stack.pop() {
        if node.start_byte() >= before {
            continue;
        }
        match node.kind() {
            "variable_declaration" => {
                for (name, init) in variable_declarators(node, src) {
                    if let Some(init) = init {
                        found.push((node.start_byte(), name, init));
                    }
                }
            }
            "assignment_expression" if assignment_operator(node, src) == Some("=") => {
                if let (Some(left), Some(right)) = (field(node, &["left"]), field(node, &["right"])) {
                    if left.kind() == "identifier" {
                        found.push((node.start_byte(), text(left, src).to_string(), right));
                    }
                }
            }
            _ => {}
        }
        stack.extend(named_children(node));
    }
    found.sort_by_key(|(at, _, _)| *at);
    for (_, name, init) in found {
        locals.insert(name, shape_of(init, src));
    }
    locals
}

fn last_return(block: Node<'_>) -> Option<Node<'_>> {
    let mut stack = vec![block];
    let mut last = None;
    while let Some(node) = stack.pop() {
        if node.kind() == "return_statement" {
            if let Some(expr) = node.named_child(0) {
                if last.map_or(true, |l: Node<'_>| expr.start_byte() > l.start_byte()) {
                    last = Some(expr);
                }
            }
            continue;
        }
        if matches!(node.kind(), "lambda_expression" | "local_function_statement") {
            continue;
        }
        stack.extend(named_children(node));
    }
    last
}

/// A target normalized against the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NormalizedTarget {
    type_name: String,
    method: String,
    signature: String,
    confidence: Confidence,
    method_id: Option<MethodId>,
}

fn normalize_target(spec: &TargetSpec, index: &SymbolIndex) -> NormalizedTarget {
    let type_name = spec
        .type_name
        .as_deref()
        .map(|t| simple_name(t).to_string())
        .unwrap_or_else(|| UNKNOWN_TYPE.to_string());
    let method = spec
        .method_name()
        .unwrap_or_else(|| UNKNOWN_TYPE.to_string());

    if let Some(params) = &spec.params {
        let signature = signature_key(&type_name, &method, params);
        let method_id = match index.by_signature(&signature) {
            [id] => Some(*id),
            _ => None,
        };
        return NormalizedTarget {
            type_name,
            method,
            signature,
            confidence: Confidence::Resolved,
            method_id,
        };
    }

    let candidates: Vec<MethodId> = index
        .types_named(&type_name)
        .iter()
        .flat_map(|t| index.methods_named(*t, &method).iter().copied())
        .collect();
    if let [id] = candidates.as_slice() {
        return NormalizedTarget {
            type_name,
            method,
            signature: index.method(*id).signature.clone(),
            confidence: Confidence::Resolved,
            method_id: Some(*id),
        };
    }
    let signature = if type_name == UNKNOWN_TYPE {
        format!("{}.{}()", type_name, method)
    } else {
        signature_key(&type_name, &method, &[])
    };
    let method_id = match index.by_signature(&signature) {
        [id] => Some(*id),
        _ => None,
    };
    NormalizedTarget {
        type_name,
        method,
        signature,
        confidence: Confidence::BestEffort,
        method_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discover::SourceFile;
    use crate::ingest::parse_source;
    use crate::model::harvest_file;
    use crate::refs::ReferenceIndex;
    use std::path::PathBuf;

    const BASE: &str = "namespace Game {\n\
        public class Foo {\n\
            public void Bar() {}\n\
            public void Load(int slot) {}\n\
            public void Load(string name) {}\n\
            public int Health { get; set; }\n\
            public Foo(int seed) {}\n\
        }\n\
    }";

    fn parse(rel: &str, src: &str, extension: Option<&str>) -> ParsedFile {
        let file = SourceFile {
            path: PathBuf::from(rel),
            rel_path: rel.into(),
            tree_id: extension.map_or("Game".to_string(), |e| format!("mod:{}", e)),
            extension: extension.map(str::to_string),
        };
        parse_source(file, src.to_string(), String::new()).unwrap()
    }

    fn discover(mod_src: &str) -> FilePatches {
        let base = parse("Foo.cs", BASE, None);
        let index = SymbolIndex::build(vec![harvest_file(&base)], &ReferenceIndex::new());
        let patch = parse("Patches.cs", mod_src, Some("ModA"));
        discover_file(&patch, &index)
    }

    fn summary(found: &FilePatches) -> Vec<String> {
        found
            .records
            .iter()
            .map(|r| {
                format!(
                    "{} {} {} {}.{}",
                    r.target_signature,
                    r.kind.as_str(),
                    r.confidence.as_str(),
                    r.declaring_type,
                    r.declaring_method
                )
            })
            .collect()
    }

    #[test]
    fn test_declarative_prefix_on_unique_method() {
        let found = discover(
            "using HarmonyLib;\n\
             [HarmonyPatch(typeof(Game.Foo), \"Bar\")]\n\
             class BarPatch { static void Prefix() {} static void Helper() {} }",
        );
        assert_eq!(summary(&found), vec!["Foo.Bar() before resolved BarPatch.Prefix"]);
        let record = &found.records[0];
        assert_eq!(record.extension, "ModA");
        assert_eq!(record.style, PatchStyle::Declarative);
        assert!(record.target_method_id.is_some());
        assert!(record.target_params.is_none());
    }

    #[test]
    fn test_trailing_typeof_arguments_are_parameter_types() {
        let found = discover(
            "[HarmonyPatch(typeof(Foo), \"Load\", typeof(int))]\n\
             class IntPatch { static void Prefix() {} }\n\
             [HarmonyPatch(typeof(Foo))]\n\
             class StringPatch {\n\
                 [HarmonyPatch(\"Load\", typeof(string))]\n\
                 [HarmonyPostfix]\n\
                 static void After() {}\n\
             }",
        );
        assert_eq!(
            summary(&found),
            vec![
                "Foo.Load(int) before resolved IntPatch.Prefix",
                "Foo.Load(string) after resolved StringPatch.After",
            ]
        );
        assert_eq!(found.records[0].target_params, Some(vec!["int".to_string()]));
        assert_eq!(found.records[1].target_type, "Foo");
    }

    #[test]
    fn test_method_level_marker_wins_and_overloads_stay_apart() {
        let found = discover(
            "[HarmonyPatch(typeof(Foo), \"Bar\")]\n\
             class LoadPatch {\n\
                 [HarmonyPatch(\"Load\", new Type[] { typeof(int) })]\n\
                 [HarmonyPostfix]\n\
                 static void After() {}\n\
                 [HarmonyPatch(\"Load\")]\n\
                 static void Prefix() {}\n\
             }",
        );
        assert_eq!(
            summary(&found),
            vec![
                "Foo.Load(int) after resolved LoadPatch.After",
                "Foo.Load() before best_effort LoadPatch.Prefix",
            ]
        );
        assert!(found.records[1].target_method_id.is_none());
    }

    #[test]
    fn test_method_types_map_to_accessors_and_constructors() {
        let found = discover(
            "[HarmonyPatch(typeof(Foo), nameof(Foo.Health), MethodType.Getter)]\n\
             class HealthPatch { static void Postfix() {} }\n\
             [HarmonyPatch(typeof(Foo), MethodType.Constructor, new[] { typeof(int) })]\n\
             class CtorPatch { static void Finalizer() {} }",
        );
        assert_eq!(
            summary(&found),
            vec![
                "Foo.get_Health() after resolved HealthPatch.Postfix",
                "Foo..ctor(int) around resolved CtorPatch.Finalizer",
            ]
        );
    }

    #[test]
    fn test_target_method_body() {
        let found = discover(
            "[HarmonyPatch]\n\
             class Dyn {\n\
                 static MethodBase TargetMethod() {\n\
                     var m = AccessTools.Method(typeof(Foo), \"Load\", new Type[] { typeof(string) });\n\
                     return m;\n\
                 }\n\
                 static IEnumerable<CodeInstruction> Transpiler(IEnumerable<CodeInstruction> i) => i;\n\
             }",
        );
        assert_eq!(summary(&found), vec!["Foo.Load(string) rewrite resolved Dyn.Transpiler"]);
    }

    #[test]
    fn test_imperative_named_and_positional_handlers() {
        let found = discover(
            "class Boot {\n\
                 void Init(Harmony harmony) {\n\
                     var original = AccessTools.Method(typeof(Foo), \"Bar\");\n\
                     harmony.Patch(original, prefix: new HarmonyMethod(typeof(Hooks), nameof(Hooks.Before)));\n\
                     harmony.Patch(typeof(Foo).GetMethod(\"Load\", new[] { typeof(int) }), null,\n\
                         new HarmonyMethod(typeof(Hooks), \"After\"));\n\
                 }\n\
             }",
        );
        assert_eq!(
            summary(&found),
            vec![
                "Foo.Bar() before resolved Hooks.Before",
                "Foo.Load(int) after resolved Hooks.After",
            ]
        );
        assert!(found.records.iter().all(|r| r.style == PatchStyle::Imperative));
    }

    #[test]
    fn test_unresolvable_target_is_degraded() {
        let found = discover(
            "class Boot {\n\
                 void Init(Harmony h, MethodBase m) {\n\
                     h.Patch(m, postfix: new HarmonyMethod(typeof(Hooks), \"After\"));\n\
                 }\n\
             }",
        );
        assert_eq!(found.records.len(), 1);
        assert_eq!(found.records[0].target_type, UNKNOWN_TYPE);
        assert_eq!(found.records[0].confidence, Confidence::BestEffort);
        assert_eq!(found.diagnostics.len(), 1);
    }

    #[test]
    fn test_unrelated_patch_calls_and_base_files_are_ignored() {
        let found = discover("class C { void M(Doc d) { d.Patch(\"x\", 1); } }");
        assert!(found.records.is_empty());

        let base = parse("Foo.cs", BASE, None);
        let index = SymbolIndex::build(vec![harvest_file(&base)], &ReferenceIndex::new());
        let in_base = parse(
            "P.cs",
            "[HarmonyPatch(typeof(Foo), \"Bar\")] class P { static void Prefix() {} }",
            None,
        );
        assert!(discover_file(&in_base, &index).records.is_empty());
    }
}
