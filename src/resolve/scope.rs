//! Method-body scopes and expression typing.
//!
//! Bodies are walked in source order while a stack of frames tracks the
//! names in scope (parameters, locals, pattern and `out` variables, lambda
//! parameters, local functions). Types come from declarations or, for
//! `var`, from the initializer.

use tree_sitter::Node;

use super::strategy::{CallSite, Receiver};
use super::Resolver;
use crate::ingest::csharp::{
    call_arguments, child_of_kind, declared_type, field, is_field_of_parent, member_name,
    named_children, parameters, text, unwrap_parens, variable_declarators,
};
use crate::model::index::TypeContext;
use crate::model::types::{element_type, indexer_type, normalize_type, simple_name};
use crate::model::{MemberKind, MethodRecord, SymbolIndex, TypeId};
use crate::refs::ReferenceIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalKind {
    Parameter,
    Variable,
    Function,
}

#[derive(Debug, Clone)]
pub struct Local {
    pub name: String,
    pub type_name: Option<String>,
    pub kind: LocalKind,
}

/// Names visible at one point of a method body.
#[derive(Debug, Default)]
pub struct Scope {
    locals: Vec<Local>,
    frames: Vec<usize>,
}

impl Scope {
    /// Scope at the start of a body: just the parameters.
    pub fn for_method(method: &MethodRecord) -> Self {
        let mut scope = Scope::default();
        for p in &method.params {
            scope.declare(&p.name, known_type(&p.type_name), LocalKind::Parameter);
        }
        scope
    }

    pub fn lookup(&self, name: &str) -> Option<&Local> {
        self.locals.iter().rev().find(|l| l.name == name)
    }

    fn declare(&mut self, name: &str, type_name: Option<String>, kind: LocalKind) {
        if name.is_empty() || name == "_" {
            return;
        }
        self.locals.push(Local {
            name: name.to_string(),
            type_name,
            kind,
        });
    }

    fn push_frame(&mut self) {
        self.frames.push(self.locals.len());
    }

    fn pop_frame(&mut self) {
        if let Some(len) = self.frames.pop() {
            self.locals.truncate(len);
        }
    }
}

fn known_type(t: &str) -> Option<String> {
    match t {
        "" | "?" | "var" | "dynamic" => None,
        other => Some(other.to_string()),
    }
}

/// Everything expression typing needs about the method being walked.
pub struct Env<'a> {
    pub resolver: &'a Resolver<'a>,
    pub src: &'a str,
    pub method: &'a MethodRecord,
    pub type_id: TypeId,
    pub ctx: TypeContext<'a>,
}

impl<'a> Env<'a> {
    pub fn new(resolver: &'a Resolver<'a>, src: &'a str, method: &'a MethodRecord) -> Self {
        Self {
            resolver,
            src,
            method,
            type_id: method.type_id,
            ctx: resolver.index.context_for_type(method.type_id),
        }
    }

    pub fn index(&self) -> &'a SymbolIndex {
        self.resolver.index
    }

    pub fn refs(&self) -> &'a ReferenceIndex {
        self.resolver.refs
    }

    pub fn resolve_type(&self, name: &str) -> Option<TypeId> {
        self.index().resolve_type(name, &self.ctx)
    }

    fn text(&self, node: Node<'_>) -> &'a str {
        text(node, self.src)
    }

    /// Member visible by simple name from the current type: its own and
    /// inherited members, then those of enclosing types.
    pub fn visible_member(&self, name: &str) -> Option<(TypeId, &'a crate::model::MemberRecord)> {
        let index = self.index();
        let mut current = Some(self.type_id);
        let mut guard = 0;
        while let Some(t) = current {
            if let Some(found) = index.find_member(t, name) {
                return Some(found);
            }
            current = index.outer_of(t);
            guard += 1;
            if guard > 16 {
                break;
            }
        }
        None
    }

    /// Whether a simple name denotes a method of the current type, its
    /// ancestors or its enclosing types.
    pub fn is_method_name(&self, name: &str) -> bool {
        let index = self.index();
        let mut current = Some(self.type_id);
        while let Some(t) = current {
            let declared = std::iter::once(t)
                .chain(index.supertypes(t))
                .any(|s| !index.methods_named(s, name).is_empty());
            if declared {
                return true;
            }
            current = index.outer_of(t).filter(|&o| o != t);
        }
        false
    }

    /// Whether `name` denotes a type: harvested, referenced, or a keyword type.
    pub fn is_type_name(&self, name: &str) -> bool {
        let normalized = normalize_type(name);
        crate::model::types::is_keyword_type(&normalized)
            || self.resolve_type(name).is_some()
            || self.refs().lookup(simple_name(&normalized)).is_some()
    }
}

/// Delegate types: BCL and Unity delegates plus corpus `delegate` declarations.
pub fn is_delegate_type(index: &SymbolIndex, type_name: &str) -> bool {
    const KNOWN: &[&str] = &[
        "Action",
        "Func",
        "EventHandler",
        "Predicate",
        "Comparison",
        "Converter",
        "Delegate",
        "MulticastDelegate",
        "UnityAction",
    ];
    let simple = simple_name(type_name);
    KNOWN.contains(&simple) || index.is_delegate_type(simple)
}

/// What a receiver expression denotes.
pub fn classify_receiver(expr: Node<'_>, scope: &Scope, env: &Env<'_>) -> Receiver {
    let expr = unwrap_parens(expr);
    let raw = env.text(expr).to_string();
    match expr.kind() {
        "this_expression" => Receiver::This,
        "base_expression" => Receiver::Base,
        "predefined_type" => Receiver::Static(normalize_type(&raw)),
        "identifier" => {
            let name = raw.trim_start_matches('@');
            if let Some(local) = scope.lookup(name) {
                return match &local.type_name {
                    Some(t) => Receiver::Instance(t.clone()),
                    None => Receiver::Unknown(raw),
                };
            }
            if let Some((_, member)) = env.visible_member(name) {
                return Receiver::Instance(member.type_name.clone());
            }
            // Unknown capitalized names are taken as types outside the corpus
            let capitalized = name.chars().next().is_some_and(|c| c.is_ascii_uppercase());
            if capitalized || env.is_type_name(name) {
                return Receiver::Static(normalize_type(name));
            }
            Receiver::Unknown(raw)
        }
        "generic_name" | "qualified_name" | "alias_qualified_name" => {
            Receiver::Static(normalize_type(&raw))
        }
        "member_access_expression" => {
            if let Some(t) = infer_type(expr, scope, env) {
                return Receiver::Instance(t);
            }
            // `System.IO.File` or `Outer.Inner`
            let dotted = raw.split_whitespace().collect::<String>();
            let is_dotted_name = dotted
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '@');
            if is_dotted_name && env.is_type_name(&dotted) {
                return Receiver::Static(normalize_type(&dotted));
            }
            Receiver::Unknown(raw)
        }
        _ => match infer_type(expr, scope, env) {
            Some(t) => Receiver::Instance(t),
            None => Receiver::Unknown(raw),
        },
    }
}

/// Harvested type a receiver resolves to.
pub fn receiver_type_id(receiver: &Receiver, env: &Env<'_>) -> Option<TypeId> {
    match receiver {
        Receiver::Implicit | Receiver::This => Some(env.type_id),
        Receiver::Base => env.index().base_type_id(env.type_id),
        Receiver::Instance(t) | Receiver::Static(t) => env.resolve_type(t),
        Receiver::Unknown(_) => None,
    }
}

/// Receiver of a `?.` binding: the condition of the nearest conditional access.
pub fn conditional_receiver(node: Node<'_>) -> Option<Node<'_>> {
    let mut current = node.parent();
    while let Some(n) = current {
        if n.kind() == "conditional_access_expression" {
            return field(n, &["condition"]).or_else(|| n.named_child(0));
        }
        current = n.parent();
    }
    None
}

/// Static type of an expression, normalized, when it can be told.
pub fn infer_type(node: Node<'_>, scope: &Scope, env: &Env<'_>) -> Option<String> {
    let node = unwrap_parens(node);
    let index = env.index();
    match node.kind() {
        "this_expression" => Some(index.type_record(env.type_id).name.clone()),
        "base_expression" => index.type_record(env.type_id).base_type.clone(),
        "identifier" => {
            let name = env.text(node).trim_start_matches('@');
            if let Some(local) = scope.lookup(name) {
                return local.type_name.clone();
            }
            env.visible_member(name).map(|(_, m)| m.type_name.clone())
        }
        "member_access_expression" => {
            let receiver = classify_receiver(field(node, &["expression"])?, scope, env);
            let name = member_name(field(node, &["name"])?, env.src)?;
            member_type(&receiver, &name, env)
        }
        "member_binding_expression" => {
            let receiver = classify_receiver(conditional_receiver(node)?, scope, env);
            let name = member_name(node, env.src)?;
            member_type(&receiver, &name, env)
        }
        "conditional_access_expression" => {
            let binding = named_children(node).into_iter().last()?;
            infer_type(binding, scope, env)
        }
        "invocation_expression" => invocation_type(node, scope, env),
        "object_creation_expression" | "array_creation_expression" | "cast_expression" => {
            field(node, &["type"]).map(|t| normalize_type(env.text(t)))
        }
        "as_expression" => field(node, &["right", "type"]).map(|t| normalize_type(env.text(t))),
        "element_access_expression" => {
            let target = infer_type(field(node, &["expression"])?, scope, env)?;
            indexer_type(&target)
        }
        "string_literal" | "verbatim_string_literal" | "raw_string_literal"
        | "interpolated_string_expression" => Some("string".to_string()),
        "integer_literal" => {
            let t = env.text(node).to_ascii_lowercase();
            Some(if t.ends_with('l') { "long" } else { "int" }.to_string())
        }
        "real_literal" => {
            let t = env.text(node).to_ascii_lowercase();
            let kind = if t.ends_with('f') {
                "float"
            } else if t.ends_with('m') {
                "decimal"
            } else {
                "double"
            };
            Some(kind.to_string())
        }
        "boolean_literal" | "is_expression" | "is_pattern_expression" => Some("bool".to_string()),
        "character_literal" => Some("char".to_string()),
        "typeof_expression" => Some("Type".to_string()),
        "conditional_expression" => field(node, &["consequence"])
            .and_then(|c| infer_type(c, scope, env))
            .or_else(|| field(node, &["alternative"]).and_then(|a| infer_type(a, scope, env))),
        "binary_expression" => {
            let op = field(node, &["operator"]).map(|o| env.text(o)).unwrap_or("");
            match op {
                "==" | "!=" | "<" | ">" | "<=" | ">=" | "&&" | "||" => Some("bool".to_string()),
                "??" => field(node, &["left"]).and_then(|l| infer_type(l, scope, env)),
                _ => field(node, &["left"]).and_then(|l| infer_type(l, scope, env)),
            }
        }
        "prefix_unary_expression" => {
            if env.text(node).starts_with('!') {
                Some("bool".to_string())
            } else {
                node.named_child(0).and_then(|o| infer_type(o, scope, env))
            }
        }
        "postfix_unary_expression" => node.named_child(0).and_then(|o| infer_type(o, scope, env)),
        _ => None,
    }
}

/// Declared type of a member reached through `receiver`.
fn member_type(receiver: &Receiver, name: &str, env: &Env<'_>) -> Option<String> {
    let type_id = receiver_type_id(receiver, env)?;
    env.index()
        .find_member(type_id, name)
        .map(|(_, m)| m.type_name.clone())
}

/// Return type of a call, with a lone explicit type argument standing in for
/// a generic return (`GetComponent<Foo>()` is a `Foo`).
fn invocation_type(node: Node<'_>, scope: &Scope, env: &Env<'_>) -> Option<String> {
    let site = invocation_site(node, scope, env)?;
    match env.resolver.resolve_site(&site, env.type_id) {
        Some((res, _)) => {
            let m = env.index().method(res.method);
            let is_generic_return = m.type_params > 0 && env.resolve_type(&m.return_type).is_none();
            match (is_generic_return, site.type_args.as_slice()) {
                (true, [only]) => Some(only.clone()),
                _ => known_type(&m.return_type).filter(|t| t != "void"),
            }
        }
        None => match site.type_args.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        },
    }
}

fn argument_types(call: Node<'_>, scope: &Scope, env: &Env<'_>) -> Vec<Option<String>> {
    call_arguments(call)
        .iter()
        .map(|a| infer_type(a.expr, scope, env))
        .collect()
}

fn type_args_of(name_node: Node<'_>, env: &Env<'_>) -> Vec<String> {
    let generic = match name_node.kind() {
        "member_access_expression" | "member_binding_expression" => field(name_node, &["name"]),
        _ => Some(name_node),
    };
    generic
        .filter(|g| g.kind() == "generic_name")
        .and_then(|g| child_of_kind(g, &["type_argument_list"]))
        .map(|list| {
            named_children(list)
                .into_iter()
                .map(|t| normalize_type(env.text(t)))
                .collect()
        })
        .unwrap_or_default()
}

/// Callee expression of an invocation; `a?.M()` yields the `.M` binding.
pub fn invoked_function(node: Node<'_>) -> Option<Node<'_>> {
    let function = unwrap_parens(field(node, &["function"]).or_else(|| node.named_child(0))?);
    if function.kind() == "conditional_access_expression" {
        return named_children(function).into_iter().last();
    }
    Some(function)
}

/// Call site of an `invocation_expression`.
///
/// Returns `None` for invocations of arbitrary expressions (`GetAction()()`).
pub fn invocation_site(node: Node<'_>, scope: &Scope, env: &Env<'_>) -> Option<CallSite> {
    let function = invoked_function(node)?;
    let receiver = match function.kind() {
        "identifier" | "generic_name" => Receiver::Implicit,
        "member_access_expression" => classify_receiver(field(function, &["expression"])?, scope, env),
        "member_binding_expression" => classify_receiver(conditional_receiver(function)?, scope, env),
        _ => return None,
    };
    let name = member_name(function, env.src)?;
    let receiver_type = match receiver {
        Receiver::Implicit => None,
        ref r => receiver_type_id(r, env),
    };
    Some(CallSite {
        name,
        type_args: type_args_of(function, env),
        receiver,
        receiver_type,
        arg_types: argument_types(node, scope, env),
    })
}

/// Constructor call site of an object creation expression.
pub fn creation_site(node: Node<'_>, type_name: &str, scope: &Scope, env: &Env<'_>) -> CallSite {
    let normalized = normalize_type(type_name);
    let receiver = Receiver::Static(normalized.clone());
    CallSite {
        name: ".ctor".to_string(),
        type_args: Vec::new(),
        receiver_type: env.resolve_type(&normalized),
        receiver,
        arg_types: argument_types(node, scope, env),
    }
}

/// Walk a method body in source order, calling `visit` on every node with
/// the scope in effect at that node.
pub fn walk_body<'t>(body: Node<'t>, env: &Env<'_>, visit: &mut dyn FnMut(Node<'t>, &Scope)) {
    let mut scope = Scope::for_method(env.method);
    walk(body, env, &mut scope, visit);
}

const FRAME_KINDS: &[&str] = &[
    "block",
    "lambda_expression",
    "anonymous_method_expression",
    "local_function_statement",
    "for_statement",
    "foreach_statement",
    "using_statement",
    "catch_clause",
    "switch_section",
];

fn walk<'t>(node: Node<'t>, env: &Env<'_>, scope: &mut Scope, visit: &mut dyn FnMut(Node<'t>, &Scope)) {
    visit(node, scope);

    let kind = node.kind();
    if kind == "local_function_statement" {
        // Visible to the enclosing block before the frame opens
        if let Some(name) = field(node, &["name"]) {
            if scope.lookup(env.text(name)).is_none() {
                scope.declare(env.text(name), None, LocalKind::Function);
            }
        }
    }
    let framed = FRAME_KINDS.contains(&kind);
    if framed {
        scope.push_frame();
    }
    match kind {
        "block" => {
            // Local functions can be called before their declaration
            for child in named_children(node) {
                if child.kind() == "local_function_statement" {
                    if let Some(name) = field(child, &["name"]) {
                        scope.declare(env.text(name), None, LocalKind::Function);
                    }
                }
            }
        }
        "lambda_expression" | "anonymous_method_expression" | "local_function_statement" => {
            declare_lambda_parameters(node, env, scope);
        }
        "foreach_statement" => {
            let element = field(node, &["right"])
                .and_then(|c| infer_type(c, scope, env))
                .and_then(|t| element_type(&t));
            let written = field(node, &["type"]).map(|t| normalize_type(env.text(t)));
            let type_name = written.and_then(|t| known_type(&t)).or(element);
            if let Some(left) = field(node, &["left"]) {
                declare_designation(left, type_name, env, scope);
            }
        }
        "catch_clause" => {
            if let Some(decl) = child_of_kind(node, &["catch_declaration"]) {
                let type_name = field(decl, &["type"]).map(|t| normalize_type(env.text(t)));
                if let Some(name) = field(decl, &["name"]) {
                    scope.declare(env.text(name), type_name, LocalKind::Variable);
                }
            }
        }
        _ => {}
    }

    for child in named_children(node) {
        walk(child, env, scope, visit);
    }

    match kind {
        "variable_declaration" => declare_variables(node, env, scope),
        "declaration_expression" => {
            // `out var x`, `out Foo x`
            let type_name = field(node, &["type"])
                .map(|t| normalize_type(env.text(t)))
                .and_then(|t| known_type(&t));
            if let Some(name) = field(node, &["name"]) {
                declare_designation(name, type_name, env, scope);
            }
        }
        "declaration_pattern" | "recursive_pattern" => {
            // `x is Foo f`
            let type_name = field(node, &["type"]).map(|t| normalize_type(env.text(t)));
            if let Some(designation) = field(node, &["name", "designation"])
                .or_else(|| child_of_kind(node, &["single_variable_designation"]))
            {
                declare_designation(designation, type_name, env, scope);
            }
        }
        _ => {}
    }

    if framed {
        scope.pop_frame();
    }
}

fn declare_variables(decl: Node<'_>, env: &Env<'_>, scope: &mut Scope) {
    let written = declared_type(decl, env.src);
    for (name, init) in variable_declarators(decl, env.src) {
        let type_name = match known_type(&written) {
            Some(t) => Some(t),
            None => init.and_then(|i| infer_type(i, scope, env)),
        };
        scope.declare(&name, type_name, LocalKind::Variable);
    }
}

fn declare_designation(node: Node<'_>, type_name: Option<String>, env: &Env<'_>, scope: &mut Scope) {
    match node.kind() {
        "identifier" => scope.declare(env.text(node), type_name, LocalKind::Variable),
        "single_variable_designation" => {
            if let Some(id) = child_of_kind(node, &["identifier"]) {
                scope.declare(env.text(id), type_name, LocalKind::Variable);
            }
        }
        // Tuple deconstruction: names only
        _ => {
            for child in named_children(node) {
                declare_designation(child, None, env, scope);
            }
        }
    }
}

fn declare_lambda_parameters(node: Node<'_>, env: &Env<'_>, scope: &mut Scope) {
    match field(node, &["parameters"]) {
        Some(p) if p.kind() == "identifier" => {
            scope.declare(env.text(p), None, LocalKind::Parameter);
        }
        _ => {
            for p in parameters(node, env.src) {
                scope.declare(&p.name, known_type(&p.type_name), LocalKind::Parameter);
            }
        }
    }
}

/// Whether an identifier stands as an expression of its own (not a name
/// being declared, a member name after a dot, or a type position).
pub fn is_value_identifier(node: Node<'_>) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    if is_field_of_parent(node, "name") || is_field_of_parent(node, "type") {
        return false;
    }
    match parent.kind() {
        "member_access_expression" => is_field_of_parent(node, "expression"),
        "invocation_expression" => false,
        "argument" | "assignment_expression" | "binary_expression" | "return_statement"
        | "expression_statement" | "arrow_expression_clause" | "equals_value_clause"
        | "if_statement" | "while_statement" | "parenthesized_expression"
        | "prefix_unary_expression" | "postfix_unary_expression" | "conditional_expression"
        | "element_access_expression" | "interpolation" | "initializer_expression"
        | "variable_declarator" | "conditional_access_expression" | "cast_expression"
        | "throw_expression" | "throw_statement" | "switch_statement" | "yield_statement" => true,
        _ => false,
    }
}

/// Whether a member name refers to a harvested property of `type_id` or its ancestors.
pub fn property_owner(index: &SymbolIndex, type_id: TypeId, name: &str) -> Option<TypeId> {
    index
        .find_member(type_id, name)
        .filter(|(_, m)| m.kind == MemberKind::Property)
        .map(|(t, _)| t)
}

/// Member an expression names (`E`, `x.E`, `x?.E`), with its declaring type.
pub fn member_of<'a>(
    expr: Node<'_>,
    scope: &Scope,
    env: &Env<'a>,
) -> Option<(TypeId, &'a crate::model::MemberRecord)> {
    let expr = unwrap_parens(expr);
    match expr.kind() {
        "identifier" => {
            let name = env.text(expr).trim_start_matches('@');
            if scope.lookup(name).is_some() {
                return None;
            }
            env.visible_member(name)
        }
        "member_access_expression" => {
            let receiver = classify_receiver(field(expr, &["expression"])?, scope, env);
            let name = member_name(expr, env.src)?;
            env.index().find_member(receiver_type_id(&receiver, env)?, &name)
        }
        "member_binding_expression" => {
            let receiver = classify_receiver(conditional_receiver(expr)?, scope, env);
            let name = member_name(expr, env.src)?;
            env.index().find_member(receiver_type_id(&receiver, env)?, &name)
        }
        _ => None,
    }
}

/// Events and delegate-typed fields or properties.
pub fn is_delegate_member(index: &SymbolIndex, member: &crate::model::MemberRecord) -> bool {
    member.kind == MemberKind::Event || is_delegate_type(index, &member.type_name)
}
