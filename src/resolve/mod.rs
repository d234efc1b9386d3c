//! Call-graph construction.
//!
//! Every invocation, object creation, property use and constructor
//! initializer inside a method body becomes exactly one call edge: to a
//! harvested method when a strategy of the chain resolves it, to an
//! external target otherwise.

pub mod scope;
pub mod strategy;

use tree_sitter::Node;

pub use scope::{walk_body, Env, Scope};
pub use strategy::{CallSite, Receiver, Resolution, ResolveStrategy, StrategyContext};

use crate::ingest::csharp::{
    assignment_operator, child_of_kind, field, is_field_of_parent, line, member_name,
    named_children, text,
};
use crate::ingest::ParsedFile;
use crate::model::types::{normalize_type, signature_key, simple_name};
use crate::model::{
    CallEdge, CallKind, Callee, Confidence, ExternalTarget, MethodId, SymbolIndex, TypeId,
    TypeKind, UNKNOWN_TYPE,
};
use crate::events::fire_target;
use crate::refs::ReferenceIndex;
use crate::settings::EventSettings;
use scope::{
    classify_receiver, conditional_receiver, creation_site, invocation_site, invoked_function, is_delegate_type,
    is_value_identifier, property_owner, receiver_type_id,
};

/// Resolves call sites against the symbol index and loaded references.
pub struct Resolver<'a> {
    pub index: &'a SymbolIndex,
    pub refs: &'a ReferenceIndex,
    /// Decides which invocations are event fires rather than calls.
    pub events: EventSettings,
    strategies: Vec<Box<dyn ResolveStrategy>>,
}

impl<'a> Resolver<'a> {
    pub fn new(index: &'a SymbolIndex, refs: &'a ReferenceIndex) -> Self {
        Self {
            index,
            refs,
            events: EventSettings::default(),
            strategies: strategy::default_chain(),
        }
    }

    pub fn with_event_settings(mut self, events: EventSettings) -> Self {
        self.events = events;
        self
    }

    /// Run the strategy chain; the first strategy that answers wins.
    pub fn resolve_site(&self, site: &CallSite, caller_type: TypeId) -> Option<(Resolution, &'static str)> {
        let cx = StrategyContext {
            index: self.index,
            caller_type,
        };
        self.strategies
            .iter()
            .find_map(|s| s.resolve(site, &cx).map(|r| (r, s.name())))
    }

    /// Best description of a call that leaves the corpus.
    pub fn external_target(&self, site: &CallSite, caller_type: TypeId) -> (ExternalTarget, CallKind, Confidence) {
        let index = self.index;
        let inherited = |t: TypeId| {
            let mut current = Some(t);
            while let Some(c) = current {
                if let Some(b) = index.external_base(c) {
                    return Some(b);
                }
                current = index.outer_of(c).filter(|&o| o != c);
            }
            None
        };
        let type_name: Option<String> = match &site.receiver {
            Receiver::Implicit | Receiver::This => inherited(caller_type),
            Receiver::Base => match index.base_type_id(caller_type) {
                Some(b) => index.external_base(b).or_else(|| Some(index.type_record(b).name.clone())),
                None => index
                    .type_record(caller_type)
                    .base_type
                    .as_deref()
                    .map(|b| simple_name(b).to_string()),
            },
            Receiver::Instance(t) | Receiver::Static(t) => match site.receiver_type {
                Some(id) => index
                    .external_base(id)
                    .or_else(|| Some(index.type_record(id).name.clone())),
                None => Some(simple_name(&normalize_type(t)).to_string()),
            },
            Receiver::Unknown(_) => None,
        };

        let found = type_name
            .as_deref()
            .and_then(|t| self.refs.find_method(t, &site.name));
        let (assembly, type_name, kind, confidence) = match found {
            Some((declaring, method)) => (
                Some(declaring.assembly.clone()),
                declaring.name.clone(),
                if method.is_virtual {
                    CallKind::Virtual
                } else {
                    CallKind::Direct
                },
                Confidence::Resolved,
            ),
            None => (
                type_name
                    .as_deref()
                    .and_then(|t| self.refs.assembly_of(t))
                    .map(str::to_string),
                type_name.unwrap_or_else(|| UNKNOWN_TYPE.to_string()),
                CallKind::Direct,
                Confidence::BestEffort,
            ),
        };
        let params: Vec<String> = site
            .arg_types
            .iter()
            .map(|a| a.clone().unwrap_or_else(|| "?".to_string()))
            .collect();
        let target = ExternalTarget {
            assembly,
            signature: signature_key(&type_name, &site.name, &params),
            type_name,
            method: site.name.clone(),
        };
        (target, kind, confidence)
    }

    fn edge(&self, site: &CallSite, env: &Env<'_>, node: Node<'_>) -> CallEdge {
        let (callee, kind, strategy, confidence) = match self.resolve_site(site, env.type_id) {
            Some((res, strategy)) => {
                let target = self.index.method(res.method);
                let owner = self.index.type_record(target.type_id);
                let kind = if target.is_virtual_dispatch() || owner.kind == TypeKind::Interface {
                    CallKind::Virtual
                } else {
                    CallKind::Direct
                };
                (Callee::Internal(res.method), kind, strategy, res.confidence)
            }
            None => {
                let (target, kind, confidence) = self.external_target(site, env.type_id);
                (Callee::External(target), kind, "external", confidence)
            }
        };
        CallEdge {
            caller: env.method.id,
            callee,
            kind,
            strategy: strategy.to_string(),
            confidence,
            file: env.method.file.clone(),
            line: line(node),
        }
    }

    /// Call edges of every method body in one file, in source order.
    pub fn resolve_file(&self, parsed: &ParsedFile) -> Vec<CallEdge> {
        let mut edges = Vec::new();
        for (id, body) in method_bodies(parsed, self.index) {
            let method = self.index.method(id);
            let env = Env::new(self, &parsed.source, method);
            walk_body(body, &env, &mut |node, scope| self.visit(node, scope, &env, &mut edges));

            let initializer = body
                .parent()
                .filter(|p| p.kind() == "constructor_declaration")
                .and_then(|p| child_of_kind(p, &["constructor_initializer"]));
            if let Some(init) = initializer {
                let scope = Scope::for_method(method);
                let chained_to_base = init
                    .child(1)
                    .map(|k| k.kind() == "base")
                    .unwrap_or_else(|| text(init, &parsed.source).contains("base"));
                let site = CallSite {
                    name: ".ctor".to_string(),
                    type_args: Vec::new(),
                    receiver: if chained_to_base { Receiver::Base } else { Receiver::This },
                    receiver_type: None,
                    arg_types: crate::ingest::csharp::call_arguments(init)
                        .iter()
                        .map(|a| scope::infer_type(a.expr, &scope, &env))
                        .collect(),
                };
                edges.push(self.edge(&site, &env, init));
            }
        }
        edges
    }

    fn visit(&self, node: Node<'_>, scope: &Scope, env: &Env<'_>, out: &mut Vec<CallEdge>) {
        let src = env.src;
        match node.kind() {
            "invocation_expression" => {
                if self.is_skipped_invocation(node, scope, env) {
                    return;
                }
                if let Some(site) = invocation_site(node, scope, env) {
                    out.push(self.edge(&site, env, node));
                }
            }
            "object_creation_expression" => {
                let Some(type_node) = field(node, &["type"]) else {
                    return;
                };
                let type_name = text(type_node, src);
                // `new Action(Handler)` wraps a method group
                if is_delegate_type(self.index, &normalize_type(type_name)) {
                    return;
                }
                let site = creation_site(node, type_name, scope, env);
                out.push(self.edge(&site, env, node));
                let initializer = field(node, &["initializer"])
                    .or_else(|| child_of_kind(node, &["initializer_expression"]));
                if let (Some(init), Some(type_id)) = (initializer, site.receiver_type) {
                    self.initializer_setters(init, type_id, env, out);
                }
            }
            "implicit_object_creation_expression" => {
                let target = node
                    .parent()
                    .and_then(|p| p.parent())
                    .filter(|d| d.kind() == "variable_declaration")
                    .and_then(|d| field(d, &["type"]))
                    .map(|t| text(t, src))
                    .filter(|t| *t != "var");
                if let Some(type_name) = target {
                    let site = creation_site(node, type_name, scope, env);
                    out.push(self.edge(&site, env, node));
                }
            }
            "member_access_expression" | "member_binding_expression" => {
                if is_field_of_parent(node, "function") {
                    return;
                }
                let receiver_expr = if node.kind() == "member_access_expression" {
                    field(node, &["expression"])
                } else {
                    conditional_receiver(node)
                };
                let (Some(receiver_expr), Some(name)) = (receiver_expr, member_name(node, src)) else {
                    return;
                };
                let receiver = classify_receiver(receiver_expr, scope, env);
                self.property_use(node, &name, receiver, env, out);
            }
            "identifier" => {
                if !is_value_identifier(node) || is_initializer_target(node) {
                    return;
                }
                let name = text(node, src).trim_start_matches('@');
                if scope.lookup(name).is_some() {
                    return;
                }
                self.property_use(node, name, Receiver::Implicit, env, out);
            }
            _ => {}
        }
    }

    /// Invocations that are not method calls: `nameof`, local functions,
    /// delegate locals, and anything the event pass records as a fire.
    fn is_skipped_invocation(&self, node: Node<'_>, scope: &Scope, env: &Env<'_>) -> bool {
        let Some(function) = invoked_function(node) else {
            return true;
        };
        let src = env.src;
        match function.kind() {
            "identifier" => {
                let name = text(function, src).trim_start_matches('@');
                if name == "nameof" || scope.lookup(name).is_some() {
                    return true;
                }
            }
            "member_access_expression" | "member_binding_expression"
                if member_name(function, src).as_deref() == Some("Invoke") =>
            {
                let receiver = if function.kind() == "member_access_expression" {
                    field(function, &["expression"])
                } else {
                    conditional_receiver(function)
                };
                let local = receiver
                    .filter(|r| r.kind() == "identifier")
                    .and_then(|r| scope.lookup(text(r, src)));
                if let Some(local) = local {
                    return local
                        .type_name
                        .as_deref()
                        .map_or(true, |t| is_delegate_type(self.index, t));
                }
            }
            _ => {}
        }
        fire_target(node, scope, env, &self.events).is_some()
    }

    /// Accessor edges for a use of a harvested property.
    fn property_use(&self, node: Node<'_>, name: &str, receiver: Receiver, env: &Env<'_>, out: &mut Vec<CallEdge>) {
        let owner = match &receiver {
            Receiver::Implicit => env
                .visible_member(name)
                .filter(|(_, m)| m.kind == crate::model::MemberKind::Property)
                .map(|(t, _)| t),
            r => receiver_type_id(r, env).and_then(|t| property_owner(self.index, t, name)),
        };
        if owner.is_none() {
            return;
        }
        let receiver_type = match &receiver {
            Receiver::Implicit => None,
            r => receiver_type_id(r, env),
        };
        let (reads, writes) = accessor_uses(node, env.src);
        for (used, prefix) in [(reads, "get_"), (writes, "set_")] {
            if !used {
                continue;
            }
            let site = CallSite {
                name: format!("{}{}", prefix, name),
                type_args: Vec::new(),
                receiver: receiver.clone(),
                receiver_type,
                arg_types: if prefix == "set_" { vec![None] } else { Vec::new() },
            };
            if self.resolve_site(&site, env.type_id).is_some() {
                out.push(self.edge(&site, env, node));
            }
        }
    }

    /// `new Foo { A = 1 }` calls `set_A` on the created type.
    fn initializer_setters(&self, init: Node<'_>, type_id: TypeId, env: &Env<'_>, out: &mut Vec<CallEdge>) {
        let type_name = self.index.type_record(type_id).name.clone();
        for assignment in named_children(init)
            .into_iter()
            .filter(|c| c.kind() == "assignment_expression")
        {
            let Some(name) = field(assignment, &["left"]).and_then(|l| member_name(l, env.src)) else {
                continue;
            };
            if property_owner(self.index, type_id, &name).is_none() {
                continue;
            }
            let site = CallSite {
                name: format!("set_{}", name),
                type_args: Vec::new(),
                receiver: Receiver::Instance(type_name.clone()),
                receiver_type: Some(type_id),
                arg_types: vec![None],
            };
            if self.resolve_site(&site, env.type_id).is_some() {
                out.push(self.edge(&site, env, assignment));
            }
        }
    }
}

/// Whether a property use reads it, writes it, or both (`x.P += 1`).
fn accessor_uses(node: Node<'_>, src: &str) -> (bool, bool) {
    let Some(parent) = node.parent() else {
        return (true, false);
    };
    match parent.kind() {
        "assignment_expression" if is_field_of_parent(node, "left") => {
            match assignment_operator(parent, src) {
                Some("=") => (false, true),
                _ => (true, true),
            }
        }
        "prefix_unary_expression" | "postfix_unary_expression" => {
            let t = text(parent, src);
            (true, t.contains("++") || t.contains("--"))
        }
        _ => (true, false),
    }
}

fn is_initializer_target(node: Node<'_>) -> bool {
    node.parent()
        .filter(|p| p.kind() == "assignment_expression")
        .and_then(|p| p.parent())
        .is_some_and(|g| g.kind() == "initializer_expression")
        && is_field_of_parent(node, "left")
}

/// Body nodes of the harvested methods declared in `parsed`, in id order.
pub fn method_bodies<'t>(parsed: &'t ParsedFile, index: &SymbolIndex) -> Vec<(MethodId, Node<'t>)> {
    let root = parsed.root();
    index
        .methods_in_file(&parsed.file.tree_id, &parsed.file.rel_path)
        .iter()
        .filter_map(|&id| {
            let (start, end) = index.method(id).body_range?;
            let mut node = root.descendant_for_byte_range(start, end)?;
            while !(node.start_byte() == start
                && node.end_byte() == end
                && matches!(node.kind(), "block" | "arrow_expression_clause"))
            {
                node = node.parent()?;
                if node.start_byte() < start || node.end_byte() > end {
                    return None;
                }
            }
            Some((id, node))
        })
        .collect()
}
