//! Code-side reads, writes and existence checks of named config properties.

use tree_sitter::Node;

use crate::ingest::csharp::{
    arguments, call_arguments, child_of_kind, field, is_field_of_parent, line, member_name,
    string_value, text, unwrap_parens,
};
use crate::ingest::ParsedFile;
use crate::model::types::simple_name;
use crate::model::{AccessKind, Confidence, MemberKind, PropertyAccess};
use crate::resolve::scope::{conditional_receiver, infer_type, invoked_function};
use crate::resolve::{method_bodies, walk_body, Env, Resolver, Scope};
use crate::settings::ResolutionSettings;

/// Property accesses in every method body of a file.
pub fn extract_file(
    resolver: &Resolver<'_>,
    parsed: &ParsedFile,
    settings: &ResolutionSettings,
) -> Vec<PropertyAccess> {
    let mut out = Vec::new();
    for (id, body) in method_bodies(parsed, resolver.index) {
        let env = Env::new(resolver, &parsed.source, resolver.index.method(id));
        let scanner = Scanner { env: &env, settings };
        walk_body(body, &env, &mut |node, scope| {
            let found = match node.kind() {
                "invocation_expression" => scanner.api_call(node, scope),
                "element_access_expression" => scanner.indexer(node, scope),
                _ => None,
            };
            out.extend(found);
        });
    }
    out
}

struct Scanner<'e, 'a> {
    env: &'e Env<'a>,
    settings: &'e ResolutionSettings,
}

impl Scanner<'_, '_> {
    fn access_kind(&self, api: &str) -> Option<AccessKind> {
        let has = |list: &[String]| list.iter().any(|a| a == api);
        if has(&self.settings.read_apis) {
            Some(AccessKind::Read)
        } else if has(&self.settings.existence_apis) {
            Some(AccessKind::ExistenceCheck)
        } else if has(&self.settings.write_apis) {
            Some(AccessKind::Write)
        } else {
            None
        }
    }

    /// `props.GetFloat("Damage")`, `props?.Contains(nameof(Range))`.
    fn api_call(&self, node: Node<'_>, scope: &Scope) -> Option<PropertyAccess> {
        let function = invoked_function(node)?;
        let receiver = match function.kind() {
            "member_access_expression" => field(function, &["expression"])?,
            "member_binding_expression" => conditional_receiver(function)?,
            _ => return None,
        };
        let api = member_name(function, self.env.src)?;
        let kind = self.access_kind(&api)?;
        let confidence = self.bag_confidence(receiver, scope)?;
        let name_arg = call_arguments(node).first()?.expr;
        let property_name = self.property_name(name_arg)?;
        Some(self.record(property_name, kind, api, confidence, node))
    }

    /// `props["Damage"]`, a write when it is an assignment target.
    fn indexer(&self, node: Node<'_>, scope: &Scope) -> Option<PropertyAccess> {
        let receiver = field(node, &["expression"]).or_else(|| node.named_child(0))?;
        let confidence = self.bag_confidence(receiver, scope)?;
        let list = field(node, &["subscript"])
            .or_else(|| child_of_kind(node, &["bracketed_argument_list"]))?;
        let key = arguments(list).first()?.expr;
        let property_name = self.property_name(key)?;
        let is_target = node
            .parent()
            .is_some_and(|p| p.kind() == "assignment_expression")
            && is_field_of_parent(node, "left");
        let kind = if is_target {
            AccessKind::Write
        } else {
            AccessKind::Read
        };
        Some(self.record(property_name, kind, "[]".to_string(), confidence, node))
    }

    /// Confidence that `receiver` is a property bag, `None` when it is not.
    fn bag_confidence(&self, receiver: Node<'_>, scope: &Scope) -> Option<Confidence> {
        let receiver = unwrap_parens(receiver);
        if let Some(t) = infer_type(receiver, scope, self.env) {
            let simple = simple_name(&t);
            if self.settings.property_bag_types.iter().any(|b| b == simple) {
                return Some(Confidence::Resolved);
            }
        }
        let last = member_name(receiver, self.env.src)?;
        self.settings
            .property_bag_members
            .iter()
            .any(|m| m.eq_ignore_ascii_case(&last))
            .then_some(Confidence::BestEffort)
    }

    /// Literal, `nameof`, or an identifier naming a string constant.
    fn property_name(&self, expr: Node<'_>) -> Option<String> {
        let expr = unwrap_parens(expr);
        if let Some(s) = string_value(expr, self.env.src) {
            return Some(s);
        }
        match expr.kind() {
            "invocation_expression" => {
                let function = field(expr, &["function"])?;
                if function.kind() != "identifier" || text(function, self.env.src) != "nameof" {
                    return None;
                }
                member_name(call_arguments(expr).first()?.expr, self.env.src)
            }
            "identifier" => {
                let name = text(expr, self.env.src);
                let (_, member) = self.env.visible_member(name)?;
                if member.kind != MemberKind::Constant {
                    return None;
                }
                member.const_value.clone()
            }
            _ => None,
        }
    }

    fn record(
        &self,
        property_name: String,
        kind: AccessKind,
        api: String,
        confidence: Confidence,
        node: Node<'_>,
    ) -> PropertyAccess {
        PropertyAccess {
            method_id: self.env.method.id,
            property_name,
            kind,
            api,
            confidence,
            file: self.env.method.file.clone(),
            line: line(node),
        }
    }
}
