//! Event flow: declarations, subscriptions and fires.
//!
//! Names are judged in priority order: the configured vocabulary, then the
//! naming convention (`On*`, `*Changed`, `*Event`), then semantic
//! confirmation that the symbol is a declared event or delegate-typed member.

use tree_sitter::Node;

use crate::ingest::csharp::{assignment_operator, field, line, member_name, text, unwrap_parens};
use crate::ingest::ParsedFile;
use crate::model::types::simple_name;
use crate::model::{
    EventDeclaration, EventFire, EventSubscription, Evidence, FireStyle, MemberKind, SubscriptionDirection,
    SymbolIndex, TypeId, UNKNOWN_TYPE,
};
use crate::resolve::scope::{
    classify_receiver, conditional_receiver, invoked_function, is_delegate_member, is_delegate_type,
    member_of,
};
use crate::resolve::{method_bodies, walk_body, Env, Receiver, Resolver, Scope};
use crate::settings::EventSettings;

/// Subscriptions and fires found in one file.
#[derive(Debug, Default)]
pub struct EventFacts {
    pub subscriptions: Vec<EventSubscription>,
    pub fires: Vec<EventFire>,
}

fn name_evidence(settings: &EventSettings, name: &str) -> Option<Evidence> {
    if settings.in_vocabulary(name) {
        Some(Evidence::Vocabulary)
    } else if settings.matches_convention(name) {
        Some(Evidence::Convention)
    } else {
        None
    }
}

/// Declared events, plus delegate-typed fields and properties whose name
/// passes the vocabulary or convention check.
pub fn event_declarations(index: &SymbolIndex, settings: &EventSettings) -> Vec<EventDeclaration> {
    let mut out = Vec::new();
    for member in &index.members {
        let (kind, evidence) = match member.kind {
            MemberKind::Event => (
                "event",
                name_evidence(settings, &member.name).unwrap_or(Evidence::Semantic),
            ),
            MemberKind::Field | MemberKind::Property if is_delegate_type(index, &member.type_name) => {
                match name_evidence(settings, &member.name) {
                    Some(e) => ("delegate_field", e),
                    None => continue,
                }
            }
            _ => continue,
        };
        let owner = index.type_record(member.type_id);
        out.push(EventDeclaration {
            owner_type_id: owner.id,
            owner: owner.name.clone(),
            name: member.name.clone(),
            delegate_type: member.type_name.clone(),
            declaration_kind: kind.to_string(),
            evidence,
            file: member.file.clone(),
            line: member.line,
        });
    }
    out
}

const LITERAL_KINDS: &[&str] = &[
    "integer_literal",
    "real_literal",
    "string_literal",
    "verbatim_string_literal",
    "raw_string_literal",
    "interpolated_string_expression",
    "boolean_literal",
    "character_literal",
    "null_literal",
];

/// Extract subscriptions and fires from every method body of a file.
///
/// Event names are judged with the resolver's event settings, so a fire
/// recorded here never also becomes a call edge.
pub fn extract_file(resolver: &Resolver<'_>, parsed: &ParsedFile) -> EventFacts {
    let mut facts = EventFacts::default();
    for (id, body) in method_bodies(parsed, resolver.index) {
        let env = Env::new(resolver, &parsed.source, resolver.index.method(id));
        let extractor = Extractor {
            env: &env,
            settings: &resolver.events,
        };
        walk_body(body, &env, &mut |node, scope| match node.kind() {
            "assignment_expression" => {
                if let Some(s) = extractor.subscription(node, scope) {
                    facts.subscriptions.push(s);
                }
            }
            "invocation_expression" => {
                if let Some(f) = extractor.fire(node, scope) {
                    facts.fires.push(f);
                }
            }
            _ => {}
        });
    }
    facts
}

struct Extractor<'e, 'a> {
    env: &'e Env<'a>,
    settings: &'e EventSettings,
}

impl Extractor<'_, '_> {
    fn index(&self) -> &SymbolIndex {
        self.env.index()
    }

    fn type_name(&self, id: TypeId) -> String {
        self.index().type_record(id).name.clone()
    }

    /// Owner of an event reached through `receiver` when the member itself is unknown.
    fn receiver_owner(&self, receiver: &Receiver) -> String {
        match receiver {
            Receiver::Implicit | Receiver::This => self.type_name(self.env.type_id),
            Receiver::Base => self
                .index()
                .type_record(self.env.type_id)
                .base_type
                .as_deref()
                .map(|b| simple_name(b).to_string())
                .unwrap_or_else(|| UNKNOWN_TYPE.to_string()),
            Receiver::Instance(t) | Receiver::Static(t) => simple_name(t).to_string(),
            Receiver::Unknown(_) => UNKNOWN_TYPE.to_string(),
        }
    }

    /// Owner type name for an event expression (`E`, `x.E`, `x?.E`).
    fn owner_of(&self, expr: Node<'_>, scope: &Scope) -> String {
        if let Some((t, _)) = member_of(expr, scope, self.env) {
            return self.type_name(t);
        }
        let receiver_expr = match expr.kind() {
            "member_access_expression" => field(expr, &["expression"]),
            "member_binding_expression" => conditional_receiver(expr),
            _ => None,
        };
        match receiver_expr {
            Some(r) => self.receiver_owner(&classify_receiver(r, scope, self.env)),
            None => self.receiver_owner(&Receiver::Implicit),
        }
    }

    /// `x.E += Handler` and `E -= (a) => ...`.
    fn subscription(&self, node: Node<'_>, scope: &Scope) -> Option<EventSubscription> {
        let env = self.env;
        let direction = match assignment_operator(node, env.src)? {
            "+=" => SubscriptionDirection::Add,
            "-=" => SubscriptionDirection::Remove,
            _ => return None,
        };
        let left = unwrap_parens(field(node, &["left"])?);
        let right = unwrap_parens(field(node, &["right"])?);
        if LITERAL_KINDS.contains(&right.kind()) {
            return None;
        }
        let name = member_name(left, env.src)?;
        if left.kind() == "identifier" && scope.lookup(&name).is_some() {
            return None;
        }
        let semantic = match member_of(left, scope, env) {
            Some((_, m)) if is_delegate_member(self.index(), m) => true,
            Some(_) => return None,
            None => false,
        };
        let handler = self.handler_name(right, scope)?;
        let evidence = name_evidence(self.settings, &name).or(semantic.then_some(Evidence::Semantic))?;
        Some(EventSubscription {
            subscriber_type_id: env.type_id,
            subscriber_method_id: env.method.id,
            event_owner: self.owner_of(left, scope),
            event_name: name,
            handler,
            direction,
            evidence,
            file: env.method.file.clone(),
            line: line(node),
        })
    }

    /// Name of the handler on the right of `+=`; `None` when it cannot be a delegate.
    fn handler_name(&self, right: Node<'_>, scope: &Scope) -> Option<String> {
        let env = self.env;
        match right.kind() {
            "lambda_expression" => Some("<lambda>".to_string()),
            "anonymous_method_expression" => Some("<anonymous>".to_string()),
            "object_creation_expression" => {
                // `new EventHandler(OnClick)`
                let type_name = field(right, &["type"]).map(|t| text(t, env.src))?;
                if !is_delegate_type(self.index(), type_name) {
                    return None;
                }
                crate::ingest::csharp::call_arguments(right)
                    .first()
                    .and_then(|a| member_name(a.expr, env.src))
                    .or_else(|| Some(simple_name(type_name).to_string()))
            }
            "identifier" => {
                let name = member_name(right, env.src)?;
                if let Some(local) = scope.lookup(&name) {
                    let is_delegate = local
                        .type_name
                        .as_deref()
                        .map_or(true, |t| is_delegate_type(self.index(), t));
                    return is_delegate.then_some(name);
                }
                if env.is_method_name(&name) {
                    return Some(name);
                }
                match member_of(right, scope, env) {
                    Some((_, m)) if !is_delegate_member(self.index(), m) => None,
                    _ => Some(name),
                }
            }
            "member_access_expression" | "generic_name" => {
                let name = member_name(right, env.src)?;
                match member_of(right, scope, env) {
                    Some((_, m)) if !is_delegate_member(self.index(), m) => None,
                    _ => Some(name),
                }
            }
            _ => None,
        }
    }

    fn fire(&self, node: Node<'_>, scope: &Scope) -> Option<EventFire> {
        let env = self.env;
        let fired = fire_target(node, scope, env, self.settings)?;
        let guarded = fired.conditional || null_guarded(node, text(fired.target, env.src), env.src);
        Some(EventFire {
            firing_type_id: env.type_id,
            firing_method_id: env.method.id,
            event_owner: self.owner_of(fired.target, scope),
            event_name: fired.name,
            style: fired.style,
            guarded,
            evidence: fired.evidence,
            file: env.method.file.clone(),
            line: line(node),
        })
    }
}

/// An invocation that fires an event or delegate member.
pub(crate) struct FireTarget<'t> {
    /// The event expression (`E`, `x.E`), without any `.Invoke`.
    pub target: Node<'t>,
    pub name: String,
    pub style: FireStyle,
    pub conditional: bool,
    pub evidence: Evidence,
}

/// Classify `E(...)`, `E.Invoke(...)`, `E?.Invoke(...)` as a fire.
///
/// The call-graph pass drops the edge for every invocation accepted here.
pub(crate) fn fire_target<'t>(
    node: Node<'t>,
    scope: &Scope,
    env: &Env<'_>,
    settings: &EventSettings,
) -> Option<FireTarget<'t>> {
    let function = invoked_function(node)?;
    let (target, style, conditional) = match function.kind() {
        "identifier" => (function, FireStyle::Direct, false),
        "member_access_expression" | "member_binding_expression" => {
            let conditional = function.kind() == "member_binding_expression";
            if member_name(function, env.src).as_deref() == Some("Invoke") {
                let receiver = if conditional {
                    conditional_receiver(function)?
                } else {
                    field(function, &["expression"])?
                };
                (unwrap_parens(receiver), FireStyle::Invoke, conditional)
            } else {
                (function, FireStyle::Direct, conditional)
            }
        }
        _ => return None,
    };

    let name = member_name(target, env.src)?;
    if target.kind() == "identifier" {
        if scope.lookup(&name).is_some() {
            return None;
        }
        if style == FireStyle::Direct && env.is_method_name(&name) {
            return None;
        }
    }
    let evidence = match member_of(target, scope, env) {
        Some((_, m)) if is_delegate_member(env.index(), m) => Evidence::Semantic,
        Some(_) => return None,
        // Unresolved member calls are ordinary calls
        None if target.kind() != "identifier" && style == FireStyle::Direct => return None,
        None => name_evidence(settings, &name)?,
    };
    Some(FireTarget {
        target,
        name,
        style,
        conditional,
        evidence,
    })
}

/// Whether `node` sits in the then-branch of `if (target != null)`.
fn null_guarded(node: Node<'_>, target: &str, src: &str) -> bool {
    let target: String = target.split_whitespace().collect();
    let patterns = [
        format!("{}!=null", target),
        format!("null!={}", target),
        format!("{}isnotnull", target),
    ];
    let mut child = node;
    let mut current = node.parent();
    while let Some(n) = current {
        match n.kind() {
            "if_statement" => {
                let in_then = field(n, &["consequence"]).is_some_and(|c| c.id() == child.id());
                let condition: String = field(n, &["condition"])
                    .map(|c| text(c, src).split_whitespace().collect())
                    .unwrap_or_default();
                if in_then && patterns.iter().any(|p| condition.contains(p.as_str())) {
                    return true;
                }
            }
            "method_declaration" | "local_function_statement" | "lambda_expression"
            | "accessor_declaration" | "constructor_declaration" => return false,
            _ => {}
        }
        child = n;
        current = n.parent();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discover::SourceFile;
    use crate::ingest::parse_source;
    use crate::model::harvest_file;
    use crate::refs::ReferenceIndex;
    use std::path::PathBuf;

    const SOURCE: &str = "using System;\n\
        class Health {\n\
          public event Action<int> OnDamaged;\n\
          public Action Died;\n\
          public int Count;\n\
          void Hit() {\n\
            OnDamaged?.Invoke(3);\n\
            if (Died != null) Died();\n\
            Count += 1;\n\
            Heal();\n\
          }\n\
          void Heal() {}\n\
        }\n\
        class Hud {\n\
          void Bind(Health h) { h.OnDamaged += Show; h.OnDamaged -= (x) => {}; h.Count += 2; }\n\
          void Show(int x) {}\n\
        }";

    fn facts() -> (SymbolIndex, EventFacts) {
        let file = SourceFile {
            path: PathBuf::from("Health.cs"),
            rel_path: "Health.cs".into(),
            tree_id: "Game".into(),
            extension: None,
        };
        let parsed = parse_source(file, SOURCE.to_string(), String::new()).unwrap();
        let index = SymbolIndex::build(vec![harvest_file(&parsed)], &ReferenceIndex::new());
        let refs = ReferenceIndex::new();
        let facts = {
            let resolver = Resolver::new(&index, &refs);
            extract_file(&resolver, &parsed)
        };
        (index, facts)
    }

    #[test]
    fn test_declarations_use_name_evidence_first() {
        let (index, _) = facts();
        let decls = event_declarations(&index, &EventSettings::default());
        let summary: Vec<_> = decls
            .iter()
            .map(|d| (d.name.as_str(), d.declaration_kind.as_str(), d.evidence))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("OnDamaged", "event", Evidence::Convention),
                ("Died", "delegate_field", Evidence::Vocabulary),
            ]
        );
    }

    #[test]
    fn test_fires_and_guards() {
        let (_, facts) = facts();
        let fires: Vec<_> = facts
            .fires
            .iter()
            .map(|f| (f.event_owner.as_str(), f.event_name.as_str(), f.style, f.guarded))
            .collect();
        assert_eq!(
            fires,
            vec![
                ("Health", "OnDamaged", FireStyle::Invoke, true),
                ("Health", "Died", FireStyle::Direct, true),
            ]
        );
        assert!(facts.fires.iter().all(|f| f.evidence == Evidence::Semantic));
    }

    #[test]
    fn test_unresolved_fire_is_not_also_a_call() {
        let file = SourceFile {
            path: PathBuf::from("Panel.cs"),
            rel_path: "Panel.cs".into(),
            tree_id: "Game".into(),
            extension: None,
        };
        let src = "class Panel {\n\
              void Refresh(Model model) {\n\
                OnChanged();\n\
                model.OnChanged.Invoke();\n\
                Helper.Compute();\n\
                Refresh(model);\n\
              }\n\
            }";
        let parsed = parse_source(file, src.to_string(), String::new()).unwrap();
        let index = SymbolIndex::build(vec![harvest_file(&parsed)], &ReferenceIndex::new());
        let refs = ReferenceIndex::new();
        let resolver = Resolver::new(&index, &refs);

        let facts = extract_file(&resolver, &parsed);
        let fires: Vec<_> = facts
            .fires
            .iter()
            .map(|f| (f.event_name.as_str(), f.style, f.evidence))
            .collect();
        assert_eq!(
            fires,
            vec![
                ("OnChanged", FireStyle::Direct, Evidence::Convention),
                ("OnChanged", FireStyle::Invoke, Evidence::Convention),
            ]
        );

        let edges = resolver.resolve_file(&parsed);
        assert_eq!(edges.len(), 2);
        for fire in &facts.fires {
            assert!(edges.iter().all(|e| e.line != fire.line), "line {} is both", fire.line);
        }
    }

    #[test]
    fn test_subscriptions_reject_literals() {
        let (index, facts) = facts();
        let subs: Vec<_> = facts
            .subscriptions
            .iter()
            .map(|s| (s.event_owner.as_str(), s.event_name.as_str(), s.handler.as_str(), s.direction))
            .collect();
        assert_eq!(
            subs,
            vec![
                ("Health", "OnDamaged", "Show", SubscriptionDirection::Add),
                ("Health", "OnDamaged", "<lambda>", SubscriptionDirection::Remove),
            ]
        );
        let hud = index.types_named("Hud")[0];
        assert!(facts.subscriptions.iter().all(|s| s.subscriber_type_id == hud));
    }
}
