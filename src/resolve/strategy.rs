//! Ordered call-resolution strategies.
//!
//! Each strategy looks at one call site and either names a harvested method
//! or declines. The resolver tries them in order and stops at the first hit.

use crate::model::types::{element_type, is_keyword_type, signature_key, simple_name};
use crate::model::{Confidence, MethodId, Parameter, SymbolIndex, TypeId};

/// What a call is made on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Receiver {
    /// Bare `M()` inside a type
    Implicit,
    This,
    Base,
    /// A value of the given (normalized) type
    Instance(String),
    /// A type name: static call or construction
    Static(String),
    /// A value of unknown type; carries the receiver text
    Unknown(String),
}

/// One invocation, construction or accessor use inside a method body.
#[derive(Debug, Clone)]
pub struct CallSite {
    pub name: String,
    /// Explicit generic arguments, normalized
    pub type_args: Vec<String>,
    pub receiver: Receiver,
    /// Harvested type the receiver resolved to
    pub receiver_type: Option<TypeId>,
    /// Inferred argument types, `None` where unknown
    pub arg_types: Vec<Option<String>>,
}

impl CallSite {
    pub fn argc(&self) -> usize {
        self.arg_types.len()
    }

    fn known_arg_types(&self) -> Option<Vec<String>> {
        self.arg_types.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub method: MethodId,
    pub confidence: Confidence,
}

/// Facts about the calling method shared by all strategies.
pub struct StrategyContext<'a> {
    pub index: &'a SymbolIndex,
    pub caller_type: TypeId,
}

impl StrategyContext<'_> {
    /// Types a call site is looked up on, nearest first.
    pub fn search_types(&self, site: &CallSite) -> Vec<TypeId> {
        match &site.receiver {
            Receiver::Implicit => {
                let mut types = vec![self.caller_type];
                let mut current = self.caller_type;
                while let Some(outer) = self.index.outer_of(current) {
                    if types.contains(&outer) {
                        break;
                    }
                    types.push(outer);
                    current = outer;
                }
                types
            }
            Receiver::This => vec![self.caller_type],
            Receiver::Base => self.index.base_type_id(self.caller_type).into_iter().collect(),
            Receiver::Instance(_) | Receiver::Static(_) => site.receiver_type.into_iter().collect(),
            Receiver::Unknown(_) => Vec::new(),
        }
    }
}

pub trait ResolveStrategy: Send + Sync {
    /// Name stored with every edge this strategy produces.
    fn name(&self) -> &'static str;

    fn resolve(&self, site: &CallSite, cx: &StrategyContext<'_>) -> Option<Resolution>;
}

/// The chain in resolution order.
pub fn default_chain() -> Vec<Box<dyn ResolveStrategy>> {
    vec![
        Box::new(ExactSymbol),
        Box::new(ReducedForm),
        Box::new(OverrideRemap),
        Box::new(SignatureString),
    ]
}

const NUMERIC_WIDENING: &[(&str, &[&str])] = &[
    ("sbyte", &["short", "int", "long", "float", "double", "decimal"]),
    ("byte", &["short", "ushort", "int", "uint", "long", "ulong", "float", "double", "decimal"]),
    ("short", &["int", "long", "float", "double", "decimal"]),
    ("ushort", &["int", "uint", "long", "ulong", "float", "double", "decimal"]),
    ("int", &["long", "float", "double", "decimal"]),
    ("uint", &["long", "ulong", "float", "double", "decimal"]),
    ("long", &["float", "double", "decimal"]),
    ("ulong", &["float", "double", "decimal"]),
    ("char", &["ushort", "int", "uint", "long", "ulong", "float", "double", "decimal"]),
    ("float", &["double"]),
];

fn widens(from: &str, to: &str) -> bool {
    NUMERIC_WIDENING
        .iter()
        .any(|(f, targets)| *f == from && targets.contains(&to))
}

/// `T`, `TKey`, `TValue[]`: names that look like generic parameters.
fn is_type_parameter(index: &SymbolIndex, name: &str) -> bool {
    let base = simple_name(name);
    let mut chars = base.chars();
    let looks = match (chars.next(), chars.next()) {
        (Some('T'), None) => true,
        (Some('T'), Some(c)) => c.is_ascii_uppercase(),
        _ => false,
    };
    looks && index.types_named(base).is_empty()
}

/// Compatibility of an argument with a parameter: `None` rules the overload out.
pub fn compatibility(index: &SymbolIndex, arg: Option<&str>, param: &str) -> Option<u32> {
    let Some(arg) = arg else {
        return Some(1);
    };
    if arg == param {
        return Some(3);
    }
    let (arg_simple, param_simple) = (simple_name(arg), simple_name(param));
    if arg_simple == param_simple {
        return Some(2);
    }
    if param == "object" || param == "dynamic" || is_type_parameter(index, param) {
        return Some(1);
    }
    if widens(arg, param) || param.strip_suffix('?') == Some(arg) {
        return Some(1);
    }
    let arg_ids = index.types_named(arg_simple);
    let param_ids = index.types_named(param_simple);
    if !arg_ids.is_empty() && !param_ids.is_empty() {
        let related = arg_ids
            .iter()
            .any(|&a| index.supertypes(a).iter().any(|s| param_ids.contains(s)));
        return related.then_some(1);
    }
    if is_keyword_type(arg) && is_keyword_type(param) {
        return None;
    }
    // One side is outside the corpus; nothing rules it out
    Some(1)
}

/// Pick the best-matching overload among `candidates`.
///
/// `skip_this` aligns arguments past the receiver parameter of an extension
/// method called in reduced form.
pub fn select_overload(
    index: &SymbolIndex,
    candidates: impl IntoIterator<Item = MethodId>,
    site: &CallSite,
    skip_this: bool,
) -> Option<Resolution> {
    let mut scored: Vec<(u32, MethodId)> = Vec::new();
    for id in candidates {
        let m = index.method(id);
        // Extension methods called in static form pass the receiver explicitly
        let arity_ok = if m.is_extension && !skip_this {
            site.argc() >= 1 && m.accepts_arity(site.argc() - 1)
        } else {
            m.accepts_arity(site.argc())
        };
        if !arity_ok {
            continue;
        }
        let params: Vec<_> = m
            .params
            .iter()
            .skip(usize::from(skip_this && m.is_extension))
            .collect();
        let element_score = |arg: Option<&str>, p: &Parameter| {
            element_type(&p.type_name).and_then(|e| compatibility(index, arg, &e))
        };
        let mut total = 0u32;
        let mut ok = true;
        for (i, arg) in site.arg_types.iter().enumerate() {
            let arg = arg.as_deref();
            let score = match params.get(i).copied() {
                Some(p) if p.is_params => {
                    compatibility(index, arg, &p.type_name).max(element_score(arg, p))
                }
                Some(p) => compatibility(index, arg, &p.type_name),
                // Extra arguments bind to the params array element
                None => params
                    .last()
                    .copied()
                    .filter(|p| p.is_params)
                    .and_then(|p| element_score(arg, p)),
            };
            match score {
                Some(s) => total += s,
                None => {
                    ok = false;
                    break;
                }
            }
        }
        if ok {
            scored.push((total, id));
        }
    }
    let best = scored.iter().map(|(s, _)| *s).max()?;
    let winners: Vec<MethodId> = scored
        .iter()
        .filter(|(s, _)| *s == best)
        .map(|(_, id)| *id)
        .collect();
    let method = *winners.iter().min()?;
    Some(Resolution {
        method,
        confidence: if winners.len() == 1 {
            Confidence::Resolved
        } else {
            Confidence::BestEffort
        },
    })
}

/// Declaration on the receiver type itself, looked up through the identity
/// map when all argument types are known.
///
/// Declines when the match is an override so that override remapping lands
/// every call on the root declaration.
pub struct ExactSymbol;

impl ResolveStrategy for ExactSymbol {
    fn name(&self) -> &'static str {
        "exact_symbol"
    }

    fn resolve(&self, site: &CallSite, cx: &StrategyContext<'_>) -> Option<Resolution> {
        let index = cx.index;
        for t in cx.search_types(site) {
            if let Some(args) = site.known_arg_types() {
                let key = format!(
                    "{}.{}({})",
                    index.type_record(t).full_name,
                    site.name,
                    args.join(",")
                );
                if let Some(id) = index.by_identity(&key) {
                    let m = index.method(id);
                    if m.type_params == 0 && site.type_args.is_empty() && m.type_id == t {
                        if m.modifiers.is_override {
                            return None;
                        }
                        return Some(Resolution {
                            method: id,
                            confidence: Confidence::Resolved,
                        });
                    }
                }
            }
            let candidates = index
                .methods_named(t, &site.name)
                .iter()
                .copied()
                .filter(|&id| index.method(id).type_params == 0 && site.type_args.is_empty());
            if let Some(res) = select_overload(index, candidates, site, false) {
                if index.method(res.method).modifiers.is_override {
                    return None;
                }
                return Some(res);
            }
        }
        None
    }
}

/// Generic invocations against their generic definition, and extension
/// methods called as `x.M()` against `static M(this X x)`.
pub struct ReducedForm;

impl ResolveStrategy for ReducedForm {
    fn name(&self) -> &'static str {
        "reduced_form"
    }

    fn resolve(&self, site: &CallSite, cx: &StrategyContext<'_>) -> Option<Resolution> {
        let index = cx.index;
        for t in cx.search_types(site) {
            let candidates = index.methods_named(t, &site.name).iter().copied().filter(|&id| {
                let m = index.method(id);
                m.type_params > 0
                    && (site.type_args.is_empty() || site.type_args.len() == m.type_params)
            });
            if let Some(res) = select_overload(index, candidates, site, false) {
                return Some(res);
            }
        }

        let receiver_type: Option<String> = match &site.receiver {
            Receiver::Instance(t) => Some(t.clone()),
            Receiver::This => Some(index.type_record(cx.caller_type).name.clone()),
            Receiver::Unknown(_) => None,
            Receiver::Implicit | Receiver::Base | Receiver::Static(_) => return None,
        };
        let candidates = index.extension_methods(&site.name).iter().copied().filter(|&id| {
            let m = index.method(id);
            let generic_ok = site.type_args.is_empty() || site.type_args.len() == m.type_params;
            let this_ok = match (m.params.first(), receiver_type.as_deref()) {
                (Some(p), Some(r)) => compatibility(index, Some(r), &p.type_name).is_some(),
                _ => true,
            };
            generic_ok && this_ok
        });
        let res = select_overload(index, candidates, site, true)?;
        Some(Resolution {
            method: res.method,
            confidence: if receiver_type.is_some() {
                res.confidence
            } else {
                Confidence::BestEffort
            },
        })
    }
}

/// Inherited members: walks the harvested base chain and interfaces from the
/// receiver type and remaps overrides to their root virtual declaration.
pub struct OverrideRemap;

/// Whether two declared parameter types can name the same slot of an
/// override: equal, or one side is a type parameter or unknown.
fn same_parameter(index: &SymbolIndex, a: &str, b: &str) -> bool {
    let unknown = |t: &str| t.is_empty() || t == "?" || is_type_parameter(index, t);
    a == b || simple_name(a) == simple_name(b) || unknown(a) || unknown(b)
}

/// Topmost virtual or abstract declaration along the base chain that `id` overrides.
///
/// An ancestor overload matches on exact parameter types. When none does,
/// a same-arity overload is taken only if it is the single one whose
/// parameters line up once type parameters and unknown types are allowed.
pub fn root_declaration(index: &SymbolIndex, id: MethodId) -> MethodId {
    let m = index.method(id);
    let params = m.param_types();
    let mut root = id;
    for ancestor in index.base_chain(m.type_id) {
        let same_arity: Vec<MethodId> = index
            .methods_named(ancestor, &m.name)
            .iter()
            .copied()
            .filter(|&c| index.method(c).params.len() == params.len())
            .collect();
        let exact = same_arity
            .iter()
            .copied()
            .find(|&c| index.method(c).param_types() == params);
        let found = exact.or_else(|| {
            let loose: Vec<MethodId> = same_arity
                .iter()
                .copied()
                .filter(|&c| {
                    index
                        .method(c)
                        .params
                        .iter()
                        .zip(&params)
                        .all(|(p, t)| same_parameter(index, &p.type_name, t))
                })
                .collect();
            match loose.as_slice() {
                [only] => Some(*only),
                _ => None,
            }
        });
        if let Some(c) = found.filter(|&c| index.method(c).is_virtual_dispatch()) {
            root = c;
        }
    }
    root
}

impl ResolveStrategy for OverrideRemap {
    fn name(&self) -> &'static str {
        "override_remap"
    }

    fn resolve(&self, site: &CallSite, cx: &StrategyContext<'_>) -> Option<Resolution> {
        let index = cx.index;
        for start in cx.search_types(site) {
            for t in std::iter::once(start).chain(index.supertypes(start)) {
                let candidates = index.methods_named(t, &site.name).iter().copied().filter(|&id| {
                    let m = index.method(id);
                    m.type_params == 0 || site.type_args.is_empty() || site.type_args.len() == m.type_params
                });
                if let Some(res) = select_overload(index, candidates, site, false) {
                    return Some(Resolution {
                        method: root_declaration(index, res.method),
                        confidence: res.confidence,
                    });
                }
            }
        }
        None
    }
}

/// Fallback on the textual `Type.Name(Args)` key, then on a unique
/// name-and-arity match under the textual receiver type.
pub struct SignatureString;

impl ResolveStrategy for SignatureString {
    fn name(&self) -> &'static str {
        "signature_string"
    }

    fn resolve(&self, site: &CallSite, cx: &StrategyContext<'_>) -> Option<Resolution> {
        let index = cx.index;
        let type_name = match &site.receiver {
            Receiver::Implicit | Receiver::This => index.type_record(cx.caller_type).name.clone(),
            Receiver::Base => simple_name(index.type_record(cx.caller_type).base_type.as_deref()?).to_string(),
            Receiver::Instance(t) | Receiver::Static(t) => simple_name(t).to_string(),
            Receiver::Unknown(_) => return None,
        };
        let best_effort = |method| Resolution {
            method,
            confidence: Confidence::BestEffort,
        };
        if let Some(args) = site.known_arg_types() {
            let ids = index.by_signature(&signature_key(&type_name, &site.name, &args));
            if ids.len() == 1 {
                return Some(best_effort(ids[0]));
            }
        }
        let candidates: Vec<MethodId> = index
            .types_named(&type_name)
            .iter()
            .flat_map(|&t| index.methods_named(t, &site.name).iter().copied())
            .filter(|&id| index.method(id).accepts_arity(site.argc()))
            .collect();
        match candidates.as_slice() {
            [only] => Some(best_effort(*only)),
            _ => None,
        }
    }
}
