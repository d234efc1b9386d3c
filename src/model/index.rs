//! Corpus-wide symbol index.
//!
//! Built once per build session from the per-file harvests. Files arrive in
//! sorted path order, so ids assigned here are stable across runs on the same
//! input.

use ahash::{AHashMap, AHashSet};
use std::collections::VecDeque;

use super::harvest::{DelegateDecl, FileHarvest};
use super::types::{normalize_type, signature_key, simple_name};
use super::{
    Accessibility, MemberRecord, MethodId, MethodKind, MethodRecord, Modifiers, TypeId, TypeKind,
    TypeRecord,
};
use crate::refs::ReferenceIndex;

/// Where a type name is being looked up from.
#[derive(Debug, Clone, Copy)]
pub struct TypeContext<'a> {
    pub tree: &'a str,
    pub type_id: Option<TypeId>,
    pub namespace: &'a str,
    pub usings: &'a [String],
}

/// Lookup tables over all harvested entities.
#[derive(Debug, Default)]
pub struct SymbolIndex {
    pub types: Vec<TypeRecord>,
    pub methods: Vec<MethodRecord>,
    pub members: Vec<MemberRecord>,
    pub delegates: Vec<DelegateDecl>,
    type_by_key: AHashMap<(String, String), TypeId>,
    types_by_full: AHashMap<String, Vec<TypeId>>,
    types_by_simple: AHashMap<String, Vec<TypeId>>,
    identity: AHashMap<String, MethodId>,
    by_signature: AHashMap<String, Vec<MethodId>>,
    by_type_name: AHashMap<(TypeId, String), Vec<MethodId>>,
    extension_methods: AHashMap<String, Vec<MethodId>>,
    member_by_type: AHashMap<(TypeId, String), usize>,
    methods_by_file: AHashMap<(String, String), Vec<MethodId>>,
    usings: AHashMap<(String, String), Vec<String>>,
    base_of: AHashMap<TypeId, TypeId>,
    interfaces_of: AHashMap<TypeId, Vec<TypeId>>,
    derived: AHashMap<TypeId, Vec<TypeId>>,
    delegate_names: AHashSet<String>,
}

const EMPTY_IDS: &[MethodId] = &[];

/// Guard against inheritance cycles in malformed input.
const MAX_HIERARCHY_DEPTH: usize = 64;

/// `IDamageable` style names are taken as interfaces when nothing else is known.
pub fn looks_like_interface(name: &str) -> bool {
    let mut chars = simple_name(name).chars();
    chars.next() == Some('I') && chars.next().is_some_and(|c| c.is_ascii_uppercase())
}

impl SymbolIndex {
    /// Merge harvests (already in sorted file order) into one index.
    pub fn build(harvests: Vec<FileHarvest>, refs: &ReferenceIndex) -> Self {
        let mut index = SymbolIndex::default();
        for harvest in harvests {
            index.merge_file(harvest);
        }
        index.synthesize_implicit_constructors();
        index.split_bases(refs);
        index.build_method_maps();
        index
    }

    fn merge_file(&mut self, harvest: FileHarvest) {
        let mut local_to_global: Vec<TypeId> = Vec::with_capacity(harvest.types.len());
        for mut t in harvest.types {
            let key = (t.tree.clone(), t.full_name.clone());
            if let Some(&existing) = self.type_by_key.get(&key) {
                // Partial declarations merge into the first one seen
                let merged = &mut self.types[(existing - 1) as usize];
                for base in t.bases {
                    if !merged.bases.contains(&base) {
                        merged.bases.push(base);
                    }
                }
                merged.modifiers.is_abstract |= t.modifiers.is_abstract;
                merged.modifiers.is_sealed |= t.modifiers.is_sealed;
                merged.modifiers.is_static |= t.modifiers.is_static;
                merged.modifiers.is_partial |= t.modifiers.is_partial;
                local_to_global.push(existing);
                continue;
            }
            let id = self.types.len() as TypeId + 1;
            t.id = id;
            self.type_by_key.insert(key, id);
            self.types_by_full.entry(t.full_name.clone()).or_default().push(id);
            self.types_by_simple.entry(t.name.clone()).or_default().push(id);
            self.types.push(t);
            local_to_global.push(id);
        }

        let file_key = (harvest.tree.clone(), harvest.file.clone());
        for (local, mut m) in harvest.methods {
            let id = self.methods.len() as MethodId + 1;
            m.id = id;
            m.type_id = local_to_global[local];
            self.methods_by_file.entry(file_key.clone()).or_default().push(id);
            self.methods.push(m);
        }
        for (local, mut member) in harvest.members {
            member.type_id = local_to_global[local];
            self.member_by_type
                .entry((member.type_id, member.name.clone()))
                .or_insert(self.members.len());
            self.members.push(member);
        }
        for d in harvest.delegates {
            self.delegate_names.insert(d.name.clone());
            self.delegates.push(d);
        }
        self.usings.insert(file_key, harvest.usings);
    }

    /// Classes and structs without a declared instance constructor get `.ctor()`.
    fn synthesize_implicit_constructors(&mut self) {
        let with_ctor: AHashSet<TypeId> = self
            .methods
            .iter()
            .filter(|m| m.kind == MethodKind::Constructor)
            .map(|m| m.type_id)
            .collect();
        let mut synthetic = Vec::new();
        for t in &self.types {
            let constructible = matches!(t.kind, TypeKind::Class | TypeKind::Struct | TypeKind::Record)
                && !t.modifiers.is_static;
            if !constructible || with_ctor.contains(&t.id) {
                continue;
            }
            let accessibility = if t.modifiers.is_abstract {
                Accessibility::Protected
            } else {
                Accessibility::Public
            };
            synthetic.push(MethodRecord {
                id: 0,
                type_id: t.id,
                name: ".ctor".to_string(),
                params: Vec::new(),
                signature: signature_key(&t.name, ".ctor", &[]),
                return_type: "void".to_string(),
                modifiers: Modifiers {
                    accessibility: Some(accessibility),
                    ..Modifiers::default()
                },
                kind: MethodKind::Constructor,
                type_params: 0,
                is_extension: false,
                synthetic: true,
                file: t.file.clone(),
                start_line: t.line,
                end_line: t.line,
                body_range: None,
                body: String::new(),
            });
        }
        for mut m in synthetic {
            m.id = self.methods.len() as MethodId + 1;
            self.methods.push(m);
        }
    }

    /// Split written base lists into base type and interfaces.
    fn split_bases(&mut self, refs: &ReferenceIndex) {
        let mut updates = Vec::with_capacity(self.types.len());
        for t in &self.types {
            let ctx = self.context_for_type(t.id);
            let mut base_type = None;
            let mut base_id = None;
            let mut interfaces = Vec::new();
            let mut interface_ids = Vec::new();
            for (i, base) in t.bases.iter().enumerate() {
                let resolved = self.resolve_type(base, &ctx).filter(|&id| id != t.id);
                let is_interface = match (t.kind, resolved) {
                    (TypeKind::Interface | TypeKind::Struct, _) => true,
                    (_, Some(id)) => self.type_record(id).kind == TypeKind::Interface,
                    (_, None) => match refs.lookup(simple_name(base)) {
                        Some(r) => r.is_interface,
                        None => looks_like_interface(base),
                    },
                };
                if is_interface || i > 0 || base_type.is_some() {
                    interfaces.push(base.clone());
                    interface_ids.extend(resolved);
                } else {
                    base_type = Some(base.clone());
                    base_id = resolved;
                }
            }
            updates.push((t.id, base_type, base_id, interfaces, interface_ids));
        }
        for (id, base_type, base_id, interfaces, interface_ids) in updates {
            let t = &mut self.types[(id - 1) as usize];
            t.base_type = base_type;
            t.interfaces = interfaces;
            if let Some(b) = base_id {
                self.base_of.insert(id, b);
                self.derived.entry(b).or_default().push(id);
            }
            for &i in &interface_ids {
                self.derived.entry(i).or_default().push(id);
            }
            if !interface_ids.is_empty() {
                self.interfaces_of.insert(id, interface_ids);
            }
        }
    }

    fn build_method_maps(&mut self) {
        for m in &self.methods {
            let t = &self.types[(m.type_id - 1) as usize];
            let identity = format!("{}.{}({})", t.full_name, m.name, m.param_types().join(","));
            self.identity.entry(identity).or_insert(m.id);
            self.by_signature.entry(m.signature.clone()).or_default().push(m.id);
            self.by_type_name
                .entry((m.type_id, m.name.clone()))
                .or_default()
                .push(m.id);
            if m.is_extension {
                self.extension_methods.entry(m.name.clone()).or_default().push(m.id);
            }
        }
    }

    pub fn type_record(&self, id: TypeId) -> &TypeRecord {
        &self.types[(id - 1) as usize]
    }

    pub fn method(&self, id: MethodId) -> &MethodRecord {
        &self.methods[(id - 1) as usize]
    }

    pub fn get_type(&self, id: TypeId) -> Option<&TypeRecord> {
        usize::try_from(id - 1).ok().and_then(|i| self.types.get(i))
    }

    pub fn get_method(&self, id: MethodId) -> Option<&MethodRecord> {
        usize::try_from(id - 1).ok().and_then(|i| self.methods.get(i))
    }

    pub fn method_owner(&self, id: MethodId) -> &TypeRecord {
        self.type_record(self.method(id).type_id)
    }

    /// Lookup context for code inside `type_id`.
    pub fn context_for_type(&self, type_id: TypeId) -> TypeContext<'_> {
        let t = self.type_record(type_id);
        TypeContext {
            tree: &t.tree,
            type_id: Some(type_id),
            namespace: &t.namespace,
            usings: self.usings_for(&t.tree, &t.file),
        }
    }

    pub fn usings_for(&self, tree: &str, file: &str) -> &[String] {
        self.usings
            .get(&(tree.to_string(), file.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Resolve a written type name to a harvested type.
    ///
    /// Nested types of the current type and its outers win; otherwise the
    /// candidate from the same tree, then the base corpus, then matching
    /// namespace or `using`.
    pub fn resolve_type(&self, name: &str, ctx: &TypeContext<'_>) -> Option<TypeId> {
        let raw: String = name.split_whitespace().collect();
        let raw = raw.strip_prefix("global::").unwrap_or(&raw);
        let raw_base = raw.split(['<', '[', '?']).next().unwrap_or(raw);
        if raw_base.is_empty() {
            return None;
        }

        if raw_base.contains('.') {
            if let Some(ids) = self.types_by_full.get(raw_base) {
                return self.pick(ids, ctx);
            }
            // `Outer.Inner` or a partially qualified name
            let suffix = format!(".{}", raw_base);
            let last = raw_base.rsplit('.').next().unwrap_or(raw_base);
            let ids: Vec<TypeId> = self
                .types_by_simple
                .get(last)
                .map(|ids| {
                    ids.iter()
                        .copied()
                        .filter(|&id| self.type_record(id).full_name.ends_with(&suffix))
                        .collect()
                })
                .unwrap_or_default();
            if !ids.is_empty() {
                return self.pick(&ids, ctx);
            }
        }

        let simple = simple_name(&normalize_type(raw_base)).to_string();
        // Nested types visible from the current type and its outers
        let mut scope = ctx.type_id.map(|id| self.type_record(id).full_name.clone());
        while let Some(full) = scope {
            let candidate = format!("{}.{}", full, simple);
            if let Some(ids) = self.types_by_full.get(&candidate) {
                return self.pick(ids, ctx);
            }
            scope = full.rsplit_once('.').map(|(outer, _)| outer.to_string());
        }

        let ids = self.types_by_simple.get(&simple)?;
        self.pick(ids, ctx)
    }

    fn pick(&self, ids: &[TypeId], ctx: &TypeContext<'_>) -> Option<TypeId> {
        ids.iter()
            .copied()
            .max_by_key(|&id| {
                let t = self.type_record(id);
                let tree_score = if t.tree == ctx.tree {
                    2
                } else if !t.tree.starts_with("mod:") {
                    1
                } else {
                    0
                };
                let ns_score = if t.namespace == ctx.namespace
                    || ctx.namespace.starts_with(&format!("{}.", t.namespace))
                {
                    2
                } else if ctx.usings.iter().any(|u| *u == t.namespace) {
                    1
                } else {
                    0
                };
                // Lower ids win ties
                (tree_score, ns_score, std::cmp::Reverse(id))
            })
    }

    pub fn types_named(&self, simple: &str) -> &[TypeId] {
        self.types_by_simple.get(simple).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn methods_named(&self, type_id: TypeId, name: &str) -> &[MethodId] {
        self.by_type_name
            .get(&(type_id, name.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(EMPTY_IDS)
    }

    pub fn by_identity(&self, key: &str) -> Option<MethodId> {
        self.identity.get(key).copied()
    }

    pub fn by_signature(&self, key: &str) -> &[MethodId] {
        self.by_signature.get(key).map(Vec::as_slice).unwrap_or(EMPTY_IDS)
    }

    pub fn extension_methods(&self, name: &str) -> &[MethodId] {
        self.extension_methods
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(EMPTY_IDS)
    }

    pub fn methods_in_file(&self, tree: &str, file: &str) -> &[MethodId] {
        self.methods_by_file
            .get(&(tree.to_string(), file.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(EMPTY_IDS)
    }

    /// Member declared directly on `type_id`.
    pub fn member(&self, type_id: TypeId, name: &str) -> Option<&MemberRecord> {
        self.member_by_type
            .get(&(type_id, name.to_string()))
            .map(|&i| &self.members[i])
    }

    /// Member on `type_id` or an ancestor, with the declaring type.
    pub fn find_member(&self, type_id: TypeId, name: &str) -> Option<(TypeId, &MemberRecord)> {
        std::iter::once(type_id)
            .chain(self.supertypes(type_id))
            .find_map(|t| self.member(t, name).map(|m| (t, m)))
    }

    /// Enclosing type of a nested declaration.
    pub fn outer_of(&self, type_id: TypeId) -> Option<TypeId> {
        let t = self.type_record(type_id);
        let outer = t.outer.as_ref()?;
        self.type_by_key.get(&(t.tree.clone(), outer.clone())).copied()
    }

    pub fn base_type_id(&self, type_id: TypeId) -> Option<TypeId> {
        self.base_of.get(&type_id).copied()
    }

    pub fn interface_ids(&self, type_id: TypeId) -> &[TypeId] {
        self.interfaces_of
            .get(&type_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Harvested base classes, nearest first.
    pub fn base_chain(&self, type_id: TypeId) -> Vec<TypeId> {
        let mut chain = Vec::new();
        let mut current = type_id;
        while let Some(b) = self.base_type_id(current) {
            if b == type_id || chain.contains(&b) || chain.len() >= MAX_HIERARCHY_DEPTH {
                break;
            }
            chain.push(b);
            current = b;
        }
        chain
    }

    /// All harvested ancestors: the base chain first, then interfaces breadth-first.
    pub fn supertypes(&self, type_id: TypeId) -> Vec<TypeId> {
        let mut out = self.base_chain(type_id);
        let mut queue: VecDeque<TypeId> = std::iter::once(type_id).chain(out.clone()).collect();
        let mut seen: AHashSet<TypeId> = queue.iter().copied().collect();
        while let Some(t) = queue.pop_front() {
            for &i in self.interface_ids(t) {
                if seen.insert(i) {
                    out.push(i);
                    queue.push_back(i);
                }
            }
        }
        out
    }

    pub fn derived(&self, type_id: TypeId) -> &[TypeId] {
        self.derived.get(&type_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every subclass and implementer, transitively, in id order.
    pub fn descendants(&self, type_id: TypeId) -> Vec<TypeId> {
        let mut seen = AHashSet::new();
        let mut queue: VecDeque<TypeId> = self.derived(type_id).iter().copied().collect();
        while let Some(t) = queue.pop_front() {
            if t != type_id && seen.insert(t) {
                queue.extend(self.derived(t).iter().copied());
            }
        }
        let mut out: Vec<TypeId> = seen.into_iter().collect();
        out.sort_unstable();
        out
    }

    /// Written base type that leaves the corpus, found along the base chain.
    pub fn external_base(&self, type_id: TypeId) -> Option<String> {
        let mut current = type_id;
        for _ in 0..MAX_HIERARCHY_DEPTH {
            let t = self.type_record(current);
            match (self.base_type_id(current), &t.base_type) {
                (Some(b), _) => current = b,
                (None, Some(name)) => return Some(simple_name(name).to_string()),
                (None, None) => return None,
            }
        }
        None
    }

    pub fn is_delegate_type(&self, name: &str) -> bool {
        self.delegate_names.contains(simple_name(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discover::SourceFile;
    use crate::ingest::parse_source;
    use crate::model::harvest_file;
    use std::path::PathBuf;

    fn index_of(files: &[(&str, &str, &str)]) -> SymbolIndex {
        let harvests = files
            .iter()
            .map(|(tree, path, src)| {
                let file = SourceFile {
                    path: PathBuf::from(path),
                    rel_path: path.to_string(),
                    tree_id: tree.to_string(),
                    extension: None,
                };
                harvest_file(&parse_source(file, src.to_string(), String::new()).unwrap())
            })
            .collect();
        SymbolIndex::build(harvests, &ReferenceIndex::new())
    }

    #[test]
    fn test_partial_classes_merge() {
        let index = index_of(&[
            ("Game", "A.cs", "namespace G { partial class Foo : Base { void A() {} } }"),
            ("Game", "B.cs", "namespace G { partial class Foo : IThing { void B() {} } }"),
        ]);
        let foos = index.types_named("Foo");
        assert_eq!(foos.len(), 1);
        let foo = index.type_record(foos[0]);
        assert_eq!(foo.bases, vec!["Base".to_string(), "IThing".to_string()]);
        assert_eq!(foo.base_type.as_deref(), Some("Base"));
        assert_eq!(foo.interfaces, vec!["IThing".to_string()]);
        assert_eq!(index.methods_named(foo.id, "A").len(), 1);
        assert_eq!(index.methods_named(foo.id, "B").len(), 1);
        // Every method belongs to exactly one existing type
        assert!(index.methods.iter().all(|m| index.get_type(m.type_id).is_some()));
    }

    #[test]
    fn test_implicit_constructor_synthesized_once() {
        let index = index_of(&[(
            "Game",
            "A.cs",
            "class Plain {} class WithCtor { WithCtor(int x) {} } static class Util {} interface IX {}",
        )]);
        let ctors: Vec<_> = index
            .methods
            .iter()
            .filter(|m| m.name == ".ctor")
            .map(|m| (index.type_record(m.type_id).name.as_str(), m.synthetic))
            .collect();
        assert_eq!(ctors, vec![("WithCtor", false), ("Plain", true)]);
    }

    #[test]
    fn test_identity_and_signature_maps() {
        let index = index_of(&[(
            "Game",
            "A.cs",
            "namespace G { class Foo { void Bar() {} void Bar(System.Int32 x) {} } }",
        )]);
        assert!(index.by_identity("G.Foo.Bar()").is_some());
        assert!(index.by_identity("G.Foo.Bar(int)").is_some());
        assert_eq!(index.by_signature("Foo.Bar(int)").len(), 1);
    }

    #[test]
    fn test_resolve_type_prefers_nested_then_same_tree() {
        let index = index_of(&[
            ("Game", "A.cs", "namespace G { class Outer { class Item {} void M() {} } class Item {} }"),
            ("mod:X", "B.cs", "namespace M { class Item {} class User {} }"),
        ]);
        let outer = index.types_named("Outer")[0];
        let ctx = index.context_for_type(outer);
        let nested = index.resolve_type("Item", &ctx).unwrap();
        assert_eq!(index.type_record(nested).full_name, "G.Outer.Item");

        let user = index.types_named("User")[0];
        let ctx = index.context_for_type(user);
        let item = index.resolve_type("Item", &ctx).unwrap();
        assert_eq!(index.type_record(item).full_name, "M.Item");

        let qualified = index.resolve_type("G.Item", &ctx).unwrap();
        assert_eq!(index.type_record(qualified).full_name, "G.Item");
    }

    #[test]
    fn test_hierarchy_walks() {
        let index = index_of(&[(
            "Game",
            "A.cs",
            "interface IRun { void Run(); } class Base : IRun { public virtual void Run() {} }\n\
             class Mid : Base {} class Leaf : Mid {} class Other : UnityEngine.MonoBehaviour {}",
        )]);
        let id = |n: &str| index.types_named(n)[0];
        assert_eq!(index.base_chain(id("Leaf")), vec![id("Mid"), id("Base")]);
        assert_eq!(index.supertypes(id("Leaf")), vec![id("Mid"), id("Base"), id("IRun")]);
        assert_eq!(index.descendants(id("IRun")), vec![id("Base"), id("Mid"), id("Leaf")]);
        assert_eq!(index.external_base(id("Other")).as_deref(), Some("MonoBehaviour"));
        assert_eq!(index.external_base(id("Leaf")), None);
    }
}
