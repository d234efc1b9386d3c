//! Per-file entity harvesting.
//!
//! Walks one syntax tree depth-first and produces type, method and member
//! records with file-local type indices. Global ids are assigned later when
//! [`super::SymbolIndex`] merges all files in sorted order.

use tree_sitter::Node;

use super::types::{normalize_type, signature_key};
use super::{
    Accessibility, MemberKind, MemberRecord, MethodKind, MethodRecord, Modifiers, Parameter,
    TypeKind, TypeRecord,
};
use crate::ingest::csharp::{
    base_list, body, child_of_kind, children, declared_type, field, line, modifiers, name_of,
    named_children, parameters, return_type, string_value, text, type_param_count,
    variable_declarators,
};
use crate::ingest::{ParsedFile, ScopeStack};

/// A delegate type declared in source.
#[derive(Debug, Clone)]
pub struct DelegateDecl {
    pub name: String,
    pub full_name: String,
    pub return_type: String,
    pub params: Vec<Parameter>,
    pub tree: String,
    pub file: String,
    pub line: usize,
}

/// Everything harvested from one file.
///
/// `TypeRecord::id` holds the file-local index until merge; methods and
/// members refer to their type by that index.
#[derive(Debug, Clone, Default)]
pub struct FileHarvest {
    pub tree: String,
    pub file: String,
    pub extension: Option<String>,
    pub usings: Vec<String>,
    pub types: Vec<TypeRecord>,
    pub methods: Vec<(usize, MethodRecord)>,
    pub members: Vec<(usize, MemberRecord)>,
    pub delegates: Vec<DelegateDecl>,
}

/// Harvest all declarations of a parsed file.
pub fn harvest_file(parsed: &ParsedFile) -> FileHarvest {
    let mut harvester = Harvester {
        src: &parsed.source,
        scope: ScopeStack::new(),
        namespace: Vec::new(),
        out: FileHarvest {
            tree: parsed.file.tree_id.clone(),
            file: parsed.file.rel_path.clone(),
            extension: parsed.file.extension.clone(),
            ..FileHarvest::default()
        },
    };
    harvester.walk_container(parsed.root());
    harvester.out
}

struct Harvester<'s> {
    src: &'s str,
    scope: ScopeStack,
    namespace: Vec<String>,
    out: FileHarvest,
}

/// Accessor facts shared by property, indexer and event accessors.
struct AccessorOwner<'a> {
    name: &'a str,
    value_type: &'a str,
    index_params: &'a [Parameter],
    modifiers: &'a Modifiers,
}

impl<'s> Harvester<'s> {
    fn walk_container(&mut self, node: Node<'_>) {
        let mut file_scoped = 0;
        for child in named_children(node) {
            match child.kind() {
                "namespace_declaration" => {
                    let name = self.namespace_name(child);
                    let pushed = self.enter_namespace(&name);
                    if let Some(decls) =
                        field(child, &["body"]).or_else(|| child_of_kind(child, &["declaration_list"]))
                    {
                        self.walk_container(decls);
                    }
                    self.leave_namespace(pushed);
                }
                "file_scoped_namespace_declaration" => {
                    let name = self.namespace_name(child);
                    file_scoped += self.enter_namespace(&name);
                    // Some grammar versions nest the following declarations
                    self.walk_container(child);
                }
                "declaration_list" => self.walk_container(child),
                "using_directive" => self.record_using(child),
                "delegate_declaration" => self.record_delegate(child),
                k if TypeKind::from_node_kind(k).is_some() => self.harvest_type(child, None),
                _ => {}
            }
        }
        self.leave_namespace(file_scoped);
    }

    fn namespace_name(&self, node: Node<'_>) -> String {
        field(node, &["name"])
            .or_else(|| child_of_kind(node, &["qualified_name", "identifier"]))
            .map(|n| text(n, self.src).split_whitespace().collect())
            .unwrap_or_default()
    }

    fn enter_namespace(&mut self, name: &str) -> usize {
        let pushed = self.scope.push(name);
        self.namespace
            .extend(name.split('.').filter(|p| !p.is_empty()).map(str::to_string));
        pushed
    }

    fn leave_namespace(&mut self, n: usize) {
        self.scope.pop_n(n);
        let keep = self.namespace.len().saturating_sub(n);
        self.namespace.truncate(keep);
    }

    fn record_using(&mut self, node: Node<'_>) {
        // `using A = B.C;` aliases are not namespaces
        if children(node).iter().any(|c| !c.is_named() && c.kind() == "=") {
            return;
        }
        if let Some(name) = named_children(node)
            .into_iter()
            .rev()
            .find(|c| matches!(c.kind(), "qualified_name" | "identifier"))
        {
            let name: String = text(name, self.src).split_whitespace().collect();
            let name = name.strip_prefix("global::").unwrap_or(&name).to_string();
            if !self.out.usings.contains(&name) {
                self.out.usings.push(name);
            }
        }
    }

    fn record_delegate(&mut self, node: Node<'_>) {
        let Some(name) = name_of(node, self.src) else {
            return;
        };
        self.out.delegates.push(DelegateDecl {
            full_name: self.scope.fqn_for_symbol(&name),
            name,
            return_type: return_type(node, self.src),
            params: parameters(node, self.src),
            tree: self.out.tree.clone(),
            file: self.out.file.clone(),
            line: line(node),
        });
    }

    fn harvest_type(&mut self, node: Node<'_>, outer: Option<usize>) {
        let Some(kind) = TypeKind::from_node_kind(node.kind()) else {
            return;
        };
        let Some(name) = name_of(node, self.src) else {
            return;
        };
        let mut type_modifiers = Modifiers::from_keywords(modifiers(node, self.src));
        if type_modifiers.accessibility.is_none() {
            type_modifiers.accessibility = Some(if outer.is_some() {
                Accessibility::Private
            } else {
                Accessibility::Internal
            });
        }
        let bases = if kind == TypeKind::Enum {
            Vec::new()
        } else {
            base_list(node, self.src)
        };
        let index = self.out.types.len();
        self.out.types.push(TypeRecord {
            id: index as i64,
            full_name: self.scope.fqn_for_symbol(&name),
            namespace: self.namespace.join("."),
            name: name.clone(),
            kind,
            bases,
            base_type: None,
            interfaces: Vec::new(),
            modifiers: type_modifiers,
            type_params: type_param_count(node),
            outer: outer.map(|o| self.out.types[o].full_name.clone()),
            file: self.out.file.clone(),
            line: line(node),
            tree: self.out.tree.clone(),
        });
        self.scope.push(&name);

        // Primary constructor: `record Point(int X, int Y);` or `class C(int x)`
        if kind != TypeKind::Interface && kind != TypeKind::Enum {
            if let Some(list) = field(node, &["parameters"]).or_else(|| child_of_kind(node, &["parameter_list"])) {
                let params = parameters(node, self.src);
                let mods = Modifiers {
                    accessibility: Some(Accessibility::Public),
                    ..Modifiers::default()
                };
                self.push_method(index, list, ".ctor", params, "void".into(), mods, MethodKind::Constructor, None);
            }
        }

        if let Some(members) =
            field(node, &["body"]).or_else(|| child_of_kind(node, &["declaration_list"]))
        {
            for member in named_children(members) {
                self.harvest_member(member, index);
            }
        }
        self.scope.pop_n(1);
    }

    fn harvest_member(&mut self, member: Node<'_>, type_index: usize) {
        match member.kind() {
            "method_declaration" => {
                let Some(name) = name_of(member, self.src) else {
                    return;
                };
                let params = parameters(member, self.src);
                let ret = return_type(member, self.src);
                let mods = self.member_modifiers(member, type_index);
                self.push_method(type_index, member, &name, params, ret, mods, MethodKind::Method, body(member));
            }
            "constructor_declaration" => {
                let mods = self.member_modifiers(member, type_index);
                let (name, kind) = if mods.is_static {
                    (".cctor", MethodKind::StaticConstructor)
                } else {
                    (".ctor", MethodKind::Constructor)
                };
                let params = parameters(member, self.src);
                self.push_method(type_index, member, name, params, "void".into(), mods, kind, body(member));
            }
            "destructor_declaration" => {
                let mods = Modifiers {
                    accessibility: Some(Accessibility::Protected),
                    ..Modifiers::default()
                };
                self.push_method(type_index, member, "Finalize", Vec::new(), "void".into(), mods, MethodKind::Method, body(member));
            }
            "operator_declaration" | "conversion_operator_declaration" => {
                let name = self.operator_name(member);
                let params = parameters(member, self.src);
                let ret = return_type(member, self.src);
                let mods = self.member_modifiers(member, type_index);
                self.push_method(type_index, member, &name, params, ret, mods, MethodKind::Method, body(member));
            }
            "property_declaration" => self.property(member, type_index),
            "indexer_declaration" => self.indexer(member, type_index),
            "event_declaration" => self.event_with_accessors(member, type_index),
            "event_field_declaration" => self.variable_members(member, type_index, MemberKind::Event),
            "field_declaration" => {
                let kind = if modifiers(member, self.src).contains(&"const") {
                    MemberKind::Constant
                } else {
                    MemberKind::Field
                };
                self.variable_members(member, type_index, kind)
            }
            "delegate_declaration" => self.record_delegate(member),
            k if TypeKind::from_node_kind(k).is_some() => self.harvest_type(member, Some(type_index)),
            _ => {}
        }
    }

    /// Modifiers with interface defaults applied.
    fn member_modifiers(&self, decl: Node<'_>, type_index: usize) -> Modifiers {
        let mut mods = Modifiers::from_keywords(modifiers(decl, self.src));
        let in_interface = self.out.types[type_index].kind == TypeKind::Interface;
        if in_interface {
            if mods.accessibility.is_none() {
                mods.accessibility = Some(Accessibility::Public);
            }
            if !mods.is_static && body(decl).is_none() && !has_accessor_bodies(decl) {
                mods.is_abstract = true;
            }
        } else if mods.accessibility.is_none() {
            mods.accessibility = Some(Accessibility::Private);
        }
        mods
    }

    fn operator_name(&self, decl: Node<'_>) -> String {
        if decl.kind() == "conversion_operator_declaration" {
            let explicit = children(decl).iter().any(|c| c.kind() == "explicit");
            return if explicit { "op_Explicit" } else { "op_Implicit" }.to_string();
        }
        let op = field(decl, &["operator"])
            .map(|n| text(n, self.src).trim().to_string())
            .unwrap_or_default();
        let unary = parameters(decl, self.src).len() == 1;
        let name = match (op.as_str(), unary) {
            ("+", true) => "UnaryPlus",
            ("-", true) => "UnaryNegation",
            ("+", false) => "Addition",
            ("-", false) => "Subtraction",
            ("*", _) => "Multiply",
            ("/", _) => "Division",
            ("%", _) => "Modulus",
            ("==", _) => "Equality",
            ("!=", _) => "Inequality",
            ("<", _) => "LessThan",
            (">", _) => "GreaterThan",
            ("<=", _) => "LessThanOrEqual",
            (">=", _) => "GreaterThanOrEqual",
            ("!", _) => "LogicalNot",
            ("++", _) => "Increment",
            ("--", _) => "Decrement",
            ("true", _) => "True",
            ("false", _) => "False",
            _ => "Operator",
        };
        format!("op_{}", name)
    }

    fn property(&mut self, decl: Node<'_>, type_index: usize) {
        let Some(name) = name_of(decl, self.src) else {
            return;
        };
        let prop_type = field(decl, &["type"])
            .map(|t| normalize_type(text(t, self.src)))
            .unwrap_or_else(|| "?".to_string());
        let mods = self.member_modifiers(decl, type_index);
        self.push_member(type_index, decl, &name, &prop_type, MemberKind::Property, mods.is_static, None);
        let owner = AccessorOwner {
            name: &name,
            value_type: &prop_type,
            index_params: &[],
            modifiers: &mods,
        };
        self.accessors(decl, type_index, &owner);
    }

    fn indexer(&mut self, decl: Node<'_>, type_index: usize) {
        let index_params = parameters(decl, self.src);
        let value_type = field(decl, &["type"])
            .map(|t| normalize_type(text(t, self.src)))
            .unwrap_or_else(|| "?".to_string());
        let mods = self.member_modifiers(decl, type_index);
        let owner = AccessorOwner {
            name: "Item",
            value_type: &value_type,
            index_params: &index_params,
            modifiers: &mods,
        };
        self.accessors(decl, type_index, &owner);
    }

    fn event_with_accessors(&mut self, decl: Node<'_>, type_index: usize) {
        let Some(name) = name_of(decl, self.src) else {
            return;
        };
        let event_type = field(decl, &["type"])
            .map(|t| normalize_type(text(t, self.src)))
            .unwrap_or_else(|| "?".to_string());
        let mods = self.member_modifiers(decl, type_index);
        self.push_member(type_index, decl, &name, &event_type, MemberKind::Event, mods.is_static, None);
        let owner = AccessorOwner {
            name: &name,
            value_type: &event_type,
            index_params: &[],
            modifiers: &mods,
        };
        self.accessors(decl, type_index, &owner);
    }

    /// Synthetic methods for the accessors of a property, indexer or event.
    fn accessors(&mut self, decl: Node<'_>, type_index: usize, owner: &AccessorOwner<'_>) {
        let list = field(decl, &["accessors"]).or_else(|| child_of_kind(decl, &["accessor_list"]));
        let Some(list) = list else {
            // Expression-bodied: `int X => expr;` is a getter
            if let Some(arrow) = field(decl, &["value"])
                .filter(|v| v.kind() == "arrow_expression_clause")
                .or_else(|| child_of_kind(decl, &["arrow_expression_clause"]))
            {
                self.push_accessor(type_index, decl, "get", owner, Modifiers::default(), Some(arrow));
            }
            return;
        };
        for accessor in named_children(list)
            .into_iter()
            .filter(|c| c.kind() == "accessor_declaration")
        {
            let keyword = field(accessor, &["name"])
                .map(|n| text(n, self.src).trim().to_string())
                .or_else(|| {
                    children(accessor)
                        .into_iter()
                        .find(|c| matches!(c.kind(), "get" | "set" | "init" | "add" | "remove"))
                        .map(|c| c.kind().to_string())
                })
                .unwrap_or_default();
            let own = Modifiers::from_keywords(modifiers(accessor, self.src));
            self.push_accessor(type_index, accessor, &keyword, owner, own, body(accessor));
        }
    }

    fn push_accessor(
        &mut self,
        type_index: usize,
        decl: Node<'_>,
        keyword: &str,
        owner: &AccessorOwner<'_>,
        own: Modifiers,
        accessor_body: Option<Node<'_>>,
    ) {
        let value = Parameter {
            name: "value".into(),
            type_name: owner.value_type.to_string(),
            has_default: false,
            is_params: false,
            is_this: false,
        };
        let (prefix, kind, params, ret) = match keyword {
            "get" => ("get_", MethodKind::Getter, owner.index_params.to_vec(), owner.value_type.to_string()),
            "set" | "init" => {
                let mut params = owner.index_params.to_vec();
                params.push(value);
                ("set_", MethodKind::Setter, params, "void".to_string())
            }
            "add" => ("add_", MethodKind::EventAdd, vec![value], "void".to_string()),
            "remove" => ("remove_", MethodKind::EventRemove, vec![value], "void".to_string()),
            _ => return,
        };
        let mut mods = owner.modifiers.clone();
        if own.accessibility.is_some() {
            mods.accessibility = own.accessibility;
        }
        let name = format!("{}{}", prefix, owner.name);
        self.push_method(type_index, decl, &name, params, ret, mods, kind, accessor_body);
    }

    fn variable_members(&mut self, decl: Node<'_>, type_index: usize, kind: MemberKind) {
        let Some(var_decl) = child_of_kind(decl, &["variable_declaration"]) else {
            return;
        };
        let type_name = declared_type(var_decl, self.src);
        let is_static = {
            let words = modifiers(decl, self.src);
            words.contains(&"static") || words.contains(&"const")
        };
        for (name, init) in variable_declarators(var_decl, self.src) {
            let const_value = if kind == MemberKind::Constant {
                init.and_then(|i| string_value(i, self.src))
            } else {
                None
            };
            self.push_member(type_index, decl, &name, &type_name, kind, is_static, const_value);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push_member(
        &mut self,
        type_index: usize,
        decl: Node<'_>,
        name: &str,
        type_name: &str,
        kind: MemberKind,
        is_static: bool,
        const_value: Option<String>,
    ) {
        self.out.members.push((
            type_index,
            MemberRecord {
                type_id: type_index as i64,
                name: name.to_string(),
                type_name: type_name.to_string(),
                kind,
                is_static,
                const_value,
                file: self.out.file.clone(),
                line: line(decl),
            },
        ));
    }

    #[allow(clippy::too_many_arguments)]
    fn push_method(
        &mut self,
        type_index: usize,
        decl: Node<'_>,
        name: &str,
        params: Vec<Parameter>,
        return_type: String,
        modifiers: Modifiers,
        kind: MethodKind,
        method_body: Option<Node<'_>>,
    ) {
        let param_types: Vec<String> = params.iter().map(|p| p.type_name.clone()).collect();
        let signature = signature_key(&self.out.types[type_index].name, name, &param_types);
        let is_extension = modifiers.is_static && params.first().is_some_and(|p| p.is_this);
        self.out.methods.push((
            type_index,
            MethodRecord {
                id: 0,
                type_id: type_index as i64,
                name: name.to_string(),
                signature,
                params,
                return_type,
                modifiers,
                kind,
                type_params: type_param_count(decl),
                is_extension,
                synthetic: false,
                file: self.out.file.clone(),
                start_line: line(decl),
                end_line: crate::ingest::csharp::end_line(decl),
                body_range: method_body.map(|b| (b.start_byte(), b.end_byte())),
                body: method_body
                    .map(|b| text(b, self.src).to_string())
                    .unwrap_or_default(),
            },
        ));
    }
}

fn has_accessor_bodies(decl: Node<'_>) -> bool {
    field(decl, &["accessors"])
        .or_else(|| child_of_kind(decl, &["accessor_list"]))
        .is_some_and(|list| named_children(list).into_iter().any(|a| body(a).is_some()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discover::SourceFile;
    use crate::ingest::parse_source;
    use std::path::PathBuf;

    fn harvest(src: &str) -> FileHarvest {
        let file = SourceFile {
            path: PathBuf::from("Test.cs"),
            rel_path: "Test.cs".into(),
            tree_id: "Game".into(),
            extension: None,
        };
        let parsed = parse_source(file, src.to_string(), String::new()).unwrap();
        harvest_file(&parsed)
    }

    fn method_names(h: &FileHarvest) -> Vec<String> {
        h.methods.iter().map(|(_, m)| m.name.clone()).collect()
    }

    #[test]
    fn test_namespaces_and_nested_types() {
        let h = harvest(
            "namespace Game.Entities { class Player { class Bag { void Open() {} } } }\n\
             namespace Other { struct Point {} }",
        );
        let names: Vec<_> = h.types.iter().map(|t| t.full_name.as_str()).collect();
        assert_eq!(names, vec!["Game.Entities.Player", "Game.Entities.Player.Bag", "Other.Point"]);
        assert_eq!(h.types[1].outer.as_deref(), Some("Game.Entities.Player"));
        assert_eq!(h.types[1].namespace, "Game.Entities");
        assert_eq!(h.types[2].kind, TypeKind::Struct);
        assert_eq!(h.methods[0].1.signature, "Bag.Open()");
    }

    #[test]
    fn test_file_scoped_namespace() {
        let h = harvest("namespace Game;\nusing System;\nclass A { void M() {} }");
        assert_eq!(h.types[0].full_name, "Game.A");
    }

    #[test]
    fn test_constructors_and_accessors() {
        let h = harvest(
            "class Foo {\n\
               static Foo() {}\n\
               public Foo(int x) {}\n\
               public int Count { get; private set; }\n\
               public string Name => \"n\";\n\
               public int this[string key] { get { return 1; } set {} }\n\
               public event System.Action Changed { add {} remove {} }\n\
             }",
        );
        assert_eq!(
            method_names(&h),
            vec![".cctor", ".ctor", "get_Count", "set_Count", "get_Name", "get_Item", "set_Item", "add_Changed", "remove_Changed"]
        );
        let set_count = &h.methods[3].1;
        assert_eq!(set_count.signature, "Foo.set_Count(int)");
        assert_eq!(set_count.modifiers.accessibility, Some(Accessibility::Private));
        assert_eq!(set_count.kind, MethodKind::Setter);
        let get_name = &h.methods[4].1;
        assert!(get_name.body_range.is_some());
        assert_eq!(h.methods[6].1.signature, "Foo.set_Item(string,int)");
        assert!(h.methods[1].1.body_range.is_some());
    }

    #[test]
    fn test_members_and_constants() {
        let h = harvest(
            "class Item {\n\
               const string PropName = \"Magazine\";\n\
               public DynamicProperties Properties;\n\
               public static event System.Action<int> OnDropped;\n\
               private int a, b;\n\
             }",
        );
        let kinds: Vec<_> = h.members.iter().map(|(_, m)| (m.name.as_str(), m.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("PropName", MemberKind::Constant),
                ("Properties", MemberKind::Field),
                ("OnDropped", MemberKind::Event),
                ("a", MemberKind::Field),
                ("b", MemberKind::Field),
            ]
        );
        assert_eq!(h.members[0].1.const_value.as_deref(), Some("Magazine"));
        assert_eq!(h.members[2].1.type_name, "Action<int>");
        assert!(h.members[2].1.is_static);
    }

    #[test]
    fn test_interface_members_are_abstract_and_extensions_flagged() {
        let h = harvest(
            "interface IFoo { void Run(); }\n\
             static class Ext { public static int Twice(this IFoo f, int n) { return n; } }",
        );
        let run = &h.methods[0].1;
        assert!(run.modifiers.is_abstract);
        assert_eq!(run.modifiers.accessibility, Some(Accessibility::Public));
        let twice = &h.methods[1].1;
        assert!(twice.is_extension);
        assert_eq!(twice.signature, "Ext.Twice(IFoo,int)");
    }

    #[test]
    fn test_usings_delegates_and_bases() {
        let h = harvest(
            "using System.Collections.Generic;\nusing Alias = Foo.Bar;\n\
             namespace Game { public delegate void Handler(int x);\n\
             class Zombie : EntityAlive, IDamageable {} }",
        );
        assert_eq!(h.usings, vec!["System.Collections.Generic".to_string()]);
        assert_eq!(h.delegates.len(), 1);
        assert_eq!(h.delegates[0].full_name, "Game.Handler");
        assert_eq!(h.types[0].bases, vec!["EntityAlive".to_string(), "IDamageable".to_string()]);
    }
}
