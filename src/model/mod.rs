//! Entity records shared by every pipeline stage.
//!
//! All entities live in parallel typed tables keyed by integer ids from one
//! build session. Types and methods get ids in deterministic harvest order
//! (sorted file path, then depth-first declaration order).

pub mod harvest;
pub mod index;
pub mod types;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use harvest::{harvest_file, FileHarvest};
pub use index::SymbolIndex;

/// Row id of a harvested type.
pub type TypeId = i64;
/// Row id of a harvested method.
pub type MethodId = i64;

/// Conflict severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Class,
    Struct,
    Interface,
    Enum,
    Record,
}

impl TypeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeKind::Class => "class",
            TypeKind::Struct => "struct",
            TypeKind::Interface => "interface",
            TypeKind::Enum => "enum",
            TypeKind::Record => "record",
        }
    }

    /// Map a tree-sitter declaration node kind.
    pub fn from_node_kind(kind: &str) -> Option<Self> {
        match kind {
            "class_declaration" => Some(TypeKind::Class),
            "struct_declaration" | "record_struct_declaration" => Some(TypeKind::Struct),
            "interface_declaration" => Some(TypeKind::Interface),
            "enum_declaration" => Some(TypeKind::Enum),
            "record_declaration" => Some(TypeKind::Record),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    Method,
    Constructor,
    StaticConstructor,
    Getter,
    Setter,
    EventAdd,
    EventRemove,
}

impl MethodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodKind::Method => "method",
            MethodKind::Constructor => "constructor",
            MethodKind::StaticConstructor => "static_constructor",
            MethodKind::Getter => "getter",
            MethodKind::Setter => "setter",
            MethodKind::EventAdd => "event_add",
            MethodKind::EventRemove => "event_remove",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessibility {
    Public,
    Protected,
    Internal,
    ProtectedInternal,
    PrivateProtected,
    Private,
}

impl Accessibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Accessibility::Public => "public",
            Accessibility::Protected => "protected",
            Accessibility::Internal => "internal",
            Accessibility::ProtectedInternal => "protected internal",
            Accessibility::PrivateProtected => "private protected",
            Accessibility::Private => "private",
        }
    }
}

/// Declaration modifiers that matter for resolution and reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_sealed: bool,
    pub is_virtual: bool,
    pub is_override: bool,
    pub is_partial: bool,
    pub accessibility: Option<Accessibility>,
}

impl Modifiers {
    /// Build from modifier keywords as written in source.
    pub fn from_keywords<'a>(keywords: impl IntoIterator<Item = &'a str>) -> Self {
        let mut m = Modifiers::default();
        let (mut public, mut protected, mut internal, mut private) = (false, false, false, false);
        for kw in keywords {
            match kw {
                "static" => m.is_static = true,
                "abstract" => m.is_abstract = true,
                "sealed" => m.is_sealed = true,
                "virtual" => m.is_virtual = true,
                "override" => m.is_override = true,
                "partial" => m.is_partial = true,
                "public" => public = true,
                "protected" => protected = true,
                "internal" => internal = true,
                "private" => private = true,
                _ => {}
            }
        }
        m.accessibility = match (public, protected, internal, private) {
            (true, _, _, _) => Some(Accessibility::Public),
            (_, true, true, _) => Some(Accessibility::ProtectedInternal),
            (_, true, _, true) => Some(Accessibility::PrivateProtected),
            (_, true, _, _) => Some(Accessibility::Protected),
            (_, _, true, _) => Some(Accessibility::Internal),
            (_, _, _, true) => Some(Accessibility::Private),
            _ => None,
        };
        m
    }

    /// Space-separated keyword list for storage (`"public static"`).
    pub fn to_keyword_string(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(a) = self.accessibility {
            parts.push(a.as_str());
        }
        for (flag, kw) in [
            (self.is_static, "static"),
            (self.is_abstract, "abstract"),
            (self.is_sealed, "sealed"),
            (self.is_virtual, "virtual"),
            (self.is_override, "override"),
            (self.is_partial, "partial"),
        ] {
            if flag {
                parts.push(kw);
            }
        }
        parts.join(" ")
    }
}

/// A harvested type declaration. Partial declarations are merged into one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeRecord {
    pub id: TypeId,
    pub name: String,
    pub namespace: String,
    /// Namespace plus enclosing types, dot separated
    pub full_name: String,
    pub kind: TypeKind,
    /// Written base list, in declaration order, before base/interface split
    pub bases: Vec<String>,
    pub base_type: Option<String>,
    pub interfaces: Vec<String>,
    pub modifiers: Modifiers,
    pub type_params: usize,
    /// Full name of the enclosing type for nested declarations
    pub outer: Option<String>,
    pub file: String,
    pub line: usize,
    /// Source tree the declaration came from
    pub tree: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    /// Normalized type text
    pub type_name: String,
    pub has_default: bool,
    pub is_params: bool,
    /// Receiver parameter of an extension method
    pub is_this: bool,
}

/// A harvested method, constructor, or synthetic accessor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodRecord {
    pub id: MethodId,
    pub type_id: TypeId,
    pub name: String,
    pub params: Vec<Parameter>,
    /// `Type.Name(ParamTypes)` with the simple type name
    pub signature: String,
    pub return_type: String,
    pub modifiers: Modifiers,
    pub kind: MethodKind,
    pub type_params: usize,
    pub is_extension: bool,
    /// Generated without source (implicit default constructor)
    pub synthetic: bool,
    pub file: String,
    pub start_line: usize,
    pub end_line: usize,
    /// Byte range of the body node inside its file, when there is a body
    pub body_range: Option<(usize, usize)>,
    pub body: String,
}

impl MethodRecord {
    pub fn param_types(&self) -> Vec<String> {
        self.params.iter().map(|p| p.type_name.clone()).collect()
    }

    /// Minimum number of arguments a call must pass
    pub fn required_arity(&self) -> usize {
        self.params
            .iter()
            .filter(|p| !p.has_default && !p.is_params && !p.is_this)
            .count()
    }

    /// Whether a call with `argc` arguments fits this method.
    pub fn accepts_arity(&self, argc: usize) -> bool {
        let declared = self.params.iter().filter(|p| !p.is_this).count();
        let variadic = self.params.iter().any(|p| p.is_params);
        argc >= self.required_arity() && (variadic || argc <= declared)
    }

    pub fn is_virtual_dispatch(&self) -> bool {
        self.modifiers.is_virtual || self.modifiers.is_abstract || self.modifiers.is_override
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    Field,
    Property,
    Event,
    Constant,
}

impl MemberKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberKind::Field => "field",
            MemberKind::Property => "property",
            MemberKind::Event => "event",
            MemberKind::Constant => "constant",
        }
    }
}

/// Field, property, event or constant declared on a type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRecord {
    pub type_id: TypeId,
    pub name: String,
    pub type_name: String,
    pub kind: MemberKind,
    pub is_static: bool,
    /// Literal value of a string constant
    pub const_value: Option<String>,
    pub file: String,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Direct,
    Virtual,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::Direct => "direct",
            CallKind::Virtual => "virtual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Resolved,
    BestEffort,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Resolved => "resolved",
            Confidence::BestEffort => "best_effort",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "resolved" => Some(Confidence::Resolved),
            "best_effort" => Some(Confidence::BestEffort),
            _ => None,
        }
    }
}

/// Destination of a call that is not part of the analyzed corpus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExternalTarget {
    pub assembly: Option<String>,
    /// Never empty; `<unknown>` when nothing is known about the receiver
    pub type_name: String,
    pub method: String,
    pub signature: String,
}

pub const UNKNOWN_TYPE: &str = "<unknown>";

/// Callee of a call edge: exactly one of an internal method or an external target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Callee {
    Internal(MethodId),
    External(ExternalTarget),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEdge {
    pub caller: MethodId,
    pub callee: Callee,
    pub kind: CallKind,
    /// Name of the strategy that resolved the call, `external` otherwise
    pub strategy: String,
    pub confidence: Confidence,
    pub file: String,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Evidence {
    Vocabulary,
    Convention,
    Semantic,
}

impl Evidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Evidence::Vocabulary => "vocabulary",
            Evidence::Convention => "convention",
            Evidence::Semantic => "semantic",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDeclaration {
    pub owner_type_id: TypeId,
    pub owner: String,
    pub name: String,
    pub delegate_type: String,
    /// `event` or `delegate_field`
    pub declaration_kind: String,
    pub evidence: Evidence,
    pub file: String,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionDirection {
    Add,
    Remove,
}

impl SubscriptionDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionDirection::Add => "add",
            SubscriptionDirection::Remove => "remove",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSubscription {
    pub subscriber_type_id: TypeId,
    pub subscriber_method_id: MethodId,
    pub event_owner: String,
    pub event_name: String,
    pub handler: String,
    pub direction: SubscriptionDirection,
    pub evidence: Evidence,
    pub file: String,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FireStyle {
    Direct,
    Invoke,
}

impl FireStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            FireStyle::Direct => "direct",
            FireStyle::Invoke => "invoke",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFire {
    pub firing_type_id: TypeId,
    pub firing_method_id: MethodId,
    pub event_owner: String,
    pub event_name: String,
    pub style: FireStyle,
    pub guarded: bool,
    pub evidence: Evidence,
    pub file: String,
    pub line: usize,
}

/// One element, property, or attribute of a base configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDefinition {
    pub file: String,
    pub path: String,
    pub element: String,
    pub property_name: Option<String>,
    pub value: Option<String>,
    pub declaring_class: Option<String>,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    Read,
    Write,
    ExistenceCheck,
}

impl AccessKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessKind::Read => "read",
            AccessKind::Write => "write",
            AccessKind::ExistenceCheck => "existence_check",
        }
    }
}

/// Code-side read, write or existence check of a named config property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyAccess {
    pub method_id: MethodId,
    pub property_name: String,
    pub kind: AccessKind,
    pub api: String,
    pub confidence: Confidence,
    pub file: String,
    pub line: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionRecord {
    pub name: String,
    pub path: String,
    pub version: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub has_manifest: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchKind {
    Before,
    After,
    Rewrite,
    Around,
}

impl PatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchKind::Before => "before",
            PatchKind::After => "after",
            PatchKind::Rewrite => "rewrite",
            PatchKind::Around => "around",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "before" => Some(PatchKind::Before),
            "after" => Some(PatchKind::After),
            "rewrite" => Some(PatchKind::Rewrite),
            "around" => Some(PatchKind::Around),
            _ => None,
        }
    }

    /// Map a Harmony handler role (`Prefix`, `HarmonyPostfix`, `transpiler`, ...).
    pub fn from_handler_role(role: &str) -> Option<Self> {
        let role = role.strip_prefix("Harmony").unwrap_or(role);
        match role.to_ascii_lowercase().as_str() {
            "prefix" => Some(PatchKind::Before),
            "postfix" => Some(PatchKind::After),
            "transpiler" => Some(PatchKind::Rewrite),
            "finalizer" => Some(PatchKind::Around),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchStyle {
    Declarative,
    Imperative,
}

impl PatchStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchStyle::Declarative => "declarative",
            PatchStyle::Imperative => "imperative",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "declarative" => Some(PatchStyle::Declarative),
            "imperative" => Some(PatchStyle::Imperative),
            _ => None,
        }
    }
}

/// A runtime patch installed by an extension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchRecord {
    pub extension: String,
    pub declaring_type: String,
    pub declaring_method: String,
    pub target_type: String,
    pub target_method: String,
    /// Declared parameter types, `None` when the declaration names none
    pub target_params: Option<Vec<String>>,
    /// `TargetType.TargetMethod(ParamTypes)`, always present
    pub target_signature: String,
    pub kind: PatchKind,
    pub style: PatchStyle,
    pub confidence: Confidence,
    pub target_method_id: Option<MethodId>,
    pub file: String,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigOp {
    Set,
    Append,
    Remove,
    InsertBefore,
    InsertAfter,
}

impl ConfigOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigOp::Set => "set",
            ConfigOp::Append => "append",
            ConfigOp::Remove => "remove",
            ConfigOp::InsertBefore => "insert-before",
            ConfigOp::InsertAfter => "insert-after",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "set" => Some(ConfigOp::Set),
            "append" => Some(ConfigOp::Append),
            "remove" => Some(ConfigOp::Remove),
            "insert-before" => Some(ConfigOp::InsertBefore),
            "insert-after" => Some(ConfigOp::InsertAfter),
            _ => None,
        }
    }

    pub fn is_destructive(&self) -> bool {
        matches!(self, ConfigOp::Set | ConfigOp::Remove)
    }
}

/// A path-addressed edit an extension applies to a base configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEdit {
    pub extension: String,
    pub target_file: String,
    pub raw_path: String,
    pub path: String,
    pub op: ConfigOp,
    pub property_name: Option<String>,
    pub value: Option<String>,
    pub file: String,
    pub line: usize,
}
