//! Expression shapes.
//!
//! A small recursive reduction of C# expressions to the forms patch
//! declarations are written with. Attribute arguments, `Patch(...)`
//! arguments and `TargetMethod()` bodies all go through [`shape_of`].

use tree_sitter::Node;

use crate::ingest::csharp::{
    call_arguments, child_of_kind, field, member_name, named_children, string_value, text,
    unwrap_parens,
};
use crate::model::types::normalize_type;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeArg {
    pub name: Option<String>,
    pub shape: Shape,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// String literal or `nameof(...)`
    Str(String),
    /// `typeof(T)`, normalized
    TypeOf(String),
    /// `new Type[] { typeof(A), ... }` or `new[] { ... }`
    TypeList(Vec<String>),
    /// Dotted name such as `MethodType.Getter`
    Member(Vec<String>),
    Call {
        receiver: Option<Box<Shape>>,
        name: String,
        args: Vec<ShapeArg>,
    },
    New {
        type_name: String,
        args: Vec<ShapeArg>,
    },
    Ident(String),
    Null,
    Other(String),
}

impl Shape {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Shape::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Last segment of a dotted member or identifier.
    pub fn last_segment(&self) -> Option<&str> {
        match self {
            Shape::Member(path) => path.last().map(String::as_str),
            Shape::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Whether the shape names `name` (`AccessTools`, `HarmonyLib.AccessTools`).
    pub fn names(&self, name: &str) -> bool {
        self.last_segment() == Some(name)
    }

    /// Parameter type list, treating `Type.EmptyTypes` as empty.
    pub fn as_type_list(&self) -> Option<Vec<String>> {
        match self {
            Shape::TypeList(types) => Some(types.clone()),
            Shape::Member(path) if path.last().map(String::as_str) == Some("EmptyTypes") => {
                Some(Vec::new())
            }
            _ => None,
        }
    }
}

/// Reduce an expression to its shape.
pub fn shape_of(node: Node<'_>, src: &str) -> Shape {
    let node = unwrap_parens(node);
    if let Some(s) = string_value(node, src) {
        return Shape::Str(s);
    }
    match node.kind() {
        "null_literal" => Shape::Null,
        "identifier" => Shape::Ident(text(node, src).trim_start_matches('@').to_string()),
        "typeof_expression" => {
            let t = field(node, &["type"]).or_else(|| node.named_child(0));
            Shape::TypeOf(t.map(|t| normalize_type(text(t, src))).unwrap_or_default())
        }
        "cast_expression" => match field(node, &["value"]).or_else(|| node.named_child(1)) {
            Some(v) => shape_of(v, src),
            None => Shape::Other(text(node, src).to_string()),
        },
        "member_access_expression" | "qualified_name" => match dotted_path(node, src) {
            Some(path) => Shape::Member(path),
            None => Shape::Other(text(node, src).to_string()),
        },
        "array_creation_expression" | "implicit_array_creation_expression" => {
            let elements = child_of_kind(node, &["initializer_expression"])
                .map(named_children)
                .unwrap_or_default();
            let types = elements
                .into_iter()
                .filter_map(|e| match shape_of(e, src) {
                    Shape::TypeOf(t) => Some(t),
                    // `typeof(int).MakeByRefType()` keeps the element type
                    Shape::Call {
                        receiver: Some(r),
                        name,
                        ..
                    } if name == "MakeByRefType" => match *r {
                        Shape::TypeOf(t) => Some(t),
                        _ => None,
                    },
                    _ => None,
                })
                .collect();
            Shape::TypeList(types)
        }
        "invocation_expression" => invocation_shape(node, src),
        "object_creation_expression" => Shape::New {
            type_name: field(node, &["type"])
                .map(|t| normalize_type(text(t, src)))
                .unwrap_or_default(),
            args: shape_args(node, src),
        },
        _ => Shape::Other(text(node, src).to_string()),
    }
}

fn invocation_shape(node: Node<'_>, src: &str) -> Shape {
    let Some(function) = field(node, &["function"]).or_else(|| node.named_child(0)) else {
        return Shape::Other(text(node, src).to_string());
    };
    let name = member_name(function, src).unwrap_or_default();
    if name == "nameof" && function.kind() == "identifier" {
        // `nameof(Foo.Bar)` is the last member name
        let inner = call_arguments(node)
            .first()
            .and_then(|a| member_name(a.expr, src).or_else(|| Some(text(a.expr, src).to_string())));
        return Shape::Str(inner.unwrap_or_default());
    }
    let receiver = match function.kind() {
        "member_access_expression" => field(function, &["expression"]).map(|r| Box::new(shape_of(r, src))),
        _ => None,
    };
    Shape::Call {
        receiver,
        name,
        args: shape_args(node, src),
    }
}

/// Shapes of the arguments of an invocation or creation, with their names.
pub fn shape_args(call: Node<'_>, src: &str) -> Vec<ShapeArg> {
    call_arguments(call)
        .iter()
        .map(|a| ShapeArg {
            name: a.name(src).map(str::to_string),
            shape: shape_of(a.expr, src),
        })
        .collect()
}

/// `A.B.C` as segments when every part is a plain name.
fn dotted_path(node: Node<'_>, src: &str) -> Option<Vec<String>> {
    match node.kind() {
        "identifier" => Some(vec![text(node, src).trim_start_matches('@').to_string()]),
        "member_access_expression" | "qualified_name" => {
            let left = field(node, &["expression", "qualifier"]).or_else(|| node.named_child(0))?;
            let right = field(node, &["name"]).or_else(|| named_children(node).into_iter().last())?;
            if right.kind() != "identifier" {
                return None;
            }
            let mut path = dotted_path(left, src)?;
            path.push(text(right, src).to_string());
            Some(path)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::csharp::variable_declarators;
    use crate::ingest::pool::parse_csharp;

    fn shape(expr: &str) -> Shape {
        let src = format!("class C {{ object f = {}; }}", expr);
        let tree = parse_csharp(&src).unwrap().unwrap();
        fn find<'t>(node: Node<'t>, src: &str) -> Option<Node<'t>> {
            if node.kind() == "variable_declaration" {
                return variable_declarators(node, src).into_iter().find_map(|(_, init)| init);
            }
            named_children(node).into_iter().find_map(|c| find(c, src))
        }
        let node = find(tree.root_node(), &src).unwrap();
        shape_of(node, &src)
    }

    #[test]
    fn test_literals_and_nameof() {
        assert_eq!(shape("\"Bar\""), Shape::Str("Bar".into()));
        assert_eq!(shape("@\"Bar\""), Shape::Str("Bar".into()));
        assert_eq!(shape("$\"Bar\""), Shape::Str("Bar".into()));
        assert_eq!(shape("nameof(Foo.Bar)"), Shape::Str("Bar".into()));
        assert_eq!(shape("null"), Shape::Null);
    }

    #[test]
    fn test_types_and_type_lists() {
        assert_eq!(shape("typeof(Game.Foo)"), Shape::TypeOf("Foo".into()));
        assert_eq!(
            shape("new Type[] { typeof(int), typeof(System.String) }"),
            Shape::TypeList(vec!["int".into(), "string".into()])
        );
        assert_eq!(shape("new[] { typeof(float) }"), Shape::TypeList(vec!["float".into()]));
        assert_eq!(shape("Type.EmptyTypes").as_type_list(), Some(Vec::new()));
    }

    #[test]
    fn test_members_calls_and_creations() {
        assert_eq!(
            shape("MethodType.Getter"),
            Shape::Member(vec!["MethodType".into(), "Getter".into()])
        );
        let call = shape("AccessTools.Method(typeof(Foo), \"Bar\")");
        match call {
            Shape::Call { receiver, name, args } => {
                assert_eq!(name, "Method");
                assert!(receiver.unwrap().names("AccessTools"));
                assert_eq!(args[0].shape, Shape::TypeOf("Foo".into()));
                assert_eq!(args[1].shape, Shape::Str("Bar".into()));
            }
            other => panic!("unexpected shape {:?}", other),
        }
        match shape("new HarmonyMethod(typeof(P), nameof(P.Prefix))") {
            Shape::New { type_name, args } => {
                assert_eq!(type_name, "HarmonyMethod");
                assert_eq!(args.len(), 2);
            }
            other => panic!("unexpected shape {:?}", other),
        }
    }
}
