//! Type-name normalization.
//!
//! One canonical spelling is used everywhere a type name becomes part of a
//! key: harvested signatures, call-site argument types, and patch targets.
//! `System.Collections.Generic.List<System.Int32>` and `List<int>` both
//! normalize to `List<int>`.

/// CLR type names with a C# keyword alias.
const ALIASES: &[(&str, &str)] = &[
    ("Boolean", "bool"),
    ("Byte", "byte"),
    ("SByte", "sbyte"),
    ("Char", "char"),
    ("Decimal", "decimal"),
    ("Double", "double"),
    ("Single", "float"),
    ("Int16", "short"),
    ("UInt16", "ushort"),
    ("Int32", "int"),
    ("UInt32", "uint"),
    ("Int64", "long"),
    ("UInt64", "ulong"),
    ("Object", "object"),
    ("String", "string"),
    ("Void", "void"),
];

/// Parameter modifiers that do not take part in a signature.
const PARAM_MODIFIERS: &[&str] = &["ref", "out", "in", "params", "this", "scoped", "readonly"];

fn alias(name: &str) -> &str {
    ALIASES
        .iter()
        .find(|(clr, _)| *clr == name)
        .map(|(_, kw)| *kw)
        .unwrap_or(name)
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '@' || c == '.' || c == ':'
}

/// Normalize a type as written in source or in a `typeof(...)` expression.
pub fn normalize_type(text: &str) -> String {
    let mut rest = text.trim();
    rest = rest.strip_prefix("typeof(").and_then(|r| r.strip_suffix(')')).unwrap_or(rest);
    // Leading parameter modifiers are separated by whitespace
    loop {
        let mut stripped = false;
        for m in PARAM_MODIFIERS {
            if let Some(r) = rest.strip_prefix(m) {
                if r.starts_with(char::is_whitespace) {
                    rest = r.trim_start();
                    stripped = true;
                }
            }
        }
        if !stripped {
            break;
        }
    }

    let mut out = String::with_capacity(rest.len());
    let mut token = String::new();
    let flush = |token: &mut String, out: &mut String| {
        if token.is_empty() {
            return;
        }
        let t = token.strip_prefix("global::").unwrap_or(token.as_str());
        let last = t.rsplit(['.', ':']).next().unwrap_or(t);
        let last = last.trim_start_matches('@');
        out.push_str(alias(last));
        token.clear();
    };
    for c in rest.chars() {
        if c.is_whitespace() {
            continue;
        }
        if is_name_char(c) {
            token.push(c);
        } else {
            flush(&mut token, &mut out);
            out.push(c);
        }
    }
    flush(&mut token, &mut out);

    // Nullable<T> is T?
    if let Some(inner) = out.strip_prefix("Nullable<").and_then(|r| r.strip_suffix('>')) {
        if !inner.contains('<') {
            return format!("{}?", inner);
        }
    }
    out
}

/// Name without generic arguments, array ranks or nullability: `List<int>[]` -> `List`.
pub fn simple_name(normalized: &str) -> &str {
    let end = normalized
        .find(['<', '[', '?'])
        .unwrap_or(normalized.len());
    &normalized[..end]
}

/// Top-level generic arguments: `Dictionary<string,List<int>>` -> `["string", "List<int>"]`.
pub fn generic_args(normalized: &str) -> Vec<String> {
    let Some(open) = normalized.find('<') else {
        return Vec::new();
    };
    let Some(close) = normalized.rfind('>') else {
        return Vec::new();
    };
    if close <= open {
        return Vec::new();
    }
    split_top_level(&normalized[open + 1..close])
}

/// Split on commas that are not nested in `<>`, `()` or `[]`.
pub fn split_top_level(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in s.chars() {
        match c {
            '<' | '(' | '[' => {
                depth += 1;
                current.push(c);
            }
            '>' | ')' | ']' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Element type of an array or single-argument collection.
pub fn element_type(normalized: &str) -> Option<String> {
    if let Some(inner) = normalized.strip_suffix("[]") {
        return Some(inner.to_string());
    }
    let args = generic_args(normalized);
    match (simple_name(normalized), args.len()) {
        (_, 1) => args.into_iter().next(),
        ("Dictionary" | "IDictionary" | "SortedDictionary" | "IReadOnlyDictionary", 2) => {
            Some(format!("KeyValuePair<{}>", args.join(",")))
        }
        _ => None,
    }
}

/// Value type of an indexable collection (`T[]`, `List<T>`, `Dictionary<K,V>`).
pub fn indexer_type(normalized: &str) -> Option<String> {
    if let Some(inner) = normalized.strip_suffix("[]") {
        return Some(inner.to_string());
    }
    let args = generic_args(normalized);
    match args.len() {
        1 => args.into_iter().next(),
        2 => args.into_iter().nth(1),
        _ => None,
    }
}

/// `Type.Name(T1,T2)` key shared by harvested methods, call sites and patches.
pub fn signature_key(type_name: &str, method: &str, params: &[String]) -> String {
    format!("{}.{}({})", simple_name(type_name), method, params.join(","))
}

/// Whether `name` is one of the C# keyword types.
pub fn is_keyword_type(name: &str) -> bool {
    ALIASES.iter().any(|(_, kw)| *kw == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_namespaces_and_aliases() {
        assert_eq!(normalize_type("System.Int32"), "int");
        assert_eq!(normalize_type("global::System.String"), "string");
        assert_eq!(
            normalize_type("System.Collections.Generic.List<System.Int32>"),
            "List<int>"
        );
        assert_eq!(normalize_type("Dictionary<string, List<Game.Item>>"), "Dictionary<string,List<Item>>");
    }

    #[test]
    fn test_normalize_drops_parameter_modifiers() {
        assert_eq!(normalize_type("ref int"), "int");
        assert_eq!(normalize_type("out  Vector3"), "Vector3");
        assert_eq!(normalize_type("this EntityPlayer"), "EntityPlayer");
        assert_eq!(normalize_type("params object[]"), "object[]");
        // A type that merely starts with a modifier word is untouched
        assert_eq!(normalize_type("inventory"), "inventory");
    }

    #[test]
    fn test_normalize_typeof_and_nullable() {
        assert_eq!(normalize_type("typeof(Foo.Bar)"), "Bar");
        assert_eq!(normalize_type("Nullable<Int32>"), "int?");
        assert_eq!(normalize_type("int ?"), "int?");
        assert_eq!(normalize_type("(int, string)"), "(int,string)");
    }

    #[test]
    fn test_simple_name_and_generic_args() {
        assert_eq!(simple_name("List<int>[]"), "List");
        assert_eq!(simple_name("Foo"), "Foo");
        assert_eq!(
            generic_args("Dictionary<string,List<int>>"),
            vec!["string".to_string(), "List<int>".to_string()]
        );
        assert!(generic_args("Foo").is_empty());
    }

    #[test]
    fn test_element_and_indexer_types() {
        assert_eq!(element_type("Item[]").as_deref(), Some("Item"));
        assert_eq!(element_type("List<Item>").as_deref(), Some("Item"));
        assert_eq!(
            element_type("Dictionary<string,int>").as_deref(),
            Some("KeyValuePair<string,int>")
        );
        assert_eq!(indexer_type("Dictionary<string,Item>").as_deref(), Some("Item"));
        assert_eq!(indexer_type("Foo"), None);
    }

    #[test]
    fn test_signature_key() {
        assert_eq!(signature_key("Foo", "Bar", &[]), "Foo.Bar()");
        assert_eq!(
            signature_key("List<int>", "Add", &["int".to_string()]),
            "List.Add(int)"
        );
    }
}
