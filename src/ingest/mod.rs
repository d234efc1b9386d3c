//! Parsing of C# source into tree-sitter syntax trees.

pub mod csharp;
pub mod pool;

use crate::common::{line_count, sha256_hex};
use crate::diagnostics::{BuildDiagnostic, DiagnosticStage};
use crate::discover::SourceFile;

/// A parsed source file, kept alive from harvesting through resolution.
///
/// `tree_sitter::Tree` is `Send + Sync`, so parsed files are shared read-only
/// across the rayon workers of later phases.
pub struct ParsedFile {
    pub file: SourceFile,
    pub source: String,
    pub tree: tree_sitter::Tree,
    pub has_errors: bool,
    pub sha256: String,
    pub line_count: usize,
}

impl ParsedFile {
    pub fn rel_path(&self) -> &str {
        &self.file.rel_path
    }

    pub fn root(&self) -> tree_sitter::Node<'_> {
        self.tree.root_node()
    }
}

/// Read and parse one source file.
///
/// Invalid UTF-8 is decoded lossily and a leading BOM is dropped; syntax
/// errors still yield a tree (flagged with `has_errors`).
pub fn parse_file(file: &SourceFile) -> Result<ParsedFile, BuildDiagnostic> {
    let bytes = std::fs::read(&file.path).map_err(|e| {
        BuildDiagnostic::error(file.rel_path.clone(), DiagnosticStage::Read, e.to_string())
    })?;
    let sha256 = sha256_hex(&bytes);
    let mut source = String::from_utf8_lossy(&bytes).into_owned();
    if source.starts_with('\u{feff}') {
        source.drain(..'\u{feff}'.len_utf8());
    }
    parse_source(file.clone(), source, sha256)
}

/// Parse already-loaded source text.
pub fn parse_source(
    file: SourceFile,
    source: String,
    sha256: String,
) -> Result<ParsedFile, BuildDiagnostic> {
    let tree = match pool::parse_csharp(&source) {
        Ok(Some(tree)) => tree,
        Ok(None) => {
            return Err(BuildDiagnostic::error(
                file.rel_path.clone(),
                DiagnosticStage::Parse,
                "parser produced no tree",
            ))
        }
        Err(e) => {
            return Err(BuildDiagnostic::error(
                file.rel_path.clone(),
                DiagnosticStage::Parse,
                e.to_string(),
            ))
        }
    };
    let has_errors = tree.root_node().has_error();
    let lines = line_count(&source);
    Ok(ParsedFile {
        file,
        source,
        tree,
        has_errors,
        sha256,
        line_count: lines,
    })
}

/// Stack of enclosing namespace and type names during a declaration walk.
///
/// # Example
/// ```rust,ignore
/// let mut stack = ScopeStack::new();
/// stack.push("Game");
/// stack.push("Player");
/// assert_eq!(stack.fqn_for_symbol("Inventory"), "Game.Player.Inventory");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    scopes: Vec<String>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a scope level; dotted names (`A.B`) push one level per segment.
    pub fn push(&mut self, scope: &str) -> usize {
        let mut pushed = 0;
        for part in scope.split('.').filter(|p| !p.is_empty()) {
            self.scopes.push(part.to_string());
            pushed += 1;
        }
        pushed
    }

    pub fn pop_n(&mut self, n: usize) {
        let keep = self.scopes.len().saturating_sub(n);
        self.scopes.truncate(keep);
    }

    pub fn current_fqn(&self) -> String {
        self.scopes.join(".")
    }

    pub fn fqn_for_symbol(&self, symbol_name: &str) -> String {
        if self.scopes.is_empty() {
            symbol_name.to_string()
        } else if symbol_name.is_empty() {
            self.current_fqn()
        } else {
            format!("{}.{}", self.current_fqn(), symbol_name)
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn source_file(rel: &str) -> SourceFile {
        SourceFile {
            path: PathBuf::from(rel),
            rel_path: rel.to_string(),
            tree_id: "Game".to_string(),
            extension: None,
        }
    }

    #[test]
    fn test_scope_stack_push_dotted_and_pop() {
        let mut stack = ScopeStack::new();
        let n = stack.push("Game.Entities");
        assert_eq!(n, 2);
        stack.push("Player");
        assert_eq!(stack.fqn_for_symbol("Bag"), "Game.Entities.Player.Bag");
        stack.pop_n(1);
        assert_eq!(stack.current_fqn(), "Game.Entities");
        stack.pop_n(5);
        assert!(stack.is_empty());
        assert_eq!(stack.fqn_for_symbol("Top"), "Top");
    }

    #[test]
    fn test_parse_source_flags_syntax_errors() {
        let ok = parse_source(source_file("A.cs"), "class A {}".into(), String::new()).unwrap();
        assert!(!ok.has_errors);
        assert_eq!(ok.line_count, 1);
        let bad =
            parse_source(source_file("B.cs"), "class B { void M( }".into(), String::new()).unwrap();
        assert!(bad.has_errors);
    }

    #[test]
    fn test_parse_file_reports_missing_file() {
        let err = parse_file(&source_file("/definitely/not/here.cs")).err().unwrap();
        assert_eq!(err.stage_key(), "read");
    }
}
