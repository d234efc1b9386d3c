//! Thread-local parser pool for reusing tree-sitter Parser instances.
//!
//! The build parses every file of the corpus on the rayon pool. Each worker
//! thread keeps one C# parser alive for its whole lifetime instead of
//! creating a fresh one per file.
//!
//! # Usage
//!
//! ```rust,ignore
//! use modscope::ingest::pool::with_csharp_parser;
//!
//! let tree = with_csharp_parser(|parser| parser.parse(source, None))?;
//! ```

use anyhow::Result;
use std::cell::RefCell;

thread_local! {
    static CSHARP_PARSER: RefCell<Option<tree_sitter::Parser>> = const { RefCell::new(None) };
}

/// Run `f` with this thread's C# parser, creating it on first use.
pub fn with_csharp_parser<F, R>(f: F) -> Result<R>
where
    F: FnOnce(&mut tree_sitter::Parser) -> R,
{
    CSHARP_PARSER.with(|parser_cell| {
        let mut parser_ref = parser_cell.borrow_mut();
        if parser_ref.is_none() {
            let mut parser = tree_sitter::Parser::new();
            parser.set_language(&tree_sitter_c_sharp::language())?;
            *parser_ref = Some(parser);
        }
        match parser_ref.as_mut() {
            Some(parser) => Ok(f(parser)),
            None => Err(anyhow::anyhow!("C# parser failed to initialize")),
        }
    })
}

/// Parse C# source with the pooled parser.
///
/// Returns `None` only when tree-sitter gives up entirely; syntax errors
/// still produce a tree with ERROR nodes.
pub fn parse_csharp(source: &str) -> Result<Option<tree_sitter::Tree>> {
    with_csharp_parser(|parser| {
        // A previous parse on this thread may have been interrupted
        parser.reset();
        parser.parse(source, None)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_is_reused_across_calls() {
        let a = parse_csharp("class A { void M() {} }").unwrap().unwrap();
        let b = parse_csharp("class B { }").unwrap().unwrap();
        assert_eq!(a.root_node().kind(), "compilation_unit");
        assert_eq!(b.root_node().kind(), "compilation_unit");
    }

    #[test]
    fn test_parallel_parsing_uses_thread_local_parsers() {
        use rayon::prelude::*;
        let sources: Vec<String> = (0..16)
            .map(|i| format!("class C{} {{ int F() {{ return {}; }} }}", i, i))
            .collect();
        let ok = sources
            .par_iter()
            .map(|s| parse_csharp(s).ok().flatten().is_some())
            .all(|ok| ok);
        assert!(ok);
    }
}
