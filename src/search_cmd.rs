//! Search command implementation
//!
//! Full-text phrase search over method bodies.

use anyhow::Result;
use modscope::common::truncate_for_display;
use modscope::output::{print_response, OutputFormat};
use modscope::Store;
use std::path::PathBuf;

const SNIPPET_WIDTH: usize = 120;

pub fn run_search(
    db_path: PathBuf,
    keyword: String,
    limit: usize,
    output_format: OutputFormat,
) -> Result<()> {
    let store = Store::open(&db_path)?;
    let hits = store.search(&keyword, limit)?;

    if output_format == OutputFormat::Json {
        return print_response(&hits);
    }

    if hits.is_empty() {
        println!("No method bodies contain \"{}\"", keyword);
        return Ok(());
    }
    for hit in &hits {
        println!("{} ({}:{})", hit.method.signature, hit.method.file, hit.method.line);
        println!("    {}", truncate_for_display(&hit.snippet, SNIPPET_WIDTH));
    }
    if hits.len() == limit {
        eprintln!("(showing first {}; raise --limit for more)", limit);
    }
    Ok(())
}
