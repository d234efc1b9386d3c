//! Externals command implementation
//!
//! Lists calls whose destination lies outside the analyzed corpus, grouped
//! by target.

use anyhow::Result;
use modscope::output::{print_response, OutputFormat};
use modscope::Store;
use std::path::PathBuf;

pub fn run_externals(
    db_path: PathBuf,
    type_name: Option<String>,
    output_format: OutputFormat,
) -> Result<()> {
    let store = Store::open(&db_path)?;
    let rows = store.externals(type_name.as_deref())?;

    if output_format == OutputFormat::Json {
        return print_response(&rows);
    }

    if rows.is_empty() {
        println!("No external calls");
        return Ok(());
    }
    let mut current: Option<&str> = None;
    for row in &rows {
        if current != Some(row.signature.as_str()) {
            let assembly = row.assembly.as_deref().unwrap_or("unknown assembly");
            println!("{} ({})", row.signature, assembly);
            current = Some(row.signature.as_str());
        }
        println!(
            "  from {} at {}:{} [{}]",
            row.caller.signature, row.file, row.line, row.confidence
        );
    }
    Ok(())
}
