//! Callers command implementation
//!
//! Lists the internal call sites of a method. An ambiguous reference lists
//! every candidate under its owning type.

use anyhow::Result;
use modscope::output::{print_response, OutputFormat};
use modscope::Store;
use std::path::PathBuf;

pub fn run_callers(db_path: PathBuf, method: String, output_format: OutputFormat) -> Result<()> {
    let store = Store::open(&db_path)?;
    let result = store.callers(&method)?;

    if output_format == OutputFormat::Json {
        return print_response(&result);
    }

    for entry in &result.results {
        let m = &entry.method;
        if entry.callers.is_empty() {
            println!("No callers of {} ({}:{})", m.signature, m.file, m.line);
            continue;
        }
        println!("Calls TO {} [{}] ({}:{}):", m.signature, m.owner, m.file, m.line);
        for call in &entry.callers {
            println!(
                "  From: {} [{}, {}] at {}:{}",
                call.method.signature, call.kind, call.strategy, call.file, call.line
            );
        }
    }
    Ok(())
}
