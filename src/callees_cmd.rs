//! Callees command implementation
//!
//! Lists what a method calls, internal targets first, then external ones.

use anyhow::Result;
use modscope::output::{print_response, OutputFormat};
use modscope::Store;
use std::path::PathBuf;

pub fn run_callees(db_path: PathBuf, method: String, output_format: OutputFormat) -> Result<()> {
    let store = Store::open(&db_path)?;
    let result = store.callees(&method)?;

    if output_format == OutputFormat::Json {
        return print_response(&result);
    }

    for entry in &result.results {
        let m = &entry.method;
        if entry.internal.is_empty() && entry.external.is_empty() {
            println!("No calls from {} ({}:{})", m.signature, m.file, m.line);
            continue;
        }
        println!("Calls FROM {} [{}] ({}:{}):", m.signature, m.owner, m.file, m.line);
        for call in &entry.internal {
            println!(
                "  To: {} [{}, {}] at {}:{}",
                call.method.signature, call.kind, call.strategy, call.file, call.line
            );
        }
        for call in &entry.external {
            let assembly = call.assembly.as_deref().unwrap_or("?");
            println!(
                "  External: {} ({}) [{}] at {}:{}",
                call.signature, assembly, call.confidence, call.file, call.line
            );
        }
    }
    Ok(())
}
