//! Overrides command implementation
//!
//! Shows the topmost declaration of a method and every override or
//! implementation across its descendants.

use anyhow::Result;
use modscope::output::{print_response, OutputFormat};
use modscope::Store;
use std::path::PathBuf;

pub fn run_overrides(db_path: PathBuf, method: String, output_format: OutputFormat) -> Result<()> {
    let store = Store::open(&db_path)?;
    let result = store.overrides(&method)?;

    if output_format == OutputFormat::Json {
        return print_response(&result);
    }

    for group in &result.groups {
        println!(
            "{} ({} declarations):",
            group.root.signature,
            group.methods.len()
        );
        for m in &group.methods {
            let marker = if m.id == group.root.id { "*" } else { " " };
            println!(
                "  {} {} [{}] {}:{}",
                marker, m.owner, m.modifiers, m.file, m.line
            );
        }
    }
    Ok(())
}
