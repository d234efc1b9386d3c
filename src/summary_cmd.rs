//! Summary command implementation
//!
//! Shows store counts, breakdowns and build metadata.

use anyhow::Result;
use modscope::output::{print_response, OutputFormat};
use modscope::Store;
use std::path::PathBuf;

pub fn run_summary(db_path: PathBuf, output_format: OutputFormat) -> Result<()> {
    let store = Store::open(&db_path)?;
    let summary = store.summary()?;

    if output_format == OutputFormat::Json {
        return print_response(&summary);
    }

    println!("Store: {}", db_path.display());
    for key in ["build_id", "created_at", "tool_version", "root", "source_trees"] {
        if let Some(value) = summary.meta.get(key) {
            println!("  {:<14} {}", key, value);
        }
    }
    println!();
    println!("Tables:");
    for (table, n) in &summary.counts {
        println!("  {:<22} {}", table, n);
    }
    let sections = [
        ("Calls by strategy", &summary.calls_by_strategy),
        ("Patches by confidence", &summary.patches_by_confidence),
        ("Diagnostics by stage", &summary.diagnostics_by_stage),
    ];
    for (title, counts) in sections {
        if counts.is_empty() {
            continue;
        }
        println!();
        println!("{}:", title);
        for (key, n) in counts {
            println!("  {:<22} {}", key, n);
        }
    }
    if !summary.extensions.is_empty() {
        println!();
        println!("Extensions: {}", summary.extensions.join(", "));
    }
    Ok(())
}
