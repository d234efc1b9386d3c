//! Properties command implementation
//!
//! Links a configuration property's base definitions, the code that reads
//! or writes it, and the mod edits that change it.

use anyhow::Result;
use modscope::common::truncate_for_display;
use modscope::output::{print_response, OutputFormat};
use modscope::Store;
use std::path::PathBuf;

const VALUE_WIDTH: usize = 60;

pub fn run_properties(db_path: PathBuf, name: String, output_format: OutputFormat) -> Result<()> {
    let store = Store::open(&db_path)?;
    let report = store.properties(&name)?;

    if output_format == OutputFormat::Json {
        return print_response(&report);
    }

    println!("Property \"{}\"", report.name);

    println!("Definitions ({}):", report.definitions.len());
    for d in &report.definitions {
        let class = d.declaring_class.as_deref().unwrap_or("-");
        let value = d.value.as_deref().unwrap_or("");
        println!(
            "  {}:{} {} = {} [{}]",
            d.file,
            d.line,
            d.path,
            truncate_for_display(value, VALUE_WIDTH),
            class
        );
    }

    println!("Code accesses ({}):", report.accesses.len());
    for a in &report.accesses {
        println!(
            "  {} {} via {} [{}] at {}:{}",
            a.method.signature, a.kind, a.api, a.confidence, a.file, a.line
        );
    }

    println!("Mod edits ({}):", report.edits.len());
    for e in &report.edits {
        let value = e.value.as_deref().unwrap_or("");
        println!(
            "  {} {} {} {} = {} ({}:{})",
            e.extension,
            e.op.as_str(),
            e.target_file,
            e.path,
            truncate_for_display(value, VALUE_WIDTH),
            e.file,
            e.line
        );
    }
    Ok(())
}
