//! Chain command implementation

use anyhow::Result;
use modscope::output::{print_response, OutputFormat};
use modscope::Store;
use std::path::PathBuf;

pub fn run_chain(
    db_path: PathBuf,
    from: String,
    to: String,
    max_depth: usize,
    output_format: OutputFormat,
) -> Result<()> {
    let store = Store::open(&db_path)?;
    let result = store.chain(&from, &to, max_depth)?;

    if output_format == OutputFormat::Json {
        return print_response(&result);
    }

    match &result.path {
        Some(path) => {
            println!("Call chain ({} hops):", path.len().saturating_sub(1));
            for (i, m) in path.iter().enumerate() {
                let arrow = if i == 0 { "  " } else { "-> " };
                println!("  {}{} ({}:{})", arrow, m.signature, m.file, m.line);
            }
        }
        None => println!(
            "No call path from {} to {} within {} hops",
            from, to, max_depth
        ),
    }
    Ok(())
}
