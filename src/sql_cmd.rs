//! SQL command implementation
//!
//! Runs one read-only statement against the store.

use anyhow::Result;
use modscope::output::{print_response, OutputFormat};
use modscope::Store;
use std::path::PathBuf;

pub fn run_sql(db_path: PathBuf, query: String, output_format: OutputFormat) -> Result<()> {
    let store = Store::open(&db_path)?;
    let result = store.sql(&query)?;

    if output_format == OutputFormat::Json {
        return print_response(&result);
    }

    println!("{}", result.columns.join("\t"));
    for row in &result.rows {
        let cells: Vec<String> = row
            .iter()
            .map(|v| match v {
                serde_json::Value::Null => "NULL".to_string(),
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        println!("{}", cells.join("\t"));
    }
    eprintln!("({} rows)", result.rows.len());
    Ok(())
}
