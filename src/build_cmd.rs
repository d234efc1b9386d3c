//! Build command implementation
//!
//! Runs the full analysis pipeline and replaces the store.

use anyhow::Result;
use modscope::output::{print_response, OutputFormat};
use modscope::{validate_input_dir, BuildError, BuildOptions, BuildReport};

/// Diagnostics listed in human output before the rest are summarized.
const SHOWN_DIAGNOSTICS: usize = 20;

pub fn run_build(mut options: BuildOptions, output_format: OutputFormat) -> Result<()> {
    options.root = validate_input_dir(&options.root)
        .map_err(|_| BuildError::MissingRoot(options.root.clone()))?;

    let report = modscope::build(&options)?;

    match output_format {
        OutputFormat::Json => print_response(&report),
        OutputFormat::Human => {
            print_report(&report);
            Ok(())
        }
    }
}

fn print_report(report: &BuildReport) {
    let s = &report.summary;
    println!("Built {} in {} ms", report.db_path.display(), report.elapsed_ms);
    println!("  build id:            {}", report.build_id);
    println!(
        "  source trees:        {} ({} files, {} with syntax errors)",
        s.source_trees, s.source_files, s.files_with_errors
    );
    println!("  types:               {}", s.types);
    println!("  methods:             {}", s.methods);
    println!(
        "  calls:               {} internal, {} external",
        s.internal_calls, s.external_calls
    );
    for (strategy, n) in &s.calls_by_strategy {
        println!("    {:<18} {}", strategy, n);
    }
    println!(
        "  events:              {} declarations, {} subscriptions, {} fires",
        s.event_declarations, s.event_subscriptions, s.event_fires
    );
    println!("  property accesses:   {}", s.property_accesses);
    println!("  config definitions:  {}", s.config_definitions);
    println!("  extensions:          {}", s.extensions);
    println!(
        "  patches:             {} resolved, {} best effort",
        s.patches_resolved, s.patches_best_effort
    );
    println!("  config edits:        {}", s.config_edits);

    if report.diagnostics.is_empty() {
        return;
    }
    let by_stage: Vec<String> = s
        .diagnostics_by_stage
        .iter()
        .map(|(stage, n)| format!("{} {}", n, stage))
        .collect();
    eprintln!();
    eprintln!("Diagnostics: {} ({})", report.diagnostics.len(), by_stage.join(", "));
    for d in report.diagnostics.iter().take(SHOWN_DIAGNOSTICS) {
        eprintln!("  {}", d.format_stderr());
    }
    if report.diagnostics.len() > SHOWN_DIAGNOSTICS {
        eprintln!(
            "  ... {} more in the build_diagnostics table",
            report.diagnostics.len() - SHOWN_DIAGNOSTICS
        );
    }
}
