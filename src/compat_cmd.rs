//! Compat command implementation
//!
//! Reports direct patch conflicts, config collisions and indirect conflicts
//! between mods, optionally restricted to a subset of mod names.

use anyhow::Result;
use modscope::output::{print_response, OutputFormat};
use modscope::settings::ConflictSettings;
use modscope::{CompatReport, Store};
use std::path::PathBuf;

pub fn run_compat(
    db_path: PathBuf,
    mods: Vec<String>,
    settings: ConflictSettings,
    output_format: OutputFormat,
) -> Result<()> {
    let store = Store::open(&db_path)?;
    let only = (!mods.is_empty()).then_some(mods.as_slice());
    let report = store.compat(only, &settings)?;

    if output_format == OutputFormat::Json {
        return print_response(&report);
    }
    print_report(&report);
    Ok(())
}

fn print_report(report: &CompatReport) {
    let s = &report.summary;
    println!("Mods: {}", report.extensions.join(", "));
    let verdict = if s.compatible {
        "compatible"
    } else if s.compatible_with_caveats {
        "compatible with caveats"
    } else {
        "conflicting"
    };
    println!(
        "{} conflicts ({} direct, {} config, {} indirect): {}",
        s.total_conflicts, s.direct_patch, s.config_collision, s.indirect, verdict
    );
    println!(
        "  severity: {} high, {} medium, {} low",
        s.high_severity, s.medium_severity, s.low_severity
    );

    for conflict in &report.conflicts {
        println!();
        println!(
            "[{}] {} {}",
            conflict.severity.as_str().to_uppercase(),
            conflict.kind.as_str(),
            conflict.target
        );
        for p in &conflict.participants {
            let detail = p.detail.as_deref().map(|d| format!(" {}", d)).unwrap_or_default();
            let severity = p.severity.map(|s| format!(" ({})", s.as_str())).unwrap_or_default();
            println!(
                "  {} {}{}{} at {}",
                p.extension, p.action, detail, severity, p.location
            );
        }
        if let Some(suggestion) = &conflict.load_order_suggestion {
            println!("  load order: {}", suggestion);
        }
        println!("  {}", conflict.resolution);
    }

    if !report.load_order_suggestions.is_empty() {
        println!();
        println!("Load order suggestions:");
        for s in &report.load_order_suggestions {
            println!("  {} ({})", s.recommendation, s.reason);
        }
    }
}
