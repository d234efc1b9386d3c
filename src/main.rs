//! modscope CLI - call graph, patch and config-edit analysis for C# mods
//!
//! Usage: modscope <command> [arguments]

mod build_cmd;
mod callees_cmd;
mod callers_cmd;
mod chain_cmd;
mod compat_cmd;
mod externals_cmd;
mod overrides_cmd;
mod properties_cmd;
mod search_cmd;
mod sql_cmd;
mod summary_cmd;

use anyhow::Result;
use modscope::output::print_error;
use modscope::{AnalyzerSettings, BuildOptions, OutputFormat};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const DEFAULT_DB: &str = "modscope.db";

fn print_usage() {
    eprintln!("modscope - call graph, patch and config-edit analyzer for C# mods");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  modscope <command> [arguments]");
    eprintln!("  modscope --help | --version");
    eprintln!();
    eprintln!("  modscope build --root <DIR> [--refs <DIR>] [--config-dir <DIR>] [--mods <DIR>]... [--db <FILE>] [--progress]");
    eprintln!("  modscope summary [--db <FILE>]");
    eprintln!("  modscope sql <QUERY> [--db <FILE>]");
    eprintln!("  modscope callers <METHOD> [--db <FILE>]");
    eprintln!("  modscope callees <METHOD> [--db <FILE>]");
    eprintln!("  modscope search <KEYWORD> [--limit <N>] [--db <FILE>]");
    eprintln!("  modscope chain <FROM> <TO> [--max-depth <N>] [--db <FILE>]");
    eprintln!("  modscope overrides <METHOD> [--db <FILE>]");
    eprintln!("  modscope externals [--type <NAME>] [--db <FILE>]");
    eprintln!("  modscope properties <NAME> [--db <FILE>]");
    eprintln!("  modscope compat [--mod <NAME>]... [--depth <N>] [--no-indirect] [--db <FILE>]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  build       Analyze sources and write the store (full rebuild)");
    eprintln!("  summary     Show store counts and build metadata");
    eprintln!("  sql         Run a read-only SQL statement against the store");
    eprintln!("  callers     Methods that call a method");
    eprintln!("  callees     Methods and external targets a method calls");
    eprintln!("  search      Full-text search over method bodies");
    eprintln!("  chain       Shortest call path between two methods");
    eprintln!("  overrides   Base-class root of a method and every override; query an interface method for its implementers");
    eprintln!("  externals   Calls that leave the analyzed corpus");
    eprintln!("  properties  Definitions, code reads and mod edits of a config property");
    eprintln!("  compat      Conflicts between mods");
    eprintln!();
    eprintln!("Method references:");
    eprintln!("  Bar, Foo.Bar, Foo.Bar(int,string), Ns.Foo.Bar(int), Foo..ctor");
    eprintln!();
    eprintln!("Global arguments:");
    eprintln!("  --db <FILE>         Store path (default: modscope.db)");
    eprintln!("  --output <FORMAT>   Output format: human (default) or json");
    eprintln!("  --settings <FILE>   TOML settings file");
    eprintln!("  --verbose           Log phase progress to stderr");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  MODSCOPE_LOG / RUST_LOG   tracing filter (default: warn)");
}

enum Command {
    Build {
        options: BuildOptions,
    },
    Summary,
    Sql {
        query: String,
    },
    Callers {
        method: String,
    },
    Callees {
        method: String,
    },
    Search {
        keyword: String,
        limit: Option<usize>,
    },
    Chain {
        from: String,
        to: String,
        max_depth: Option<usize>,
    },
    Overrides {
        method: String,
    },
    Externals {
        type_name: Option<String>,
    },
    Properties {
        name: String,
    },
    Compat {
        mods: Vec<String>,
        depth: Option<usize>,
        no_indirect: bool,
    },
}

/// Flags every command accepts.
struct Global {
    db_path: PathBuf,
    output_format: OutputFormat,
    settings: AnalyzerSettings,
    verbose: bool,
}

fn value(args: &[String], i: usize) -> Result<String> {
    args.get(i + 1)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("{} requires an argument", args[i]))
}

fn expect_positional(command: &str, positional: &[String], n: usize, what: &str) -> Result<()> {
    if positional.len() != n {
        anyhow::bail!("{} expects {}", command, what);
    }
    Ok(())
}

fn parse_args(args: &[String]) -> Result<(Command, Global)> {
    let command = args[1].as_str();

    let mut db_path: Option<PathBuf> = None;
    let mut output_format = OutputFormat::Human;
    let mut settings_path: Option<PathBuf> = None;
    let mut verbose = false;

    let mut positional: Vec<String> = Vec::new();
    let mut root: Option<PathBuf> = None;
    let mut refs_dir: Option<PathBuf> = None;
    let mut config_dir: Option<PathBuf> = None;
    let mut mods_dirs: Vec<PathBuf> = Vec::new();
    let mut progress = false;
    let mut limit: Option<usize> = None;
    let mut max_depth: Option<usize> = None;
    let mut type_name: Option<String> = None;
    let mut mods: Vec<String> = Vec::new();
    let mut depth: Option<usize> = None;
    let mut no_indirect = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--db" => {
                db_path = Some(PathBuf::from(value(args, i)?));
                i += 2;
            }
            "--output" => {
                let raw = value(args, i)?;
                output_format = OutputFormat::from_str(&raw)
                    .ok_or_else(|| anyhow::anyhow!("Invalid output format: {}", raw))?;
                i += 2;
            }
            "--settings" => {
                settings_path = Some(PathBuf::from(value(args, i)?));
                i += 2;
            }
            "--verbose" | "-v" => {
                verbose = true;
                i += 1;
            }
            "--root" if command == "build" => {
                root = Some(PathBuf::from(value(args, i)?));
                i += 2;
            }
            "--refs" if command == "build" => {
                refs_dir = Some(PathBuf::from(value(args, i)?));
                i += 2;
            }
            "--config-dir" if command == "build" => {
                config_dir = Some(PathBuf::from(value(args, i)?));
                i += 2;
            }
            "--mods" if command == "build" => {
                mods_dirs.push(PathBuf::from(value(args, i)?));
                i += 2;
            }
            "--progress" if command == "build" => {
                progress = true;
                i += 1;
            }
            "--limit" if command == "search" => {
                limit = Some(value(args, i)?.parse()?);
                i += 2;
            }
            "--max-depth" if command == "chain" => {
                max_depth = Some(value(args, i)?.parse()?);
                i += 2;
            }
            "--type" if command == "externals" => {
                type_name = Some(value(args, i)?);
                i += 2;
            }
            "--mod" if command == "compat" => {
                mods.push(value(args, i)?);
                i += 2;
            }
            "--depth" if command == "compat" => {
                depth = Some(value(args, i)?.parse()?);
                i += 2;
            }
            "--no-indirect" if command == "compat" => {
                no_indirect = true;
                i += 1;
            }
            arg if arg.starts_with("--") => {
                return Err(anyhow::anyhow!("Unknown argument: {}", arg));
            }
            _ => {
                positional.push(args[i].clone());
                i += 1;
            }
        }
    }

    let settings = AnalyzerSettings::load_or_default(settings_path.as_deref())?;
    let db_path = db_path.unwrap_or_else(|| PathBuf::from(DEFAULT_DB));

    let parsed = match command {
        "build" => {
            expect_positional(command, &positional, 0, "no positional arguments")?;
            let root = root.ok_or_else(|| anyhow::anyhow!("--root is required"))?;
            let mut options = BuildOptions::new(root, db_path.clone());
            options.refs_dir = refs_dir;
            options.config_dir = config_dir;
            options.mods_dirs = mods_dirs;
            options.settings = settings.clone();
            options.progress = progress;
            Command::Build { options }
        }
        "summary" => {
            expect_positional(command, &positional, 0, "no positional arguments")?;
            Command::Summary
        }
        "sql" => {
            expect_positional(command, &positional, 1, "one SQL statement")?;
            Command::Sql {
                query: positional.remove(0),
            }
        }
        "callers" => {
            expect_positional(command, &positional, 1, "one method reference")?;
            Command::Callers {
                method: positional.remove(0),
            }
        }
        "callees" => {
            expect_positional(command, &positional, 1, "one method reference")?;
            Command::Callees {
                method: positional.remove(0),
            }
        }
        "search" => {
            expect_positional(command, &positional, 1, "one keyword")?;
            Command::Search {
                keyword: positional.remove(0),
                limit,
            }
        }
        "chain" => {
            expect_positional(command, &positional, 2, "<FROM> <TO>")?;
            let to = positional.remove(1);
            Command::Chain {
                from: positional.remove(0),
                to,
                max_depth,
            }
        }
        "overrides" => {
            expect_positional(command, &positional, 1, "one method reference")?;
            Command::Overrides {
                method: positional.remove(0),
            }
        }
        "externals" => {
            expect_positional(command, &positional, 0, "no positional arguments")?;
            Command::Externals { type_name }
        }
        "properties" => {
            expect_positional(command, &positional, 1, "one property name")?;
            Command::Properties {
                name: positional.remove(0),
            }
        }
        "compat" => {
            expect_positional(command, &positional, 0, "no positional arguments")?;
            Command::Compat {
                mods,
                depth,
                no_indirect,
            }
        }
        other => return Err(anyhow::anyhow!("Unknown command: {}", other)),
    };

    Ok((
        parsed,
        Global {
            db_path,
            output_format,
            settings,
            verbose,
        },
    ))
}

/// Install the stderr tracing subscriber.
///
/// `MODSCOPE_LOG` wins over `RUST_LOG`; without either the level is `warn`,
/// or `info` with `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = std::env::var("MODSCOPE_LOG")
        .ok()
        .and_then(|v| EnvFilter::try_new(v).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run(command: Command, global: Global) -> Result<()> {
    let Global {
        db_path,
        output_format,
        settings,
        ..
    } = global;
    match command {
        Command::Build { options } => build_cmd::run_build(options, output_format),
        Command::Summary => summary_cmd::run_summary(db_path, output_format),
        Command::Sql { query } => sql_cmd::run_sql(db_path, query, output_format),
        Command::Callers { method } => callers_cmd::run_callers(db_path, method, output_format),
        Command::Callees { method } => callees_cmd::run_callees(db_path, method, output_format),
        Command::Search { keyword, limit } => search_cmd::run_search(
            db_path,
            keyword,
            limit.unwrap_or(settings.query.search_limit),
            output_format,
        ),
        Command::Chain {
            from,
            to,
            max_depth,
        } => chain_cmd::run_chain(
            db_path,
            from,
            to,
            max_depth.unwrap_or(settings.query.chain_max_depth),
            output_format,
        ),
        Command::Overrides { method } => {
            overrides_cmd::run_overrides(db_path, method, output_format)
        }
        Command::Externals { type_name } => {
            externals_cmd::run_externals(db_path, type_name, output_format)
        }
        Command::Properties { name } => {
            properties_cmd::run_properties(db_path, name, output_format)
        }
        Command::Compat {
            mods,
            depth,
            no_indirect,
        } => {
            let mut conflicts = settings.conflicts.clone();
            if let Some(d) = depth {
                conflicts.indirect_depth = d;
            }
            if no_indirect {
                conflicts.indirect_enabled = false;
            }
            compat_cmd::run_compat(db_path, mods, conflicts, output_format)
        }
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        return ExitCode::from(1);
    }
    match args[1].as_str() {
        "--help" | "-h" | "help" => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        "--version" | "-V" => {
            println!("{}", modscope::version::version());
            return ExitCode::SUCCESS;
        }
        _ => {}
    }

    // Parse global --output flag so argument errors honor it
    let output_format = args
        .iter()
        .position(|x| x == "--output")
        .and_then(|i| args.get(i + 1))
        .and_then(|fmt| OutputFormat::from_str(fmt))
        .unwrap_or(OutputFormat::Human);

    let result = parse_args(&args).and_then(|(command, global)| {
        init_tracing(global.verbose);
        run(command, global)
    });
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if output_format == OutputFormat::Json {
                if print_error(&e).is_err() {
                    eprintln!("Error: {:#}", e);
                }
            } else {
                eprintln!("Error: {:#}", e);
            }
            ExitCode::from(1)
        }
    }
}
